//! Advisory lock configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cross-process advisory lock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Directory holding one lock file per locked storage key.
    #[serde(default = "default_directory")]
    pub directory: String,
    /// How long an acquisition waits before failing with `LockTimeout`.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    /// Delay between acquisition attempts while a conflicting holder exists.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl LockConfig {
    /// Acquisition bound as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            timeout_ms: default_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_directory() -> String {
    "./data/locks".to_string()
}

fn default_timeout() -> u64 {
    30_000
}

fn default_poll_interval() -> u64 {
    25
}
