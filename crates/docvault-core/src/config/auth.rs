//! Bypass token configuration.

use serde::{Deserialize, Serialize};

/// Hard ceiling on a bypass token's lifetime.
pub const MAX_BYPASS_TOKEN_TTL_SECONDS: u64 = 60;

/// Settings for the short-lived single-entity read token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign bypass tokens.
    #[serde(default = "default_secret")]
    pub bypass_token_secret: String,
    /// Token lifetime. Clamped to [`MAX_BYPASS_TOKEN_TTL_SECONDS`].
    #[serde(default = "default_ttl")]
    pub bypass_token_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bypass_token_secret: default_secret(),
            bypass_token_ttl_seconds: default_ttl(),
        }
    }
}

fn default_secret() -> String {
    "change-me-in-production".to_string()
}

fn default_ttl() -> u64 {
    MAX_BYPASS_TOKEN_TTL_SECONDS
}
