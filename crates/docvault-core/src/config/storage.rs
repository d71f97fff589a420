//! Content storage configuration.

use serde::{Deserialize, Serialize};

/// Upper bound on the bytes returned by a single ranged read (20 MiB).
pub const DEFAULT_MAX_RANGE_BYTES: u64 = 20 * 1024 * 1024;

/// Which backend holds primary content. Chosen once when the backend is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local filesystem rooted at [`LocalStorageConfig::root_path`].
    #[default]
    Local,
    /// S3-compatible object store, with local read-through.
    S3,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::S3 => write!(f, "s3"),
        }
    }
}

/// Top-level storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Active backend.
    #[serde(default)]
    pub backend: BackendKind,
    /// Directory that holds in-flight upload artifacts and their manifests.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    /// Maximum declared upload size in bytes (default 5 GB).
    #[serde(default = "default_max_upload")]
    pub max_upload_size_bytes: u64,
    /// Maximum length of a single ranged read.
    #[serde(default = "default_max_range")]
    pub max_range_bytes: u64,
    /// Local filesystem storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,
    /// S3-compatible storage configuration.
    #[serde(default)]
    pub s3: S3StorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            upload_dir: default_upload_dir(),
            max_upload_size_bytes: default_max_upload(),
            max_range_bytes: default_max_range(),
            local: LocalStorageConfig::default(),
            s3: S3StorageConfig::default(),
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    /// Root path for local content. Also the read-through source when the
    /// S3 backend misses.
    #[serde(default = "default_local_root")]
    pub root_path: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_path: default_local_root(),
        }
    }
}

/// S3-compatible object storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3StorageConfig {
    /// Endpoint URL for non-AWS services (MinIO, R2). Empty means AWS.
    #[serde(default)]
    pub endpoint: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket name.
    #[serde(default)]
    pub bucket: String,
    /// Access key ID. Empty means use the ambient AWS credential chain.
    #[serde(default)]
    pub access_key: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
    /// Force path-style addressing (required for MinIO).
    #[serde(default)]
    pub force_path_style: bool,
}

impl Default for S3StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            force_path_style: false,
        }
    }
}

fn default_upload_dir() -> String {
    "./data/uploads".to_string()
}

fn default_max_upload() -> u64 {
    5 * 1024 * 1024 * 1024
}

fn default_max_range() -> u64 {
    DEFAULT_MAX_RANGE_BYTES
}

fn default_local_root() -> String {
    "./data/storage".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}
