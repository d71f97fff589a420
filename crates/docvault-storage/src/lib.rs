//! # docvault-storage
//!
//! Content storage for DocVault: the local and S3 backends behind
//! [`StorageBackend`](docvault_core::traits::StorageBackend), cross-process
//! advisory locks, thumbnail derivation, and chunked upload assembly.

pub mod chunked;
pub mod lock;
pub mod manager;
pub mod paths;
pub mod providers;
pub mod range;
pub mod sniff;
pub mod thumbnail;

pub use chunked::{AssembledUpload, ChunkOutcome, ChunkedUploadAssembler};
pub use lock::{AdvisoryLock, LockGuard, LockMode};
pub use manager::build_backend;
pub use range::{ByteRange, ResolvedRange};
pub use thumbnail::{ThumbnailJob, ThumbnailPipeline, can_thumbnail};
