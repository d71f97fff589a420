//! Core traits defined in `docvault-core` and implemented by other crates.

pub mod queue;
pub mod storage;

pub use queue::{DeferredTask, TaskQueue};
pub use storage::{ByteStream, ContentHint, StorageBackend};
