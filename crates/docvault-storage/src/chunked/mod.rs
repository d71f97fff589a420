//! Chunked upload assembly and orphan cleanup.

pub mod assembler;
pub mod cleanup;

pub use assembler::{AssembledUpload, ChunkOutcome, ChunkedUploadAssembler, session_lock_key};
pub use cleanup::{CleanupReport, OrphanUploadCleanup};
