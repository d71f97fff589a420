//! Chunked upload sessions.

pub mod session;

pub use session::{ChunkRecord, ChunkRequest, SessionState, UploadSession};
