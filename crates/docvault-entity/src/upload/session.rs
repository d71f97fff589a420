//! Upload session accounting.
//!
//! A session lives only as long as its temporary artifact. Its manifest is a
//! JSON file next to the artifact so that separate worker processes can
//! append to the same session.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docvault_core::types::UploadSessionId;

/// State of a chunked upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Chunks are still arriving.
    Receiving,
    /// The completion condition fired; the artifact is being checked.
    Validating,
    /// Artifact matched its declared size and was handed off.
    Committed,
    /// Artifact did not match; it has been deleted.
    Rejected,
}

impl SessionState {
    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receiving => "receiving",
            Self::Validating => "validating",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-chunk request metadata. The bytes travel separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub session_id: UploadSessionId,
    /// Declared filename of the finished artifact.
    pub title: String,
    /// Declared MIME type; sniffed from content when absent.
    pub mime_type: Option<String>,
    /// Zero-based chunk index.
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Placement of this chunk in the artifact.
    pub byte_offset: u64,
    /// Declared size of the finished artifact.
    pub total_size: u64,
}

impl ChunkRequest {
    /// Whether this chunk carries the last index.
    pub fn is_final_index(&self) -> bool {
        self.total_chunks > 0 && self.chunk_index == self.total_chunks - 1
    }
}

/// Where one received chunk landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub offset: u64,
    pub len: u64,
}

/// Manifest of an in-flight upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: UploadSessionId,
    pub title: String,
    pub mime_type: Option<String>,
    pub total_size: u64,
    pub total_chunks: u32,
    /// Distinct chunks received, keyed by index. A re-sent index replaces
    /// its earlier record.
    pub chunks: BTreeMap<u32, ChunkRecord>,
    /// Sum of the lengths of the distinct chunks received.
    pub bytes_received: u64,
    pub highest_index: Option<u32>,
    /// Latched once the final index has been written.
    pub final_seen: bool,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    /// Open a session from its first chunk.
    pub fn new(request: &ChunkRequest) -> Self {
        let now = Utc::now();
        Self {
            id: request.session_id,
            title: request.title.clone(),
            mime_type: request.mime_type.clone(),
            total_size: request.total_size,
            total_chunks: request.total_chunks,
            chunks: BTreeMap::new(),
            bytes_received: 0,
            highest_index: None,
            final_seen: false,
            state: SessionState::Receiving,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a later chunk describes the same upload as the manifest.
    pub fn matches(&self, request: &ChunkRequest) -> bool {
        self.total_size == request.total_size && self.total_chunks == request.total_chunks
    }

    /// Account for a chunk that has been written to the artifact.
    pub fn record_chunk(&mut self, index: u32, offset: u64, len: u64) {
        if let Some(previous) = self.chunks.insert(index, ChunkRecord { offset, len }) {
            self.bytes_received -= previous.len;
        }
        self.bytes_received += len;
        self.highest_index = Some(self.highest_index.map_or(index, |h| h.max(index)));
        if self.total_chunks > 0 && index == self.total_chunks - 1 {
            self.final_seen = true;
        }
        self.updated_at = Utc::now();
    }

    /// Evaluated after every chunk write. Once the final index has been seen,
    /// the session is complete as soon as either the received byte count
    /// reaches the declared total or every index has arrived.
    pub fn is_complete(&self) -> bool {
        self.final_seen
            && (self.bytes_received >= self.total_size
                || self.chunks.len() as u64 >= u64::from(self.total_chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(total_chunks: u32, total_size: u64) -> ChunkRequest {
        ChunkRequest {
            session_id: UploadSessionId::new(),
            title: "video.mp4".to_string(),
            mime_type: None,
            chunk_index: 0,
            total_chunks,
            byte_offset: 0,
            total_size,
        }
    }

    #[test]
    fn test_final_chunk_first_does_not_complete() {
        let mut session = UploadSession::new(&request(4, 40));
        session.record_chunk(3, 30, 10);
        assert!(session.final_seen);
        assert!(!session.is_complete());
        session.record_chunk(2, 20, 10);
        session.record_chunk(1, 10, 10);
        assert!(!session.is_complete());
        session.record_chunk(0, 0, 10);
        assert!(session.is_complete());
    }

    #[test]
    fn test_resent_chunk_is_not_double_counted() {
        let mut session = UploadSession::new(&request(2, 20));
        session.record_chunk(0, 0, 10);
        session.record_chunk(0, 0, 10);
        assert_eq!(session.bytes_received, 10);
        assert_eq!(session.chunks.len(), 1);
    }

    #[test]
    fn test_short_upload_completes_on_chunk_count() {
        let mut session = UploadSession::new(&request(2, 20));
        session.record_chunk(0, 0, 10);
        session.record_chunk(1, 10, 9);
        assert_eq!(session.bytes_received, 19);
        assert!(session.is_complete());
    }
}
