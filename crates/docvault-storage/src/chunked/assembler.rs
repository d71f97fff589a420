//! Offset-addressed chunk assembly.
//!
//! Every chunk is written at its declared byte offset into one temp artifact
//! per session, so arrival order does not matter. The session manifest sits
//! next to the artifact and every chunk is applied under the session's
//! exclusive advisory lock, which lets separate worker processes feed the
//! same session.
//!
//! After each write the completion condition is re-evaluated (see
//! [`UploadSession::is_complete`]). A complete session is validated: an
//! artifact of exactly the declared size is committed and handed back to
//! the caller; anything else is deleted together with its manifest and
//! reported as `SizeMismatch`.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use docvault_core::config::storage::StorageConfig;
use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;
use docvault_core::types::UploadSessionId;
use docvault_entity::upload::{ChunkRequest, SessionState, UploadSession};

use crate::lock::{AdvisoryLock, LockMode};
use crate::paths;
use crate::sniff;

/// Lock key serializing chunk application for one session.
pub fn session_lock_key(session_id: UploadSessionId) -> String {
    format!("upload:{session_id}")
}

/// A committed artifact waiting to be handed to the storage backend.
#[derive(Debug, Clone)]
pub struct AssembledUpload {
    pub session_id: UploadSessionId,
    pub title: String,
    pub path: PathBuf,
    pub size: u64,
    pub mime_type: String,
}

impl AssembledUpload {
    /// Delete the artifact, e.g. when the hand-off to storage failed.
    pub async fn discard(&self) {
        remove_quietly(&self.path).await;
    }
}

/// Result of applying one chunk.
#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    /// More chunks are expected.
    Pending {
        bytes_received: u64,
        chunks_received: usize,
    },
    /// The artifact is complete and matches its declared size.
    Committed(AssembledUpload),
}

/// Assembles chunked uploads in a temp directory.
#[derive(Debug, Clone)]
pub struct ChunkedUploadAssembler {
    upload_dir: PathBuf,
    lock: AdvisoryLock,
    max_upload_size: u64,
}

impl ChunkedUploadAssembler {
    /// Create the assembler and its temp directory.
    pub async fn new(config: &StorageConfig, lock: AdvisoryLock) -> AppResult<Self> {
        let upload_dir = PathBuf::from(&config.upload_dir);
        fs::create_dir_all(&upload_dir).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageUnavailable,
                format!("Failed to create upload directory: {}", upload_dir.display()),
                e,
            )
        })?;
        Ok(Self {
            upload_dir,
            lock,
            max_upload_size: config.max_upload_size_bytes,
        })
    }

    /// Directory holding temp artifacts and manifests.
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Apply one chunk.
    pub async fn receive(&self, request: &ChunkRequest, data: &[u8]) -> AppResult<ChunkOutcome> {
        self.check_request(request, data.len() as u64)?;

        let _guard = self
            .lock
            .acquire(&session_lock_key(request.session_id), LockMode::Exclusive)
            .await?;

        let mut session = self.load_session(request).await?;
        let artifact = paths::upload_artifact(&self.upload_dir, session.id, &session.title);

        write_at(&artifact, request.byte_offset, data).await?;
        session.record_chunk(request.chunk_index, request.byte_offset, data.len() as u64);

        debug!(
            upload_id = %session.id,
            chunk_index = request.chunk_index,
            total_chunks = session.total_chunks,
            offset = request.byte_offset,
            bytes = data.len(),
            "Wrote chunk"
        );

        if !session.is_complete() {
            self.save_session(&session).await?;
            return Ok(ChunkOutcome::Pending {
                bytes_received: session.bytes_received,
                chunks_received: session.chunks.len(),
            });
        }

        session.state = SessionState::Validating;
        self.validate(session, artifact).await
    }

    /// Drop a session and its artifact.
    pub async fn abort(&self, session_id: UploadSessionId) -> AppResult<()> {
        let _guard = self
            .lock
            .acquire(&session_lock_key(session_id), LockMode::Exclusive)
            .await?;
        let manifest = paths::upload_manifest(&self.upload_dir, session_id);
        if let Some(session) = self.read_manifest(&manifest).await? {
            let artifact = paths::upload_artifact(&self.upload_dir, session_id, &session.title);
            remove_quietly(&artifact).await;
        }
        remove_quietly(&manifest).await;
        info!(upload_id = %session_id, "Upload aborted");
        Ok(())
    }

    fn check_request(&self, request: &ChunkRequest, len: u64) -> AppResult<()> {
        if request.title.trim().is_empty() {
            return Err(AppError::validation("Upload title must not be empty"));
        }
        if request.total_chunks == 0 {
            return Err(AppError::validation("total_chunks must be at least 1"));
        }
        if request.chunk_index >= request.total_chunks {
            return Err(AppError::validation(format!(
                "Chunk index {} out of range for {} chunks",
                request.chunk_index, request.total_chunks
            )));
        }
        if request.total_size > self.max_upload_size {
            return Err(AppError::validation(format!(
                "Declared size {} exceeds the maximum upload size {}",
                request.total_size, self.max_upload_size
            )));
        }
        let end = request.byte_offset.checked_add(len);
        if end.is_none_or(|end| end > self.max_upload_size) {
            return Err(AppError::validation(format!(
                "Chunk at offset {} runs past the maximum upload size",
                request.byte_offset
            )));
        }
        Ok(())
    }

    async fn load_session(&self, request: &ChunkRequest) -> AppResult<UploadSession> {
        let manifest = paths::upload_manifest(&self.upload_dir, request.session_id);
        match self.read_manifest(&manifest).await? {
            Some(session) if !session.matches(request) => Err(AppError::validation(format!(
                "Chunk does not match upload session {}: declared {} bytes in {} chunks",
                request.session_id, session.total_size, session.total_chunks
            ))),
            Some(session) => Ok(session),
            None => {
                info!(
                    upload_id = %request.session_id,
                    total_chunks = request.total_chunks,
                    total_size = request.total_size,
                    "Upload session opened"
                );
                Ok(UploadSession::new(request))
            }
        }
    }

    async fn read_manifest(&self, manifest: &Path) -> AppResult<Option<UploadSession>> {
        match fs::read(manifest).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::with_source(
                ErrorKind::StorageUnavailable,
                format!("Failed to read upload manifest: {}", manifest.display()),
                e,
            )),
        }
    }

    async fn save_session(&self, session: &UploadSession) -> AppResult<()> {
        let manifest = paths::upload_manifest(&self.upload_dir, session.id);
        let staging = manifest.with_extension("json.tmp");
        let raw = serde_json::to_vec(session)?;
        fs::write(&staging, raw).await.map_err(|e| {
            AppError::with_source(ErrorKind::StorageUnavailable, "Failed to write upload manifest", e)
        })?;
        fs::rename(&staging, &manifest).await.map_err(|e| {
            AppError::with_source(ErrorKind::StorageUnavailable, "Failed to replace upload manifest", e)
        })?;
        Ok(())
    }

    async fn validate(&self, mut session: UploadSession, artifact: PathBuf) -> AppResult<ChunkOutcome> {
        let manifest = paths::upload_manifest(&self.upload_dir, session.id);
        let size = fs::metadata(&artifact).await?.len();

        if size != session.total_size {
            session.state = SessionState::Rejected;
            remove_quietly(&artifact).await;
            remove_quietly(&manifest).await;
            warn!(
                upload_id = %session.id,
                declared = session.total_size,
                actual = size,
                state = %session.state,
                "Upload size mismatch"
            );
            return Err(AppError::size_mismatch(format!(
                "Upload {} assembled {size} bytes but declared {}",
                session.id, session.total_size
            )));
        }

        let mime_type = match session.mime_type.as_deref().map(str::trim) {
            Some(declared) if !declared.is_empty() => declared.to_string(),
            _ => sniff::sniff_file(&artifact, &session.title).await?,
        };

        session.state = SessionState::Committed;
        remove_quietly(&manifest).await;
        info!(
            upload_id = %session.id,
            bytes = size,
            mime_type = %mime_type,
            state = %session.state,
            "Upload assembled"
        );

        Ok(ChunkOutcome::Committed(AssembledUpload {
            session_id: session.id,
            title: session.title,
            path: artifact,
            size,
            mime_type,
        }))
    }
}

/// Positioned write; never appends.
async fn write_at(path: &Path, offset: u64, data: &[u8]) -> AppResult<()> {
    let io_err = |e: std::io::Error| {
        AppError::with_source(
            ErrorKind::StorageUnavailable,
            format!("Failed to write chunk to {}", path.display()),
            e,
        )
    };
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await
        .map_err(io_err)?;
    file.seek(SeekFrom::Start(offset)).await.map_err(io_err)?;
    file.write_all(data).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    Ok(())
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove upload file"),
    }
}
