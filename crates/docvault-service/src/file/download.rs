//! Content reads: full downloads, ranged reads and thumbnails.
//!
//! Access is granted either by the caller's effective read capability or by
//! a valid bypass token bound to the requested entity. The token path never
//! consults the permission resolver; it is limited to one entity for at
//! most one minute.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::{debug, info};

use docvault_auth::acl::AccessResolver;
use docvault_auth::token::BypassTokenService;
use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;
use docvault_core::traits::{ByteStream, StorageBackend};
use docvault_core::types::EntityId;
use docvault_database::repositories::EntityRepository;
use docvault_entity::entity::Entity;
use docvault_entity::permission::Capability;
use docvault_storage::paths;
use docvault_storage::range::{ByteRange, ResolvedRange};

use crate::context::RequestContext;

/// Bytes of text content shown when no thumbnail exists.
pub const TEXT_PREVIEW_BYTES: u64 = 1000;

/// MIME type of stored thumbnails.
pub const THUMBNAIL_MIME: &str = "image/webp";

/// A full content stream.
pub struct Download {
    pub entity: Entity,
    pub size: u64,
    pub mime_type: String,
    pub stream: ByteStream,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("entity_id", &self.entity.id)
            .field("size", &self.size)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// A ranged read, rendered as a `206 Partial Content` response.
#[derive(Debug, Clone)]
pub struct PartialContent {
    pub entity_id: EntityId,
    pub mime_type: String,
    pub range: ResolvedRange,
    pub data: Bytes,
}

impl PartialContent {
    /// HTTP status of a partial response.
    pub const STATUS: u16 = 206;

    /// `Content-Range` header value.
    pub fn content_range(&self) -> String {
        self.range.content_range()
    }
}

/// What a thumbnail request resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailView {
    /// The derived WebP thumbnail.
    Image(Bytes),
    /// Leading text of a `text/*` file, newlines as `<br/>`.
    TextPreview(String),
    /// Nothing to show yet. The thumbnail task may still be running.
    Unavailable,
}

/// Serves stored content to authorized callers.
#[derive(Clone)]
pub struct DownloadService {
    entities: Arc<dyn EntityRepository>,
    access: AccessResolver,
    storage: Arc<dyn StorageBackend>,
    tokens: BypassTokenService,
    max_range_bytes: u64,
}

impl std::fmt::Debug for DownloadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadService")
            .field("max_range_bytes", &self.max_range_bytes)
            .finish()
    }
}

impl DownloadService {
    /// Creates a new download service.
    pub fn new(
        entities: Arc<dyn EntityRepository>,
        access: AccessResolver,
        storage: Arc<dyn StorageBackend>,
        tokens: BypassTokenService,
        max_range_bytes: u64,
    ) -> Self {
        Self {
            entities,
            access,
            storage,
            tokens,
            max_range_bytes: max_range_bytes.max(1),
        }
    }

    /// Stream the whole content of a file.
    pub async fn open(&self, ctx: &RequestContext, entity_id: EntityId) -> AppResult<Download> {
        let (entity, key) = self.authorize(ctx, entity_id).await?;
        let size = self.storage.size(&key).await?;
        let stream = self.storage.get(&key).await?;
        let mime_type = mime_of(&entity);

        info!(entity_id = %entity_id, key = %key, size, "File download started");
        Ok(Download {
            entity,
            size,
            mime_type,
            stream,
        })
    }

    /// Serve a `Range: bytes=<start>-[<end>]` request. The response never
    /// carries more than the configured maximum, whatever was asked for.
    pub async fn read_range(
        &self,
        ctx: &RequestContext,
        entity_id: EntityId,
        range_header: &str,
    ) -> AppResult<PartialContent> {
        let requested = ByteRange::parse(range_header)?;
        let (entity, key) = self.authorize(ctx, entity_id).await?;
        let total = self.storage.size(&key).await?;
        let range = requested.resolve(total, self.max_range_bytes)?;
        let data = self.storage.read_range(&key, range.start, range.len()).await?;

        debug!(
            entity_id = %entity_id,
            content_range = %range.content_range(),
            bytes = data.len(),
            "Ranged read"
        );
        Ok(PartialContent {
            entity_id,
            mime_type: mime_of(&entity),
            range,
            data,
        })
    }

    /// The thumbnail of a file, a text preview, or `Unavailable`.
    pub async fn thumbnail(&self, ctx: &RequestContext, entity_id: EntityId) -> AppResult<ThumbnailView> {
        let (entity, key) = self.authorize(ctx, entity_id).await?;

        let thumb_key = paths::thumbnail_key(&key);
        if self.storage.exists(&thumb_key).await? {
            match self.read_all(&thumb_key).await {
                Ok(data) => return Ok(ThumbnailView::Image(data)),
                Err(e) if e.kind == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        let is_text = entity
            .mime_type
            .as_deref()
            .is_some_and(|m| m.trim().to_ascii_lowercase().starts_with("text/"));
        if !is_text {
            return Ok(ThumbnailView::Unavailable);
        }

        let head = self.storage.read_range(&key, 0, TEXT_PREVIEW_BYTES).await?;
        Ok(ThumbnailView::TextPreview(text_preview(&head)))
    }

    async fn authorize(&self, ctx: &RequestContext, entity_id: EntityId) -> AppResult<(Entity, String)> {
        let entity = match ctx.bypass_token.as_deref() {
            Some(token) => match self.tokens.verify(token, entity_id) {
                Ok(()) => {
                    debug!(entity_id = %entity_id, "Read granted by bypass token");
                    self.entities
                        .find_by_id(entity_id)
                        .await?
                        .ok_or_else(|| AppError::not_found(format!("Entity {entity_id} not found")))?
                }
                Err(e) => {
                    debug!(entity_id = %entity_id, error = %e, "Bypass token rejected");
                    self.require_read(ctx, entity_id, Some(e)).await?
                }
            },
            None => self.require_read(ctx, entity_id, None).await?,
        };

        if !entity.is_active() {
            return Err(AppError::not_found(format!("Entity {entity_id} is not available")));
        }
        let key = entity
            .storage_key
            .clone()
            .ok_or_else(|| AppError::not_found(format!("Entity {entity_id} has no stored content")))?;
        Ok((entity, key))
    }

    /// Fall back to the resolver. An anonymous caller with a bad token gets
    /// the token's error instead of a bare permission denial.
    async fn require_read(
        &self,
        ctx: &RequestContext,
        entity_id: EntityId,
        token_error: Option<AppError>,
    ) -> AppResult<Entity> {
        match (ctx.principal(), token_error) {
            (None, Some(e)) => Err(e),
            (principal, _) => self.access.require(entity_id, principal, Capability::Read).await,
        }
    }

    async fn read_all(&self, key: &str) -> AppResult<Bytes> {
        let mut stream = self.storage.get(key).await?;
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

fn mime_of(entity: &Entity) -> String {
    entity
        .mime_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Decode leading bytes as lossy UTF-8 and turn newlines into `<br/>`.
pub fn text_preview(head: &[u8]) -> String {
    String::from_utf8_lossy(head).replace('\n', "<br/>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvault_core::config::AuthConfig;
    use docvault_core::config::lock::LockConfig;
    use docvault_core::types::{PrincipalId, TenantId};
    use docvault_database::MemoryStore;
    use docvault_entity::entity::{EntityKind, NewEntity};
    use docvault_entity::principal::{Principal, TenantRole};
    use docvault_storage::AdvisoryLock;
    use docvault_storage::providers::LocalBackend;

    struct Fixture {
        dir: tempfile::TempDir,
        store: Arc<MemoryStore>,
        storage: Arc<LocalBackend>,
        service: DownloadService,
        tokens: BypassTokenService,
        tenant: TenantId,
        root: EntityId,
        owner: Principal,
    }

    async fn fixture(max_range: u64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let lock = AdvisoryLock::new(&LockConfig {
            directory: dir.path().join("locks").to_string_lossy().into_owned(),
            timeout_ms: 500,
            poll_interval_ms: 5,
        })
        .unwrap();
        let storage = Arc::new(
            LocalBackend::new(dir.path().join("content"), lock, None)
                .await
                .unwrap(),
        );
        let store = Arc::new(MemoryStore::new());
        let tokens = BypassTokenService::new(&AuthConfig {
            bypass_token_secret: "test".to_string(),
            bypass_token_ttl_seconds: 30,
        });
        let tenant = TenantId::new();
        let owner = Principal::new(PrincipalId::new()).with_membership(tenant, TenantRole::Member);
        let root = store
            .insert(NewEntity {
                id: EntityId::new(),
                parent_id: None,
                tenant_id: tenant,
                title: "root".to_string(),
                kind: EntityKind::Folder,
                mime_type: None,
                size_bytes: 0,
                owner_id: owner.id,
                is_private: false,
                storage_key: None,
            })
            .await
            .unwrap()
            .id;
        let service = DownloadService::new(
            store.clone(),
            AccessResolver::new(store.clone(), store.clone()),
            storage.clone(),
            tokens.clone(),
            max_range,
        );
        Fixture {
            dir,
            store,
            storage,
            service,
            tokens,
            tenant,
            root,
            owner,
        }
    }

    async fn stored_file(f: &Fixture, title: &str, mime: &str, body: &[u8], is_private: bool) -> Entity {
        let id = EntityId::new();
        let key = paths::content_key(f.tenant, id, title);
        let temp = f.dir.path().join(format!("{id}.tmp"));
        tokio::fs::write(&temp, body).await.unwrap();
        f.storage.put(&temp, &key, None).await.unwrap();
        f.store
            .insert(NewEntity {
                id,
                parent_id: Some(f.root),
                tenant_id: f.tenant,
                title: title.to_string(),
                kind: EntityKind::File,
                mime_type: Some(mime.to_string()),
                size_bytes: body.len() as i64,
                owner_id: f.owner.id,
                is_private,
                storage_key: Some(key),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_streams_whole_file() {
        let f = fixture(1024).await;
        let file = stored_file(&f, "a.txt", "text/plain", b"hello world", false).await;

        let mut download = f
            .service
            .open(&RequestContext::new(f.owner.clone()), file.id)
            .await
            .unwrap();
        assert_eq!(download.size, 11);
        assert_eq!(download.mime_type, "text/plain");
        let mut body = Vec::new();
        while let Some(chunk) = download.stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, b"hello world");
    }

    #[tokio::test]
    async fn test_open_ended_range_is_capped() {
        let f = fixture(4).await;
        let file = stored_file(&f, "a.bin", "application/octet-stream", b"0123456789", false).await;
        let ctx = RequestContext::new(f.owner.clone());

        let part = f.service.read_range(&ctx, file.id, "bytes=2-").await.unwrap();
        assert_eq!(&part.data[..], b"2345");
        assert_eq!(part.content_range(), "bytes 2-5/10");
        assert_eq!(PartialContent::STATUS, 206);

        let part = f.service.read_range(&ctx, file.id, "bytes=8-100").await.unwrap();
        assert_eq!(&part.data[..], b"89");
        assert_eq!(part.content_range(), "bytes 8-9/10");

        let err = f.service.read_range(&ctx, file.id, "bytes=10-").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRange);
    }

    #[tokio::test]
    async fn test_private_file_needs_token_or_access() {
        let f = fixture(1024).await;
        let file = stored_file(&f, "secret.txt", "text/plain", b"classified", true).await;
        let stranger = RequestContext::new(
            Principal::new(PrincipalId::new()).with_membership(f.tenant, TenantRole::Member),
        );

        let err = f.service.open(&stranger, file.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);

        let token = f.tokens.issue(file.id).unwrap().token;
        let anonymous = RequestContext::anonymous().with_bypass_token(token.clone());
        let download = f.service.open(&anonymous, file.id).await.unwrap();
        assert_eq!(download.size, 10);

        let other = stored_file(&f, "other.txt", "text/plain", b"x", true).await;
        let err = f.service.open(&anonymous, other.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);

        let err = f
            .service
            .open(&RequestContext::anonymous(), file.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_text_preview_without_thumbnail() {
        let f = fixture(1024).await;
        let long_line = "x".repeat(2000);
        let body = format!("line one\nline two\n{long_line}");
        let file = stored_file(&f, "notes.txt", "text/plain; charset=utf-8", body.as_bytes(), false).await;

        let view = f
            .service
            .thumbnail(&RequestContext::new(f.owner.clone()), file.id)
            .await
            .unwrap();
        let ThumbnailView::TextPreview(text) = view else {
            panic!("expected a text preview, got {view:?}");
        };
        assert!(text.starts_with("line one<br/>line two<br/>"));
        assert_eq!(text.len(), 1000 - 2 + 2 * "<br/>".len());
    }

    #[tokio::test]
    async fn test_thumbnail_prefers_stored_image() {
        let f = fixture(1024).await;
        let file = stored_file(&f, "pic.png", "image/png", b"not really a png", false).await;
        let ctx = RequestContext::new(f.owner.clone());

        assert_eq!(f.service.thumbnail(&ctx, file.id).await.unwrap(), ThumbnailView::Unavailable);

        let thumb = f.dir.path().join("thumb.webp");
        tokio::fs::write(&thumb, b"webp-bytes").await.unwrap();
        let key = paths::thumbnail_key(file.storage_key.as_deref().unwrap());
        f.storage.put(&thumb, &key, None).await.unwrap();

        assert_eq!(
            f.service.thumbnail(&ctx, file.id).await.unwrap(),
            ThumbnailView::Image(Bytes::from_static(b"webp-bytes"))
        );
    }

    #[tokio::test]
    async fn test_trashed_file_is_not_found() {
        let f = fixture(1024).await;
        let file = stored_file(&f, "gone.txt", "text/plain", b"bye", false).await;
        f.store
            .set_lifecycle(
                file.id,
                docvault_entity::entity::Lifecycle::Active,
                docvault_entity::entity::Lifecycle::Trashed,
                Some(chrono::Utc::now()),
            )
            .await
            .unwrap();

        let err = f
            .service
            .open(&RequestContext::new(f.owner.clone()), file.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
