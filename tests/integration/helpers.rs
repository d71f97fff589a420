//! Shared test helpers for integration tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use docvault_core::config::AppConfig;
use docvault_core::traits::{StorageBackend, TaskQueue};
use docvault_core::types::{EntityId, PrincipalId, TenantId, UploadSessionId};
use docvault_database::MemoryStore;
use docvault_entity::entity::Entity;
use docvault_entity::principal::{Principal, TenantRole};
use docvault_entity::upload::ChunkRequest;
use docvault_service::{RequestContext, Services};
use docvault_storage::chunked::{ChunkedUploadAssembler, OrphanUploadCleanup};
use docvault_storage::{AdvisoryLock, ThumbnailPipeline, build_backend};
use docvault_worker::jobs::{MaintenanceHandler, MaintenanceJobs, ThumbnailHandler};
use docvault_worker::{LocalTaskQueue, TaskExecutor, TaskRunner};

/// Test application context
pub struct TestApp {
    pub dir: tempfile::TempDir,
    pub config: AppConfig,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<dyn StorageBackend>,
    pub queue: Arc<LocalTaskQueue>,
    pub services: Services,
    pub maintenance: MaintenanceJobs,
    pub tenant: TenantId,
    pub root: Entity,
    pub admin: RequestContext,
    cancel: watch::Sender<bool>,
    runner: Option<JoinHandle<()>>,
}

impl TestApp {
    /// Create a new test application
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test application after adjusting its configuration
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| dir.path().join(name).to_string_lossy().into_owned();

        let mut config = AppConfig::default();
        config.storage.local.root_path = path("storage");
        config.storage.upload_dir = path("uploads");
        config.lock.directory = path("locks");
        config.lock.timeout_ms = 2_000;
        config.lock.poll_interval_ms = 5;
        config.thumbnail.scratch_dir = path("scratch");
        config.worker.concurrency = 2;
        adjust(&mut config);
        config.normalize();

        let lock = AdvisoryLock::new(&config.lock).unwrap();
        let (queue, receiver) = LocalTaskQueue::new(config.worker.queue_capacity);
        let task_queue: Arc<dyn TaskQueue> = queue.clone();
        let storage = build_backend(&config, lock.clone(), Some(task_queue)).await.unwrap();
        let assembler = ChunkedUploadAssembler::new(&config.storage, lock.clone())
            .await
            .unwrap();

        let store = Arc::new(MemoryStore::new());
        let services = Services::new(&config, store.clone(), store.clone(), storage.clone(), assembler);
        let maintenance = MaintenanceJobs::new(
            store.clone(),
            OrphanUploadCleanup::new(&config.storage.upload_dir, lock.clone()),
            services.entities.clone(),
            &config.worker,
        );

        let mut executor = TaskExecutor::new();
        executor.register(Arc::new(ThumbnailHandler::new(ThumbnailPipeline::new(
            storage.clone(),
            lock,
            config.thumbnail.clone(),
        ))));
        executor.register(Arc::new(MaintenanceHandler::new(maintenance.clone())));
        let runner = TaskRunner::new(queue.clone(), Arc::new(executor), &config.worker)
            .with_retry(2, Duration::from_millis(5));
        let (cancel, cancel_rx) = watch::channel(false);
        let runner = tokio::spawn(async move { runner.run(receiver, cancel_rx).await });

        let tenant = TenantId::new();
        let admin = Principal::new(PrincipalId::new()).with_membership(tenant, TenantRole::Admin);
        let root = services
            .entities
            .create_root(tenant, admin.id, "root")
            .await
            .unwrap();

        Self {
            dir,
            config,
            store,
            storage,
            queue,
            services,
            maintenance,
            tenant,
            root,
            admin: RequestContext::new(admin),
            cancel,
            runner: Some(runner),
        }
    }

    /// A context for a plain member of the test tenant
    pub fn member(&self) -> RequestContext {
        RequestContext::new(Principal::new(PrincipalId::new()).with_membership(self.tenant, TenantRole::Member))
    }

    /// Upload `data` as `title` into `parent`, sending chunks of
    /// `chunk_size` bytes in the order given by `order` (indices).
    pub async fn upload_chunks(
        &self,
        ctx: &RequestContext,
        parent: EntityId,
        title: &str,
        mime_type: Option<&str>,
        data: &[u8],
        chunk_size: usize,
        order: impl IntoIterator<Item = usize>,
    ) -> Option<Entity> {
        let session = UploadSessionId::new();
        let total_chunks = data.len().div_ceil(chunk_size) as u32;
        let mut committed = None;
        for index in order {
            let start = index * chunk_size;
            let end = (start + chunk_size).min(data.len());
            let request = ChunkRequest {
                session_id: session,
                title: title.to_string(),
                mime_type: mime_type.map(str::to_string),
                chunk_index: index as u32,
                total_chunks,
                byte_offset: start as u64,
                total_size: data.len() as u64,
            };
            if let Some(entity) = self
                .services
                .uploads
                .receive_chunk(ctx, parent, &request, &data[start..end])
                .await
                .unwrap()
            {
                committed = Some(entity);
            }
        }
        committed
    }

    /// Upload `data` in a single chunk
    pub async fn upload(&self, parent: EntityId, title: &str, mime_type: &str, data: &[u8]) -> Entity {
        let chunk_size = data.len().max(1);
        self.upload_chunks(&self.admin, parent, title, Some(mime_type), data, chunk_size, [0])
            .await
            .unwrap()
    }

    /// Wait for every queued task to finish
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(30), self.queue.wait_idle())
            .await
            .unwrap();
    }

    /// Current size of an entity
    pub async fn size_of(&self, id: EntityId) -> i64 {
        use docvault_database::repositories::EntityRepository;
        self.store.find_by_id(id).await.unwrap().unwrap().size_bytes
    }

    /// Stop the runner and wait for it
    pub async fn shutdown(mut self) {
        let _ = self.cancel.send(true);
        if let Some(runner) = self.runner.take() {
            runner.await.unwrap();
        }
    }
}

/// Deterministic pseudo-random bytes
pub fn sample_bytes(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

/// A PNG of the given dimensions
pub fn png(width: u32, height: u32) -> Vec<u8> {
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([40u8, 90, 160])))
        .write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}
