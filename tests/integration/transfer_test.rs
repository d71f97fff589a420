//! Upload, download, range and thumbnail flows.

use futures::StreamExt;

use docvault_core::error::ErrorKind;
use docvault_service::file::ThumbnailView;

use crate::helpers::{TestApp, png, sample_bytes};

const MIB: usize = 1024 * 1024;

#[tokio::test]
async fn test_reverse_order_chunks_reassemble_exactly() {
    let app = TestApp::new().await;
    let docs = app
        .services
        .entities
        .create_folder(&app.admin, app.root.id, "docs", false)
        .await
        .unwrap();
    let data = sample_bytes(10 * MIB);

    let entity = app
        .upload_chunks(&app.admin, docs.id, "blob.bin", None, &data, MIB, (0..10).rev())
        .await
        .expect("last chunk commits the upload");

    assert_eq!(entity.size_bytes, data.len() as i64);
    assert_eq!(entity.mime_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(app.size_of(docs.id).await, data.len() as i64);
    assert_eq!(app.size_of(app.root.id).await, data.len() as i64);

    let mut download = app.services.downloads.open(&app.admin, entity.id).await.unwrap();
    let mut received = Vec::with_capacity(data.len());
    while let Some(chunk) = download.stream.next().await {
        received.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(download.size, data.len() as u64);
    assert!(received == data, "downloaded bytes differ from the upload");

    app.shutdown().await;
}

#[tokio::test]
async fn test_range_reads() {
    let app = TestApp::new().await;
    let data = sample_bytes(5 * MIB);
    let entity = app.upload(app.root.id, "video.bin", "application/octet-stream", &data).await;

    let part = app
        .services
        .downloads
        .read_range(&app.admin, entity.id, "bytes=1024-2047")
        .await
        .unwrap();
    assert_eq!(part.data.as_ref(), &data[1024..2048]);
    assert_eq!(part.content_range(), format!("bytes 1024-2047/{}", data.len()));

    let tail = app
        .services
        .downloads
        .read_range(&app.admin, entity.id, "bytes=4194304-")
        .await
        .unwrap();
    assert_eq!(tail.data.len(), MIB);
    assert_eq!(tail.data.as_ref(), &data[4 * MIB..]);

    let err = app
        .services
        .downloads
        .read_range(&app.admin, entity.id, &format!("bytes={}-", data.len()))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidRange);

    app.shutdown().await;
}

#[tokio::test]
async fn test_range_length_is_capped() {
    let app = TestApp::with_config(|c| c.storage.max_range_bytes = MIB as u64).await;
    let data = sample_bytes(3 * MIB);
    let entity = app.upload(app.root.id, "big.bin", "application/octet-stream", &data).await;

    let part = app
        .services
        .downloads
        .read_range(&app.admin, entity.id, "bytes=0-")
        .await
        .unwrap();
    assert_eq!(part.data.len(), MIB);
    assert_eq!(part.content_range(), format!("bytes 0-{}/{}", MIB - 1, data.len()));

    app.shutdown().await;
}

#[tokio::test]
async fn test_image_upload_gets_thumbnail() {
    let app = TestApp::new().await;
    let image = png(1024, 768);
    let entity = app.upload(app.root.id, "photo.png", "image/png", &image).await;

    app.settle().await;

    let view = app.services.downloads.thumbnail(&app.admin, entity.id).await.unwrap();
    let ThumbnailView::Image(thumb) = view else {
        panic!("expected a thumbnail, got {view:?}");
    };
    let decoded = image::load_from_memory(&thumb).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (512, 384));

    app.shutdown().await;
}

#[tokio::test]
async fn test_corrupt_image_leaves_no_thumbnail() {
    let app = TestApp::new().await;
    let entity = app
        .upload(app.root.id, "broken.png", "image/png", b"definitely not a png")
        .await;

    app.settle().await;

    let view = app.services.downloads.thumbnail(&app.admin, entity.id).await.unwrap();
    assert!(matches!(view, ThumbnailView::Unavailable));
    let scratch = std::path::Path::new(&app.config.thumbnail.scratch_dir);
    if scratch.exists() {
        assert_eq!(std::fs::read_dir(scratch).unwrap().count(), 0);
    }
    assert_eq!(app.size_of(app.root.id).await, 20);

    app.shutdown().await;
}

#[tokio::test]
async fn test_text_file_previews_leading_text() {
    let app = TestApp::new().await;
    let entity = app
        .upload(app.root.id, "notes.txt", "text/plain", b"first line\nsecond line\n")
        .await;
    app.settle().await;

    let view = app.services.downloads.thumbnail(&app.admin, entity.id).await.unwrap();
    let ThumbnailView::TextPreview(text) = view else {
        panic!("expected a text preview, got {view:?}");
    };
    assert_eq!(text, "first line<br/>second line<br/>");

    app.shutdown().await;
}

#[tokio::test]
async fn test_colliding_upload_titles_are_numbered() {
    let app = TestApp::new().await;
    let first = app.upload(app.root.id, "report.pdf", "application/pdf", b"one").await;
    let second = app.upload(app.root.id, "report.pdf", "application/pdf", b"two").await;

    assert_eq!(first.title, "report.pdf");
    assert_eq!(second.title, "report (1).pdf");
    assert_ne!(first.storage_key, second.storage_key);
    assert_eq!(app.size_of(app.root.id).await, 6);

    app.shutdown().await;
}
