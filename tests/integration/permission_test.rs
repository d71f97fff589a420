//! Access control through the services.

use docvault_core::error::ErrorKind;
use docvault_core::types::UploadSessionId;
use docvault_entity::permission::{Capabilities, Grantee};
use docvault_entity::upload::ChunkRequest;
use docvault_service::RequestContext;
use docvault_service::permission::GrantRequest;

use crate::helpers::TestApp;

#[tokio::test]
async fn test_private_file_needs_grant_or_token() {
    let app = TestApp::new().await;
    let vault = app
        .services
        .entities
        .create_folder(&app.admin, app.root.id, "vault", true)
        .await
        .unwrap();
    let secret = app.upload(vault.id, "secret.txt", "text/plain", b"hush").await;
    let member = app.member();

    let listed = app.services.entities.list_children(&member, app.root.id).await.unwrap();
    assert!(listed.iter().all(|e| e.id != vault.id));
    let err = app.services.downloads.open(&member, secret.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::PermissionDenied);

    let principal_id = member.principal().unwrap().id;
    app.services
        .permissions
        .grant(
            &app.admin,
            vault.id,
            GrantRequest {
                grantee: Grantee::Principal(principal_id),
                capabilities: Capabilities::READ_ONLY,
                expires_at: None,
            },
        )
        .await
        .unwrap();
    let download = app.services.downloads.open(&member, secret.id).await.unwrap();
    assert_eq!(download.size, 4);

    let token = app.services.permissions.issue_token(&member, secret.id).await.unwrap();
    let anonymous = RequestContext::anonymous().with_bypass_token(token.token.clone());
    let part = app
        .services
        .downloads
        .read_range(&anonymous, secret.id, "bytes=0-1")
        .await
        .unwrap();
    assert_eq!(part.data.as_ref(), b"hu");

    let err = app.services.downloads.open(&anonymous, vault.id).await.unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Authentication | ErrorKind::PermissionDenied));

    assert!(
        app.services
            .permissions
            .revoke(&app.admin, vault.id, Grantee::Principal(principal_id))
            .await
            .unwrap()
    );
    let err = app.services.downloads.open(&member, secret.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::PermissionDenied);

    app.shutdown().await;
}

#[tokio::test]
async fn test_member_cannot_upload_without_write() {
    let app = TestApp::new().await;
    let member = app.member();
    let request = ChunkRequest {
        session_id: UploadSessionId::new(),
        title: "x.bin".to_string(),
        mime_type: None,
        chunk_index: 0,
        total_chunks: 1,
        byte_offset: 0,
        total_size: 3,
    };

    let err = app
        .services
        .uploads
        .receive_chunk(&member, app.root.id, &request, b"abc")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::PermissionDenied);
    assert_eq!(app.size_of(app.root.id).await, 0);

    app.shutdown().await;
}
