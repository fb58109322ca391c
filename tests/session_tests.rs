//! Store-level tests for session issuance, expiry, and the purge sweep.

use easel::config::SecurityConfig;
use easel::db::Store;

fn fast_security() -> SecurityConfig {
    SecurityConfig {
        argon2_memory_cost_kib: 1024,
        argon2_time_cost: 1,
        ..SecurityConfig::default()
    }
}

async fn memory_store() -> Store {
    Store::with_pool_options("sqlite::memory:", 1, 1)
        .await
        .expect("failed to open in-memory store")
}

#[tokio::test]
async fn test_session_lifecycle() {
    let store = memory_store().await;
    let security = fast_security();

    let user = store
        .create_user("gina", "gina@example.com", "secret123", None, &security)
        .await
        .unwrap();

    let session = store
        .create_session(user.id, 7, Some("10.0.0.1"), Some("test-agent"))
        .await
        .unwrap();
    assert_eq!(session.session_token.len(), 64);

    let verified = store.verify_session(&session.session_token).await.unwrap();
    assert_eq!(verified.unwrap().id, user.id);

    assert!(store.delete_session(&session.session_token).await.unwrap());
    assert!(!store.delete_session(&session.session_token).await.unwrap());

    let verified = store.verify_session(&session.session_token).await.unwrap();
    assert!(verified.is_none());
}

#[tokio::test]
async fn test_expired_sessions_are_rejected_and_purged() {
    let store = memory_store().await;
    let security = fast_security();

    let user = store
        .create_user("henry", "henry@example.com", "secret123", None, &security)
        .await
        .unwrap();

    // Negative TTL produces a session that expired before it was issued.
    let expired = store.create_session(user.id, -1, None, None).await.unwrap();
    let valid = store.create_session(user.id, 7, None, None).await.unwrap();

    assert!(
        store
            .verify_session(&expired.session_token)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        store
            .verify_session(&valid.session_token)
            .await
            .unwrap()
            .is_some()
    );

    let purged = store.purge_expired_sessions().await.unwrap();
    assert_eq!(purged, 1);

    // The live session survives the sweep.
    assert!(
        store
            .verify_session(&valid.session_token)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_inactive_users_cannot_login() {
    let store = memory_store().await;
    let security = fast_security();

    store
        .create_user("iris", "iris@example.com", "secret123", None, &security)
        .await
        .unwrap();

    // Lookup works by username or email, wrong password yields nothing.
    assert!(
        store
            .verify_user_password("iris", "secret123")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        store
            .verify_user_password("iris@example.com", "secret123")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        store
            .verify_user_password("iris", "wrong")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_image_history_is_newest_first_and_limited() {
    let store = memory_store().await;
    let security = fast_security();

    let user = store
        .create_user("judy", "judy@example.com", "secret123", None, &security)
        .await
        .unwrap();

    for i in 0..3 {
        store
            .record_generated_image(
                user.id,
                &format!("outputs/{i}.png"),
                &format!("prompt {i}"),
                "",
                "txt2img",
                None,
            )
            .await
            .unwrap();
    }

    let images = store.list_generated_images(user.id, 2).await.unwrap();
    assert_eq!(images.len(), 2);
    assert!(images[0].id > images[1].id);
}
