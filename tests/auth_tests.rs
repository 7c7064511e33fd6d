//! Token lifecycle integration tests against a mock token endpoint

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use schwab_mcp::Error;
use schwab_mcp::auth::{Token, TokenStore};

fn store_for(server: &mockito::Server, dir: &tempfile::TempDir) -> TokenStore {
    TokenStore::new(
        reqwest::Client::new(),
        format!("{}/v1/oauth/token", server.url()),
        "client-id".to_string(),
        "client-secret".to_string(),
        dir.path().join("token.json"),
        Duration::from_secs(60),
    )
}

fn seed_token(store: &TokenStore, refresh_token: &str, expires_at: f64) {
    store
        .save(&Token {
            access_token: "stale-access".to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at,
            token_type: "Bearer".to_string(),
        })
        .unwrap();
}

fn token_body(access: &str, refresh: &str) -> String {
    format!(
        r#"{{"access_token":"{access}","token_type":"Bearer","expires_in":1800,"refresh_token":"{refresh}"}}"#
    )
}

fn refresh_matcher(refresh_token: &str) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
        Matcher::UrlEncoded("refresh_token".into(), refresh_token.into()),
    ])
}

fn read_disk_token(path: &PathBuf) -> Token {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn refresh_rotates_and_persists_the_new_refresh_token() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let store = store_for(&server, &dir);
    seed_token(&store, "R0", 0.0);

    let first = server
        .mock("POST", "/v1/oauth/token")
        .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
        .match_body(refresh_matcher("R0"))
        .with_status(200)
        .with_body(token_body("A1", "R1"))
        .expect(1)
        .create_async()
        .await;

    let token = store.valid_token().await.unwrap();
    assert_eq!(token.access_token, "A1");
    assert_eq!(token.refresh_token, "R1");
    first.assert_async().await;

    // Rotation hit the disk before the refresh call returned
    assert_eq!(read_disk_token(store.token_path()).refresh_token, "R1");

    // A forced second refresh presents R1, not R0
    let second = server
        .mock("POST", "/v1/oauth/token")
        .match_body(refresh_matcher("R1"))
        .with_status(200)
        .with_body(token_body("A2", "R2"))
        .expect(1)
        .create_async()
        .await;

    let token = store.refresh().await.unwrap();
    assert_eq!(token.access_token, "A2");
    second.assert_async().await;
    assert_eq!(read_disk_token(store.token_path()).refresh_token, "R2");
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store_for(&server, &dir));
    seed_token(&store, "R0", 0.0);

    let mock = server
        .mock("POST", "/v1/oauth/token")
        .match_body(refresh_matcher("R0"))
        .with_status(200)
        .with_body(token_body("A1", "R1"))
        .expect(1)
        .create_async()
        .await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move { store.valid_token().await }));
    }

    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token.access_token, "A1");
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn concurrent_callers_share_one_failed_refresh() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store_for(&server, &dir));
    seed_token(&store, "R0", 0.0);

    // Body delivery stalls so every caller queues while the one attempt
    // is still in flight.
    let mock = server
        .mock("POST", "/v1/oauth/token")
        .with_status(400)
        .with_chunked_body(|writer| {
            std::thread::sleep(Duration::from_millis(200));
            writer.write_all(br#"{"error":"invalid_client"}"#)
        })
        .expect(1)
        .create_async()
        .await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move { store.valid_token().await }));
    }

    for handle in handles {
        match handle.await.unwrap() {
            Err(Error::AuthFailure { status, .. }) => assert_eq!(status, 400),
            other => panic!("expected AuthFailure, got {other:?}"),
        }
    }
    mock.assert_async().await;

    // The failure does not poison the store; a later caller retries
    let retry = server
        .mock("POST", "/v1/oauth/token")
        .match_body(refresh_matcher("R0"))
        .with_status(200)
        .with_body(token_body("A1", "R1"))
        .expect(1)
        .create_async()
        .await;

    let token = store.valid_token().await.unwrap();
    assert_eq!(token.access_token, "A1");
    retry.assert_async().await;
}

#[tokio::test]
async fn timed_out_refresh_surfaces_timeout_and_releases_the_gate() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();

    let store = TokenStore::new(
        reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap(),
        format!("{}/v1/oauth/token", server.url()),
        "client-id".to_string(),
        "client-secret".to_string(),
        dir.path().join("token.json"),
        Duration::from_secs(60),
    );
    seed_token(&store, "R0", 0.0);

    let slow = server
        .mock("POST", "/v1/oauth/token")
        .with_status(200)
        .with_chunked_body(|writer| {
            std::thread::sleep(Duration::from_millis(500));
            writer.write_all(token_body("A1", "R1").as_bytes())
        })
        .create_async()
        .await;

    match store.valid_token().await {
        Err(Error::TimeoutFailure(_)) => {}
        other => panic!("expected TimeoutFailure, got {other:?}"),
    }
    slow.remove_async().await;

    // The stored token survived and the gate is free for a retry
    assert_eq!(read_disk_token(store.token_path()).refresh_token, "R0");

    let fast = server
        .mock("POST", "/v1/oauth/token")
        .match_body(refresh_matcher("R0"))
        .with_status(200)
        .with_body(token_body("A2", "R2"))
        .expect(1)
        .create_async()
        .await;

    let token = store.valid_token().await.unwrap();
    assert_eq!(token.access_token, "A2");
    fast.assert_async().await;
}

#[tokio::test]
async fn rejected_refresh_leaves_the_stored_token_untouched() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let store = store_for(&server, &dir);
    seed_token(&store, "R0", 0.0);

    let mock = server
        .mock("POST", "/v1/oauth/token")
        .with_status(400)
        .with_body(r#"{"error":"unsupported_token_type"}"#)
        .expect(1)
        .create_async()
        .await;

    match store.valid_token().await {
        Err(Error::AuthFailure { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("unsupported_token_type"));
        }
        other => panic!("expected AuthFailure, got {other:?}"),
    }
    mock.assert_async().await;

    // The refresh token on disk is still usable for a later attempt
    assert_eq!(read_disk_token(store.token_path()).refresh_token, "R0");
}

#[tokio::test]
async fn missing_rotated_refresh_token_is_a_decode_failure() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let store = store_for(&server, &dir);
    seed_token(&store, "R0", 0.0);

    let mock = server
        .mock("POST", "/v1/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token":"A1","token_type":"Bearer","expires_in":1800}"#)
        .expect(1)
        .create_async()
        .await;

    match store.valid_token().await {
        Err(Error::DecodeFailure(message)) => {
            assert!(message.contains("refresh_token"));
        }
        other => panic!("expected DecodeFailure, got {other:?}"),
    }
    mock.assert_async().await;
    assert_eq!(read_disk_token(store.token_path()).refresh_token, "R0");
}

#[tokio::test]
async fn fresh_token_skips_the_network_entirely() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let store = store_for(&server, &dir);

    let mock = server
        .mock("POST", "/v1/oauth/token")
        .expect(0)
        .create_async()
        .await;

    let expires_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
        + 3600.0;
    seed_token(&store, "R0", expires_at);

    let token = store.valid_token().await.unwrap();
    assert_eq!(token.access_token, "stale-access");
    mock.assert_async().await;
}

#[tokio::test]
async fn code_exchange_seeds_the_token_file() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    let store = store_for(&server, &dir);

    let mock = server
        .mock("POST", "/v1/oauth/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "C0.abc".into()),
            Matcher::UrlEncoded("redirect_uri".into(), "https://127.0.0.1".into()),
        ]))
        .with_status(200)
        .with_body(token_body("A0", "R0"))
        .expect(1)
        .create_async()
        .await;

    let token = store
        .exchange_code("C0.abc", "https://127.0.0.1")
        .await
        .unwrap();
    assert_eq!(token.refresh_token, "R0");
    mock.assert_async().await;

    assert_eq!(read_disk_token(store.token_path()).access_token, "A0");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(store.token_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
