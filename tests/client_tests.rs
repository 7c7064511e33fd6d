//! API client integration tests against mock trader/market endpoints

use std::sync::Arc;
use std::time::Duration;

use mockito::Matcher;
use schwab_mcp::Error;
use schwab_mcp::auth::{Token, TokenStore};
use schwab_mcp::client::SchwabClient;

struct Fixture {
    server: mockito::ServerGuard,
    client: SchwabClient,
    tokens: Arc<TokenStore>,
    _dir: tempfile::TempDir,
}

fn now_epoch() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

async fn fixture() -> Fixture {
    let server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();

    let tokens = Arc::new(TokenStore::new(
        reqwest::Client::new(),
        format!("{}/v1/oauth/token", server.url()),
        "client-id".to_string(),
        "client-secret".to_string(),
        dir.path().join("token.json"),
        Duration::from_secs(60),
    ));
    tokens
        .save(&Token {
            access_token: "A1".to_string(),
            refresh_token: "R1".to_string(),
            expires_at: now_epoch() + 3600.0,
            token_type: "Bearer".to_string(),
        })
        .unwrap();

    let client = SchwabClient::new(
        Arc::clone(&tokens),
        format!("{}/trader/v1", server.url()),
        format!("{}/marketdata/v1", server.url()),
        Duration::from_secs(5),
    )
    .unwrap();

    Fixture {
        server,
        client,
        tokens,
        _dir: dir,
    }
}

#[tokio::test]
async fn quotes_sends_bearer_and_decodes_json() {
    let mut fx = fixture().await;

    let mock = fx
        .server
        .mock("GET", "/marketdata/v1/quotes")
        .match_header("authorization", "Bearer A1")
        .match_query(Matcher::UrlEncoded("symbols".into(), "AAPL,MSFT".into()))
        .with_status(200)
        .with_body(r#"{"AAPL":{"quote":{"lastPrice":1.0}},"MSFT":{"quote":{"lastPrice":2.0}}}"#)
        .expect(1)
        .create_async()
        .await;

    let response = fx
        .client
        .quotes(&["aapl".to_string(), "msft".to_string()])
        .await
        .unwrap();
    assert_eq!(response["MSFT"]["quote"]["lastPrice"], 2.0);
    mock.assert_async().await;
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let mut fx = fixture().await;

    let mock = fx
        .server
        .mock("GET", "/trader/v1/accounts/accountNumbers")
        .with_status(429)
        .with_header("retry-after", "17")
        .expect(1)
        .create_async()
        .await;

    match fx.client.account_numbers().await {
        Err(Error::RateLimited { retry_after }) => assert_eq!(retry_after, Some(17)),
        other => panic!("expected RateLimited, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn missing_resource_is_not_found() {
    let mut fx = fixture().await;

    let mock = fx
        .server
        .mock("GET", "/trader/v1/accounts/BADHASH")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    match fx.client.account("BADHASH", &[]).await {
        Err(Error::NotFound(message)) => assert!(message.contains("BADHASH")),
        other => panic!("expected NotFound, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn rejected_bearer_forces_exactly_one_refresh() {
    let mut fx = fixture().await;

    // Stale bearer rejected once
    let rejected = fx
        .server
        .mock("GET", "/trader/v1/accounts")
        .match_header("authorization", "Bearer A1")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let refresh = fx
        .server
        .mock("POST", "/v1/oauth/token")
        .match_body(Matcher::UrlEncoded("refresh_token".into(), "R1".into()))
        .with_status(200)
        .with_body(
            r#"{"access_token":"A2","token_type":"Bearer","expires_in":1800,"refresh_token":"R2"}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let retried = fx
        .server
        .mock("GET", "/trader/v1/accounts")
        .match_header("authorization", "Bearer A2")
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let response = fx.client.accounts(&[]).await.unwrap();
    assert!(response.as_array().unwrap().is_empty());

    rejected.assert_async().await;
    refresh.assert_async().await;
    retried.assert_async().await;

    // The rotated refresh token survived the detour
    let token = fx.tokens.valid_token().await.unwrap();
    assert_eq!(token.refresh_token, "R2");
}

#[tokio::test]
async fn second_rejection_surfaces_auth_failure() {
    let mut fx = fixture().await;

    let rejected = fx
        .server
        .mock("GET", "/trader/v1/accounts")
        .with_status(401)
        .with_body(r#"{"error":"invalid_token"}"#)
        .expect(2)
        .create_async()
        .await;

    let refresh = fx
        .server
        .mock("POST", "/v1/oauth/token")
        .with_status(200)
        .with_body(
            r#"{"access_token":"A2","token_type":"Bearer","expires_in":1800,"refresh_token":"R2"}"#,
        )
        .expect(1)
        .create_async()
        .await;

    match fx.client.accounts(&[]).await {
        Err(Error::AuthFailure { status, .. }) => assert_eq!(status, 401),
        other => panic!("expected AuthFailure, got {other:?}"),
    }
    rejected.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_failure() {
    let mut fx = fixture().await;

    let mock = fx
        .server
        .mock("GET", "/trader/v1/accounts/accountNumbers")
        .with_status(200)
        .with_body("<html>Service Unavailable</html>")
        .expect(1)
        .create_async()
        .await;

    match fx.client.account_numbers().await {
        Err(Error::DecodeFailure(_)) => {}
        other => panic!("expected DecodeFailure, got {other:?}"),
    }
    mock.assert_async().await;
}
