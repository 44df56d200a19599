//! HTTP behavior of NotionClient against a local mock server
//!
//! Covers:
//! - Auth and version headers
//! - Retry on 429/5xx with backoff
//! - No retry on other 4xx
//! - Exact-title search

use notion_client::{ClientConfig, NotionApi, NotionClient, NotionError, ObjectKind};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> NotionClient {
    NotionClient::new(ClientConfig {
        base_url: format!("{}/v1", server.uri()),
        token: "secret_test".into(),
        requests_per_second: 0.0,
        max_retries: 3,
        base_delay_ms: 1,
        ..Default::default()
    })
    .expect("client")
}

#[tokio::test]
async fn test_create_page_sends_auth_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .and(header("authorization", "Bearer secret_test"))
        .and(header("notion-version", "2022-06-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "page",
            "id": "p-123",
            "url": "https://www.notion.so/p-123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let page = client
        .create_page(json!({"parent": {"page_id": "root"}}))
        .await
        .unwrap();

    assert_eq!(page.id, "p-123");
    assert_eq!(page.object, "page");
}

#[tokio::test]
async fn test_retries_rate_limit_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/databases"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/databases"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "database", "id": "db-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let db = client.create_database(json!({"title": []})).await.unwrap();
    assert_eq!(db.id, "db-1");
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v1/databases/db-1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .update_database("db-1", json!({"properties": {}}))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_rate_limit_exhaustion_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(429))
        .expect(4)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.create_page(json!({})).await.unwrap_err();
    assert!(matches!(err, NotionError::RateLimited { attempts: 4 }));
}

#[tokio::test]
async fn test_validation_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "object": "error",
            "status": 400,
            "code": "validation_error",
            "message": "body.parent should be defined"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.create_page(json!({})).await.unwrap_err();
    match err {
        NotionError::Api { status, code, message } => {
            assert_eq!(status, 400);
            assert_eq!(code, "validation_error");
            assert!(message.contains("parent"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_append_children() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v1/blocks/page-9/children"))
        .and(body_partial_json(json!({"children": [{"divider": {}}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "list", "results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .append_block_children("page-9", vec![json!({"divider": {}})])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_find_by_title_requires_exact_match() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .and(body_partial_json(json!({"filter": {"property": "object", "value": "database"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "results": [
                {"object": "database", "id": "db-near", "title": [{"plain_text": "Tasks Archive"}]},
                {"object": "database", "id": "db-old", "archived": true, "title": [{"plain_text": "Tasks"}]},
                {"object": "database", "id": "db-exact", "title": [{"plain_text": "Tasks"}]}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let found = client
        .find_by_title(ObjectKind::Database, "Tasks")
        .await
        .unwrap();
    assert_eq!(found.as_deref(), Some("db-exact"));

    let missing = client
        .find_by_title(ObjectKind::Database, "Projects")
        .await
        .unwrap();
    assert!(missing.is_none());
}
