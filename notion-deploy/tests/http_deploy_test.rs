//! Deployment through the real HTTP client against a local mock server

use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notion_client::{ClientConfig, NotionClient};
use notion_deploy::{DatabaseDef, DeployConfig, Deployer, DeploymentState, Document, PageDef};

fn client_for(server: &MockServer) -> Arc<NotionClient> {
    Arc::new(
        NotionClient::new(ClientConfig {
            base_url: format!("{}/v1", server.uri()),
            token: "ntn_test".into(),
            requests_per_second: 0.0,
            max_retries: 2,
            base_delay_ms: 1,
            ..Default::default()
        })
        .expect("client"),
    )
}

#[tokio::test]
async fn test_page_and_database_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .and(body_partial_json(json!({"parent": {"page_id": "root-page"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "page", "id": "page-a"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/databases"))
        .and(body_partial_json(json!({"parent": {"page_id": "page-a"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "database", "id": "db-a"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v1/databases/db-a"))
        .and(body_partial_json(json!({"properties": {"Total": {"rollup": {"function": "sum"}}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "database", "id": "db-a"})))
        .expect(1)
        .mount(&server)
        .await;

    let document = Document {
        pages: vec![PageDef {
            title: "Budget".into(),
            ..Default::default()
        }],
        databases: vec![DatabaseDef {
            title: "Expenses".into(),
            parent: Some("Budget".into()),
            properties: json!({
                "Item": "title",
                "Parent": {"type": "relation", "database": "Expenses"},
                "Total": {"type": "rollup", "relation": "Parent", "property": "Amount", "function": "sum"}
            }),
            ..Default::default()
        }],
        ..Default::default()
    };

    // The self-relation is deferred too, so it gets its own PATCH
    Mock::given(method("PATCH"))
        .and(path("/v1/databases/db-a"))
        .and(body_partial_json(json!({"properties": {"Parent": {"relation": {"database_id": "db-a"}}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "database", "id": "db-a"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut state = DeploymentState::new();
    Deployer::new(client_for(&server), DeployConfig::default(), "root-page")
        .deploy(&document, &mut state)
        .await
        .unwrap();

    assert_eq!(state.page_id("Budget"), Some("page-a"));
    assert_eq!(state.database_id("Expenses"), Some("db-a"));
    assert!(state.errors.is_empty(), "{:?}", state.errors);
    assert_eq!(state.pending_count(), 0);
}

#[tokio::test]
async fn test_api_error_is_recorded_and_run_continues() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .and(body_partial_json(json!({"properties": {"title": {"title": [{"text": {"content": "Bad"}}]}}})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "object": "error",
            "status": 400,
            "code": "validation_error",
            "message": "body failed validation"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .and(body_partial_json(json!({"properties": {"title": {"title": [{"text": {"content": "Good"}}]}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "page", "id": "page-good"})))
        .expect(1)
        .mount(&server)
        .await;

    let document = Document {
        pages: vec![
            PageDef {
                title: "Bad".into(),
                ..Default::default()
            },
            PageDef {
                title: "Good".into(),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let mut state = DeploymentState::new();
    Deployer::new(client_for(&server), DeployConfig::default(), "root-page")
        .deploy(&document, &mut state)
        .await
        .unwrap();

    assert_eq!(state.page_id("Good"), Some("page-good"));
    assert!(state.page_id("Bad").is_none());
    assert_eq!(state.errors.len(), 1);
    assert!(state.errors[0].message.contains("validation_error"));
}
