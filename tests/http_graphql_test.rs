//! HTTP GraphQL Client Integration Tests
//!
//! Runs the HTTP transport against a wiremock server.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use telephony_sdk::config::{ApiConfig, Config};
use telephony_sdk::domain::session::UserSession;
use telephony_sdk::infrastructure::graphql::{GraphQlClient, GraphQlOperation, HttpGraphQlClient};
use telephony_sdk::infrastructure::session::StaticUserSession;
use telephony_sdk::TelephonyError;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_config(server: &MockServer) -> ApiConfig {
    let mut api = Config::default().api;
    api.api_url = format!("{}/graphql", server.uri());
    api.request_timeout_secs = 1;
    api
}

fn client(server: &MockServer) -> HttpGraphQlClient {
    let session = Arc::new(StaticUserSession::new("secret-token", "subject", "identity"));
    HttpGraphQlClient::new(&api_config(server), session).expect("Failed to create client")
}

fn get_message() -> GraphQlOperation {
    GraphQlOperation::new(
        "GetMessage",
        "query GetMessage($id: ID!) { getMessage(id: $id) { id } }".to_string(),
        json!({ "id": "msg-1" }),
    )
}

#[tokio::test]
async fn test_execute_posts_operation_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_partial_json(json!({
            "operationName": "GetMessage",
            "variables": { "id": "msg-1" },
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "getMessage": { "id": "msg-1" } } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .execute(get_message())
        .await
        .expect("Failed to execute query");

    assert!(!response.has_errors());
    let message: Option<serde_json::Value> = response.field("getMessage").expect("Failed to read field");
    assert_eq!(message.expect("Missing getMessage")["id"], "msg-1");
}

#[tokio::test]
async fn test_graphql_errors_with_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "bad input", "errorType": "Telephony:InvalidCountryCode" }],
        })))
        .mount(&server)
        .await;

    let response = client(&server)
        .execute(get_message())
        .await
        .expect("GraphQL errors should not fail the request");

    let error = response.first_error().expect("Missing error");
    assert_eq!(error.message, "bad input");
    assert_eq!(error.error_type(), Some("Telephony:InvalidCountryCode"));
}

#[tokio::test]
async fn test_server_error_without_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client(&server).execute(get_message()).await.unwrap_err();

    assert!(matches!(err, TelephonyError::Transport(_)));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": {} }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client(&server).execute(get_message()).await.unwrap_err();

    assert!(matches!(err, TelephonyError::Timeout(_)));
}

#[tokio::test]
async fn test_signed_out_session_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let session = Arc::new(StaticUserSession::new("secret-token", "subject", "identity"));
    session.reset().await.expect("Failed to sign out");
    let client = HttpGraphQlClient::new(&api_config(&server), session).expect("Failed to create client");

    let err = client.execute(get_message()).await.unwrap_err();

    assert_eq!(err, TelephonyError::NotSignedIn);
}
