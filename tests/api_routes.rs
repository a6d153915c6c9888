//! HTTP adapter routes, driven with `tower::ServiceExt::oneshot`

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tbank_integration::api::{router, AppState};
use tbank_integration::{TBankClient, TBankConfig};
use tower::ServiceExt;

const TERMINAL: &str = "TestTerminal";
const PASSWORD: &str = "terminal-secret";

fn app(base_url: String) -> Router {
    let config = TBankConfig {
        base_url,
        notification_url: Some("https://shop.example/api/payment/callback".to_string()),
        ..TBankConfig::new(TERMINAL, PASSWORD)
    };
    let client = TBankClient::new(config).unwrap();
    router(AppState::new(Arc::new(client), "development"))
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn mock_init(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/Init");
            then.status(200).json_body(json!({
                "Success": true,
                "ErrorCode": "0",
                "TerminalKey": TERMINAL,
                "Status": "NEW",
                "PaymentId": "p1",
                "OrderId": "A1",
                "Amount": 1500,
                "PaymentURL": "http://x"
            }));
        })
        .await
}

fn callback_body(terminal: &str, status: &str) -> String {
    json!({
        "TerminalKey": terminal,
        "OrderId": "A1",
        "Success": true,
        "Status": status,
        "PaymentId": 700000123,
        "ErrorCode": "0",
        "Amount": 1500,
        "Token": "ignored"
    })
    .to_string()
}

#[tokio::test]
async fn test_health() {
    let app = app("http://127.0.0.1:1".to_string());

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "development");
    assert_eq!(body["terminal_configured"], true);
}

#[tokio::test]
async fn test_initiate_returns_payment_url() {
    let server = MockServer::start_async().await;
    let init = mock_init(&server).await;
    let app = app(server.base_url());

    let response = app
        .oneshot(post_json(
            "/api/payment/initiate",
            r#"{"orderId":"A1","amount":1500,"description":"Order A1"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["paymentUrl"], "http://x");
    assert_eq!(body["orderId"], "A1");
    assert_eq!(body["paymentId"], "p1");
    assert_eq!(init.hits_async().await, 1);
}

#[tokio::test]
async fn test_initiate_forwards_client_ip() {
    let server = MockServer::start_async().await;
    let init = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/Init")
                .json_body_partial(r#"{"IP":"203.0.113.7","Amount":1500}"#);
            then.status(200)
                .json_body(json!({"Success": true, "Status": "NEW", "PaymentId": "p9"}));
        })
        .await;
    let app = app(server.base_url());

    let mut request = post_json("/api/payment/initiate", r#"{"amount":1500}"#);
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["orderId"].as_str().unwrap().len(), 32);
    assert_eq!(init.hits_async().await, 1);
}

#[tokio::test]
async fn test_initiate_validation_error_is_bad_request() {
    let server = MockServer::start_async().await;
    let init = mock_init(&server).await;
    let app = app(server.base_url());

    let response = app
        .oneshot(post_json(
            "/api/payment/initiate",
            r#"{"orderId":"A1","amount":0}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(init.hits_async().await, 0);
}

#[tokio::test]
async fn test_initiate_malformed_body_is_bad_request() {
    let app = app("http://127.0.0.1:1".to_string());

    let response = app
        .oneshot(post_json("/api/payment/initiate", "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_initiate_gateway_rejection_is_bad_gateway() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/Init");
            then.status(200).json_body(json!({
                "Success": false,
                "ErrorCode": "X",
                "Message": "Terminal blocked"
            }));
        })
        .await;
    let app = app(server.base_url());

    let response = app
        .oneshot(post_json(
            "/api/payment/initiate",
            r#"{"orderId":"A1","amount":1500}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = body_json(response).await;
    assert_eq!(body["error"], "gateway_rejected");
    assert_eq!(body["errorCode"], "X");
}

#[tokio::test]
async fn test_callback_updates_status() {
    let server = MockServer::start_async().await;
    mock_init(&server).await;
    let app = app(server.base_url());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/payment/initiate",
            r#"{"orderId":"A1","amount":1500}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/payment/callback",
            &callback_body(TERMINAL, "CONFIRMED"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");

    let response = app.oneshot(get("/api/payment/status/A1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "CONFIRMED");
    assert_eq!(body["paymentId"], "p1");
}

#[tokio::test]
async fn test_callback_with_foreign_terminal_is_bad_request() {
    let app = app("http://127.0.0.1:1".to_string());

    let response = app
        .oneshot(post_json(
            "/api/payment/callback",
            &callback_body("OtherTerminal", "CONFIRMED"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "notification_rejected");
}

#[tokio::test]
async fn test_callback_with_garbage_is_bad_request() {
    let app = app("http://127.0.0.1:1".to_string());

    let response = app
        .oneshot(post_json("/api/payment/callback", "garbage"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_notification");
}

#[tokio::test]
async fn test_confirm_and_cancel_routes() {
    let server = MockServer::start_async().await;
    let confirm = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/Confirm")
                .json_body_partial(r#"{"PaymentId":"p1","Amount":1500}"#);
            then.status(200)
                .json_body(json!({"Success": true, "Status": "CONFIRMED"}));
        })
        .await;
    let cancel = server
        .mock_async(|when, then| {
            when.method(POST).path("/Cancel");
            then.status(200).json_body(json!({
                "Success": false,
                "ErrorCode": "7",
                "Message": "Неверный статус транзакции"
            }));
        })
        .await;
    let app = app(server.base_url());

    let response = app
        .clone()
        .oneshot(post_json("/api/payment/confirm/p1", r#"{"amount":1500}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    let response = app
        .oneshot(post_json("/api/payment/cancel/p1", "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["errorCode"], "7");

    assert_eq!(confirm.hits_async().await, 1);
    assert_eq!(cancel.hits_async().await, 1);
}

#[tokio::test]
async fn test_public_config_has_no_password() {
    let app = app("http://127.0.0.1:1".to_string());

    let response = app.oneshot(get("/api/payment/config")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    assert!(!text.contains(PASSWORD));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["terminalKey"], TERMINAL);
    assert_eq!(
        body["callbackURL"],
        "https://shop.example/api/payment/callback"
    );
}
