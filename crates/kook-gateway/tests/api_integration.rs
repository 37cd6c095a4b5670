//! HTTP API integration tests.
//!
//! Exercises gateway lookup and message sends against a mock HTTP server.

use kook_gateway::gateway::ResumeState;
use kook_gateway::{BotToken, GatewayError, KookApi};
use mockito::{Matcher, Server};
use serde_json::json;

const TOKEN: &str = "1/MTA=/test-token";

fn api(server: &Server) -> KookApi {
    KookApi::new(&format!("{}/api/v3", server.url()), BotToken::new(TOKEN)).expect("api client")
}

fn envelope(data: serde_json::Value) -> String {
    json!({"code": 0, "message": "操作成功", "data": data}).to_string()
}

// ============================================================================
// Gateway lookup
// ============================================================================

#[tokio::test]
async fn test_resolve_gateway_plain() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/gateway/index")
        .match_query(Matcher::Exact("compress=1".to_string()))
        .match_header("authorization", format!("Bot {TOKEN}").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(envelope(json!({"url": "wss://ws.example.com/gateway?compress=1"})))
        .create_async()
        .await;

    let endpoint = api(&server)
        .resolve_gateway(true, &ResumeState::default())
        .await
        .expect("endpoint");

    assert_eq!(endpoint.url, "wss://ws.example.com/gateway?compress=1");
    assert!(!endpoint.resume);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_resolve_gateway_resume_parameters() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/gateway/index")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("compress".into(), "0".into()),
            Matcher::UrlEncoded("resume".into(), "1".into()),
            Matcher::UrlEncoded("sn".into(), "42".into()),
            Matcher::UrlEncoded("session_id".into(), "abc-123".into()),
        ]))
        .with_status(200)
        .with_body(envelope(json!({"url": "ws://127.0.0.1:1/gateway"})))
        .create_async()
        .await;

    let resume = ResumeState {
        session_id: Some("abc-123".to_string()),
        last_sequence: 42,
    };
    let endpoint = api(&server)
        .resolve_gateway(false, &resume)
        .await
        .expect("endpoint");

    assert!(endpoint.resume);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_resolve_gateway_http_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v3/gateway/index")
        .match_query(Matcher::Any)
        .with_status(502)
        .create_async()
        .await;

    let err = api(&server)
        .resolve_gateway(true, &ResumeState::default())
        .await
        .expect_err("502");

    assert!(matches!(err, GatewayError::Locator(ref msg) if msg.contains("502")));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_resolve_gateway_application_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v3/gateway/index")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"code": 401, "message": "你的用户凭证不正确", "data": {}}).to_string())
        .create_async()
        .await;

    let err = api(&server)
        .resolve_gateway(true, &ResumeState::default())
        .await
        .expect_err("code 401");

    assert!(matches!(err, GatewayError::Locator(ref msg) if msg.contains("401")));
}

#[tokio::test]
async fn test_resolve_gateway_rejects_non_websocket_url() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v3/gateway/index")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(envelope(json!({"url": "https://not-a-socket.example.com"})))
        .create_async()
        .await;

    let err = api(&server)
        .resolve_gateway(true, &ResumeState::default())
        .await
        .expect_err("bad scheme");

    assert!(matches!(err, GatewayError::Locator(ref msg) if msg.contains("websocket")));
}

#[tokio::test]
async fn test_resolve_gateway_missing_url() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v3/gateway/index")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(envelope(json!({})))
        .create_async()
        .await;

    let err = api(&server)
        .resolve_gateway(true, &ResumeState::default())
        .await
        .expect_err("no url");

    assert!(matches!(err, GatewayError::Locator(_)));
}

#[tokio::test]
async fn test_resolve_gateway_unreachable() {
    // nothing listens on port 9 locally
    let api = KookApi::new("http://127.0.0.1:9/api/v3", BotToken::new(TOKEN)).expect("api");

    let err = api
        .resolve_gateway(true, &ResumeState::default())
        .await
        .expect_err("connection refused");

    assert!(matches!(err, GatewayError::Locator(_)));
}

// ============================================================================
// Message sends
// ============================================================================

#[tokio::test]
async fn test_send_text() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v3/message/create")
        .match_header("authorization", format!("Bot {TOKEN}").as_str())
        .match_body(Matcher::Json(json!({
            "target_id": "chan-1",
            "content": "hello",
            "type": 1
        })))
        .with_status(200)
        .with_body(envelope(json!({
            "msg_id": "67b8a3c1",
            "msg_timestamp": 1_612_245_987_000_i64,
            "nonce": ""
        })))
        .create_async()
        .await;

    let receipt = api(&server)
        .send_text("chan-1", "hello")
        .await
        .expect("receipt");

    assert_eq!(receipt.msg_id, "67b8a3c1");
    assert_eq!(receipt.msg_timestamp, 1_612_245_987_000);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_send_image() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v3/message/create")
        .match_body(Matcher::Json(json!({
            "target_id": "chan-1",
            "content": "https://img.kookapp.cn/assets/x.png",
            "type": 2
        })))
        .with_status(200)
        .with_body(envelope(json!({"msg_id": "img-1"})))
        .create_async()
        .await;

    let receipt = api(&server)
        .send_image("chan-1", "https://img.kookapp.cn/assets/x.png")
        .await
        .expect("receipt");

    assert_eq!(receipt.msg_id, "img-1");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_send_rejected_by_api() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/v3/message/create")
        .with_status(200)
        .with_body(json!({"code": 40000, "message": "target not found", "data": []}).to_string())
        .create_async()
        .await;

    let err = api(&server)
        .send_text("missing", "hello")
        .await
        .expect_err("rejected");

    match err {
        GatewayError::Api { code, message } => {
            assert_eq!(code, 40000);
            assert_eq!(message, "target not found");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_send_http_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/v3/message/create")
        .with_status(403)
        .with_body("forbidden")
        .create_async()
        .await;

    let err = api(&server)
        .send_text("chan-1", "hello")
        .await
        .expect_err("403");

    assert!(matches!(err, GatewayError::Api { code: 403, .. }));
}
