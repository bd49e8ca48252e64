//! HTTP surface: direct calls, session routing, SSE framing, health.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::StreamExt as _;
use serde_json::{json, Value};
use tower::ServiceExt as _;

use common::{app, post_json, send, QueueTransport};
use graph_relay::upstream::RawResponse;

fn idle_upstream() -> std::sync::Arc<QueueTransport> {
    QueueTransport::new(vec![], RawResponse::new(200, "{}"))
}

/// Read SSE bytes until one full frame (terminated by a blank line) is buffered.
async fn next_frame<S>(stream: &mut S, buf: &mut String) -> String
where
    S: futures::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin,
{
    loop {
        if let Some(end) = buf.find("\n\n") {
            let frame = buf[..end].to_string();
            buf.drain(..end + 2);
            return frame;
        }
        let chunk = stream.next().await.expect("stream ended").unwrap();
        buf.push_str(std::str::from_utf8(&chunk).unwrap());
    }
}

#[tokio::test]
async fn test_direct_tools_list() {
    let app = app(idle_upstream());
    let (status, body) = send(
        &app,
        post_json("/mcp", &json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    let tools = body["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 5);
    assert!(tools.iter().any(|t| t["name"] == "list_edge"));
}

#[tokio::test]
async fn test_notification_is_accepted_without_body() {
    let app = app(idle_upstream());
    let (status, body) = send(
        &app,
        post_json(
            "/mcp",
            &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_malformed_json_gets_parse_error() {
    let app = app(idle_upstream());
    let req = Request::builder()
        .method("POST")
        .uri("/mcp")
        .body(Body::from("{\"jsonrpc\": "))
        .unwrap();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn test_unknown_session_is_answered_directly() {
    let app = app(idle_upstream());
    let uri = format!("/messages?sessionId={}", uuid::Uuid::new_v4());
    let (status, body) = send(
        &app,
        post_json(&uri, &json!({"jsonrpc": "2.0", "id": "p", "method": "ping"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "p");
    assert_eq!(body["result"], json!({}));
}

#[tokio::test]
async fn test_close_unknown_or_missing_session() {
    let app = app(idle_upstream());

    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/messages?sessionId={}", uuid::Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = Request::builder()
        .method("DELETE")
        .uri("/messages")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sse_session_round_trip() {
    let app = app(idle_upstream());

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let mut stream = resp.into_body().into_data_stream();
    let mut buf = String::new();

    let frame = next_frame(&mut stream, &mut buf).await;
    let mut lines = frame.lines();
    assert_eq!(lines.next(), Some("event: endpoint"));
    let endpoint = lines.next().unwrap().strip_prefix("data: ").unwrap().to_string();
    assert!(endpoint.starts_with("/messages?sessionId="));

    let (_, health) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sessions"], 1);

    // The reply comes back on the POST and on the stream.
    let (status, direct) = send(
        &app,
        post_json(&endpoint, &json!({"jsonrpc": "2.0", "id": 7, "method": "ping"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(direct["id"], 7);

    let frame = next_frame(&mut stream, &mut buf).await;
    let mut lines = frame.lines();
    assert_eq!(lines.next(), Some("event: message"));
    let streamed: Value =
        serde_json::from_str(lines.next().unwrap().strip_prefix("data: ").unwrap()).unwrap();
    assert_eq!(streamed, direct);

    let delete = Request::builder()
        .method("DELETE")
        .uri(&endpoint)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(stream.next().await.is_none());
}
