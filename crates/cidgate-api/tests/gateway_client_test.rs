#![allow(clippy::unwrap_used)]
// Integration tests for `GatewayClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cidgate_api::{Error, GatewayClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

const CID: &str = "bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy";

async fn setup() -> (MockServer, GatewayClient) {
    let server = MockServer::start().await;
    let client = GatewayClient::new(&TransportConfig::default()).unwrap();
    (server, client)
}

fn object_url(server: &MockServer) -> String {
    format!("{}/ipfs/{CID}", server.uri())
}

fn object_path() -> String {
    format!("/ipfs/{CID}")
}

const SHORT: Duration = Duration::from_secs(5);

// ── Metadata probe ──────────────────────────────────────────────────

#[tokio::test]
async fn test_head_reports_metadata() {
    let (server, client) = setup().await;

    Mock::given(method("HEAD"))
        .and(path(object_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .insert_header("accept-ranges", "bytes")
                .insert_header("access-control-allow-origin", "*"),
        )
        .mount(&server)
        .await;

    let head = client.head(&object_url(&server), SHORT).await.unwrap();

    assert_eq!(head.status, 200);
    assert!(head.accepts_ranges);
    assert!(head.cors);
    assert_eq!(head.content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn test_head_without_range_or_cors_headers() {
    let (server, client) = setup().await;

    Mock::given(method("HEAD"))
        .and(path(object_path()))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let head = client.head(&object_url(&server), SHORT).await.unwrap();

    assert!(!head.accepts_ranges);
    assert!(!head.cors);
}

#[tokio::test]
async fn test_head_falls_back_to_ranged_get() {
    let (server, client) = setup().await;

    Mock::given(method("HEAD"))
        .and(path(object_path()))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(object_path()))
        .and(header("range", "bytes=0-0"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 0-0/42")
                .set_body_bytes(b"x".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let head = client.head(&object_url(&server), SHORT).await.unwrap();

    assert_eq!(head.status, 206);
    assert_eq!(head.content_length, Some(42));
    assert!(head.accepts_ranges);
}

#[tokio::test]
async fn test_head_http_error_preserves_status() {
    let (server, client) = setup().await;

    Mock::given(method("HEAD"))
        .and(path(object_path()))
        .respond_with(ResponseTemplate::new(504))
        .mount(&server)
        .await;

    let result = client.head(&object_url(&server), SHORT).await;

    assert!(
        matches!(result, Err(Error::Http { status: 504 })),
        "expected Http 504, got: {result:?}"
    );
    assert!(result.unwrap_err().is_transient());
}

#[tokio::test]
async fn test_head_timeout_is_classified() {
    let (server, client) = setup().await;

    Mock::given(method("HEAD"))
        .and(path(object_path()))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let result = client
        .head(&object_url(&server), Duration::from_millis(50))
        .await;

    match result {
        Err(e) => assert!(e.is_timeout(), "expected timeout, got: {e:?}"),
        Ok(head) => panic!("expected timeout, got: {head:?}"),
    }
}

#[tokio::test]
async fn test_head_connection_refused_is_transport_error() {
    let client = GatewayClient::new(&TransportConfig::default()).unwrap();

    // Port 9 (discard) is essentially never listening on loopback.
    let result = client
        .head(&format!("http://127.0.0.1:9/ipfs/{CID}"), SHORT)
        .await;

    assert!(
        matches!(result, Err(Error::Transport(_))),
        "expected Transport error, got: {result:?}"
    );
}

// ── Range reads ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_read_range_partial_content() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(object_path()))
        .and(header("range", "bytes=0-3"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "bytes 0-3/11")
                .set_body_bytes(b"hell".to_vec()),
        )
        .mount(&server)
        .await;

    let read = client
        .read_range(&object_url(&server), 0, 3, SHORT)
        .await
        .unwrap();

    assert!(read.partial);
    assert_eq!(read.status, 206);
    assert_eq!(&read.body[..], b"hell");
}

#[tokio::test]
async fn test_read_range_ignored_by_gateway() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(object_path()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
        .mount(&server)
        .await;

    let read = client
        .read_range(&object_url(&server), 0, 3, SHORT)
        .await
        .unwrap();

    assert!(!read.partial);
    assert_eq!(read.body.len(), 11);
}

// ── Full download ───────────────────────────────────────────────────

#[tokio::test]
async fn test_get_streams_whole_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(object_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/octet-stream")
                .set_body_bytes(b"hello world".to_vec()),
        )
        .mount(&server)
        .await;

    let mut stream = client.get(&object_url(&server), SHORT).await.unwrap();
    assert_eq!(stream.content_length, Some(11));

    let mut body = Vec::new();
    while let Some(chunk) = stream.next_chunk().await.unwrap() {
        body.extend_from_slice(&chunk);
    }
    assert_eq!(body, b"hello world");
}

#[tokio::test]
async fn test_get_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(object_path()))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = client.get(&object_url(&server), SHORT).await;
    assert_eq!(result.unwrap_err().status(), Some(404));
}

// ── Public gateway lists ────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_gateway_list() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/gateways.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            "https://ipfs.io/ipfs/:hash",
            "https://:hash.ipfs.dweb.link"
        ])))
        .mount(&server)
        .await;

    let list = client
        .fetch_gateway_list(&format!("{}/gateways.json", server.uri()), SHORT)
        .await
        .unwrap();

    assert_eq!(list.len(), 2);
    assert_eq!(list[0], "https://ipfs.io/ipfs/:hash");
}

#[tokio::test]
async fn test_fetch_gateway_list_rejects_bad_payload() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/gateways.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let result = client
        .fetch_gateway_list(&format!("{}/gateways.json", server.uri()), SHORT)
        .await;

    match result {
        Err(Error::Deserialization { body, .. }) => assert!(body.contains("nope")),
        other => panic!("expected Deserialization error, got: {other:?}"),
    }
}
