#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use modkit_fetch::{Compression, HttpClient, HttpError, Request, RequestBody};
use serde_json::json;
use support::TestServer;

fn client() -> HttpClient {
    HttpClient::builder().build().unwrap()
}

async fn echo(server: &TestServer, path: &str, compression: Compression) -> modkit_fetch::HttpResponse {
    let request = Request {
        method: "POST".to_owned(),
        uri: server.url(path),
        body: RequestBody::json(json!({"foo": "bar"})),
        compression: Some(compression),
        ..Request::default()
    };
    client().dispatch(request).await.unwrap()
}

#[tokio::test]
async fn test_gzip_round_trip() {
    let server = TestServer::start().await;
    let response = echo(&server, "/compressed", Compression::gzip()).await;

    let sent = server.last_request();
    assert_eq!(sent.headers["content-encoding"], "gzip");
    assert_eq!(sent.headers["accept-encoding"], "gzip");
    assert_ne!(&sent.body[..], br#"{"foo":"bar"}"#);

    assert!(response.body().is_decompressing());
    let value: serde_json::Value = response.json().await.unwrap();
    assert_eq!(value, json!({"foo": "bar"}));
}

#[tokio::test]
async fn test_deflate_round_trip() {
    let server = TestServer::start().await;
    let response = echo(&server, "/compressed", Compression::deflate()).await;
    assert_eq!(server.last_request().headers["content-encoding"], "deflate");
    assert_eq!(response.text().await.unwrap(), r#"{"foo":"bar"}"#);
}

#[tokio::test]
async fn test_zlib_round_trip() {
    let server = TestServer::start().await;
    let response = echo(&server, "/compressed", Compression::zlib()).await;
    assert_eq!(response.text().await.unwrap(), r#"{"foo":"bar"}"#);
}

#[tokio::test]
async fn test_response_without_encoding_header_is_raw() {
    let server = TestServer::start().await;
    let response = echo(&server, "/compressed_no_header", Compression::gzip()).await;
    assert!(!response.body().is_decompressing());

    // still the compressed bytes the client sent
    let raw = response.bytes().await.unwrap();
    assert_eq!(raw, server.last_request().body);
}

#[tokio::test]
async fn test_raw_chunk_reads_compressed_bytes() {
    let server = TestServer::start().await;
    let mut response = echo(&server, "/compressed", Compression::gzip()).await;
    let sent = server.last_request().body;

    let mut raw = Vec::new();
    while let Some(chunk) = response.body_mut().raw_chunk().await.unwrap() {
        raw.extend_from_slice(&chunk);
    }
    assert_eq!(raw, sent.to_vec());
}

#[tokio::test]
async fn test_read_after_close() {
    let server = TestServer::start().await;
    let mut response = echo(&server, "/compressed", Compression::gzip()).await;
    let body = response.body_mut();
    body.close();
    assert!(body.is_closed());
    assert!(matches!(body.raw_chunk().await, Err(HttpError::BodyClosed)));
}

#[test]
fn test_token_lookup() {
    assert_eq!(Compression::from_token("GZIP").unwrap().content_encoding(), "gzip");
    assert!(Compression::from_token("br").is_none());
}
