#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end dispatch against real sockets.

mod support;

use httpmock::prelude::*;
use modkit_fetch::{
    Cookie, HttpClient, HttpError, InvalidUriKind, QueryEncode, QuerySource, QueryValues, Request,
    RequestBody,
};
use serde_json::json;
use support::TestServer;

#[derive(QueryEncode)]
struct Search {
    #[query(rename = "q")]
    pub term: String,
    #[query(omitempty)]
    pub cursor: String,
    pub limit: u32,
}

#[derive(serde::Serialize)]
struct Filter {
    name: &'static str,
    active: bool,
}

fn client() -> HttpClient {
    HttpClient::builder().build().unwrap()
}

#[tokio::test]
async fn test_get_with_default_method() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/foo");
        then.status(200).body("foo");
    });

    let request = Request {
        uri: server.url("/foo"),
        ..Request::default()
    };
    let response = client().dispatch(request).await.unwrap();

    mock.assert();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "foo");
}

#[tokio::test]
async fn test_post_json_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/items")
            .header("content-type", "application/json")
            .json_body(json!({"foo": "bar"}));
        then.status(201).json_body(json!({"id": 7}));
    });

    let request = Request {
        method: "POST".to_owned(),
        uri: server.url("/items"),
        content_type: "application/json".to_owned(),
        body: RequestBody::json(json!({"foo": "bar"})),
        ..Request::default()
    };
    let response = client().dispatch(request).await.unwrap();

    mock.assert();
    assert_eq!(response.status(), 201);
    let created: serde_json::Value = response.json().await.unwrap();
    assert_eq!(created["id"], 7);
}

#[tokio::test]
async fn test_query_from_values() {
    let server = TestServer::start().await;
    let mut values = QueryValues::new();
    values.add("foo", "bar");
    values.add("foo", "baz");

    let response = client()
        .dispatch(Request::get(server.url("/getquery")).query(values))
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "foo=bar&foo=baz");
}

#[tokio::test]
async fn test_query_from_derived_record() {
    let server = TestServer::start().await;
    let search = Search {
        term: "rust lang".to_owned(),
        cursor: String::new(),
        limit: 10,
    };

    let response = client()
        .dispatch(Request::get(server.url("/getquery?x=1")).query(QuerySource::record(search)))
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "x=1&limit=10&q=rust+lang");
}

#[tokio::test]
async fn test_query_from_serialized_record() {
    let server = TestServer::start().await;
    let filter = Filter {
        name: "a&b",
        active: true,
    };

    let response = client()
        .dispatch(
            Request::get(server.url("/getquery"))
                .query(QuerySource::serialized(&filter).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "active=true&name=a%26b");
}

#[tokio::test]
async fn test_basic_auth() {
    let server = TestServer::start().await;

    let ok = client()
        .dispatch(Request::get(server.url("/basic_auth")).basic_auth("foo", "bar"))
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);

    let denied = client()
        .dispatch(Request::get(server.url("/basic_auth")).basic_auth("foo", "wrong"))
        .await
        .unwrap();
    assert_eq!(denied.status(), 401);
}

#[tokio::test]
async fn test_request_cookies_and_headers() {
    let server = TestServer::start().await;
    let request = Request {
        accept: "text/plain".to_owned(),
        host: "virtual.test".to_owned(),
        ..Request::get(server.url("/readcookie"))
    }
    .header("X-Trace", "1")
    .header("X-Trace", "2")
    .cookie(Cookie::new("bar", "foo"))
    .cookie(Cookie::new("bartender", "foobar"));

    let response = client().dispatch(request).await.unwrap();
    assert_eq!(response.text().await.unwrap(), "bar=foo; bartender=foobar");

    let seen = server.last_request();
    assert_eq!(seen.headers["host"], "virtual.test");
    assert_eq!(seen.headers["accept"], "text/plain");
    assert_eq!(seen.headers.get_all("x-trace").iter().count(), 2);
}

#[tokio::test]
async fn test_default_user_agent_and_override() {
    let server = TestServer::start().await;

    client().get(server.url("/foo")).await.unwrap();
    let ua = server.last_request().headers["user-agent"].clone();
    assert!(ua.to_str().unwrap().starts_with("modkit-fetch/"));

    let request = Request {
        user_agent: "per-request/2.0".to_owned(),
        ..Request::get(server.url("/foo"))
    };
    client().dispatch(request).await.unwrap();
    assert_eq!(server.last_request().headers["user-agent"], "per-request/2.0");
}

#[tokio::test]
async fn test_hook_mutation_reaches_server_and_response() {
    let server = TestServer::start().await;
    let request = Request::get(server.url("/foo")).on_before_request(|wire| {
        wire.headers_mut()
            .insert("x-signed", http::HeaderValue::from_static("sig"));
    });

    let response = client().dispatch(request).await.unwrap();
    assert_eq!(server.last_request().headers["x-signed"], "sig");
    assert_eq!(response.request().headers()["x-signed"], "sig");
}

#[tokio::test]
async fn test_invalid_uri_sends_nothing() {
    let server = TestServer::start().await;
    let err = client().get("%").await.unwrap_err();
    assert!(matches!(
        err.error(),
        HttpError::InvalidUri {
            kind: InvalidUriKind::ParseError,
            ..
        }
    ));
    assert!(err.response().is_none());
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // bind then drop to get a port nobody listens on
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let err = client()
        .get(format!("http://{addr}/"))
        .await
        .unwrap_err();
    assert!(matches!(err.error(), HttpError::Transport { .. }));
    assert!(!err.is_timeout());
}

#[tokio::test]
async fn test_body_close_and_raw_read() {
    let server = TestServer::start().await;
    let mut response = client().get(server.url("/json")).await.unwrap();
    let body = response.body_mut();
    assert!(!body.is_decompressing());
    let first = body.raw_chunk().await.unwrap().unwrap();
    assert_eq!(&first[..], br#"{"foo":"bar"}"#);
    body.close();
    body.close();
    assert!(matches!(body.raw_chunk().await, Err(HttpError::BodyClosed)));
}
