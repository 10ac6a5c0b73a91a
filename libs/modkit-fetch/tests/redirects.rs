#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use http::StatusCode;
use modkit_fetch::{HttpClient, HttpError, Request};
use support::TestServer;

fn client(max_redirects: usize) -> HttpClient {
    HttpClient::builder()
        .max_redirects(max_redirects)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_redirects_disabled_returns_3xx() {
    let server = TestServer::start().await;
    let response = client(0)
        .get(server.url("/redirect_test/301"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()["location"], "/redirect_test/302");
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_full_chain_is_followed() {
    let server = TestServer::start().await;
    let response = client(4)
        .get(server.url("/redirect_test/301"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.uri().path(), "/getquery");
    assert_eq!(response.text().await.unwrap(), "chain=done");
    assert_eq!(server.requests().len(), 5);
}

#[tokio::test]
async fn test_limit_reached_returns_error_and_last_response() {
    let server = TestServer::start().await;
    let err = client(2)
        .get(server.url("/redirect_test/301"))
        .await
        .unwrap_err();

    assert!(matches!(err.error(), HttpError::RedirectLimit { max: 2 }));
    assert!(err.to_string().contains("redirecting limit reached"));
    assert!(!err.is_timeout());

    let response = err.response().unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.uri().path(), "/redirect_test/303");
    assert_eq!(server.requests().len(), 3);
}

#[tokio::test]
async fn test_single_hop_limit_stops_at_found() {
    let server = TestServer::start().await;
    let err = client(1)
        .get(server.url("/redirect_test/301"))
        .await
        .unwrap_err();

    assert!(matches!(err.error(), HttpError::RedirectLimit { max: 1 }));
    let (_, response) = err.into_parts();
    let response = response.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.uri().path(), "/redirect_test/302");
}

#[tokio::test]
async fn test_see_other_switches_post_to_get() {
    let server = TestServer::start().await;
    let response = client(1)
        .dispatch(Request::post(server.url("/redirect_test/303"), "payload"))
        .await;
    // 303 → /redirect_test/307 is the one allowed hop, the 307 then hits the limit
    let err = response.unwrap_err();
    assert!(matches!(err.error(), HttpError::RedirectLimit { max: 1 }));

    let requests = server.requests();
    assert_eq!(requests[0].method, http::Method::POST);
    assert_eq!(requests[1].method, http::Method::GET);
    assert!(requests[1].body.is_empty());
}

#[tokio::test]
async fn test_cross_origin_redirect_drops_credentials() {
    let origin = TestServer::start().await;
    let other = TestServer::start().await;
    let destination = urlencoding::encode(&other.url("/foo")).into_owned();

    let response = client(1)
        .dispatch(
            Request::get(origin.url(&format!("/redirect_test/to?destination={destination}")))
                .basic_auth("foo", "bar"),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(origin.last_request().headers.contains_key("authorization"));
    assert!(!other.last_request().headers.contains_key("authorization"));
}
