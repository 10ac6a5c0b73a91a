//! In-process HTTP/1.1 server for integration tests.
//!
//! Routes:
//! - `/foo` - `200 foo`
//! - `/getquery` - echoes the raw query string
//! - `/json` - `{"foo":"bar"}`
//! - `/redirect_test/301` → `/302` → `/303` → `/307` → `/getquery?chain=done`
//! - `/redirect_test/to` - 302 to the `destination` query parameter
//! - `/compressed` - echoes the body with the request's `Content-Encoding`
//! - `/compressed_no_header` - echoes the body without `Content-Encoding`
//! - `/basic_auth` - 200 for `foo:bar`, 401 otherwise
//! - `/setcookie` - sets `session=abc`
//! - `/readcookie` - echoes the `Cookie` header
//! - `/hang` - never answers within a test's lifetime
//!
//! Requests in absolute-form (forward proxy traffic) are answered with
//! `200 proxied <uri>`.
#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_ENCODING, COOKIE, LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A request as the server received it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct TestServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
    shutdown: CancellationToken,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("test server address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let log = requests.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    () = token.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(_) => continue,
                    },
                };
                let log = log.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(req, log.clone()));
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        tracing::debug!(error = %err, "test connection closed");
                    }
                });
            }
        });

        Self {
            addr,
            requests,
            shutdown,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Recorded {
        self.requests
            .lock()
            .last()
            .cloned()
            .expect("server received no request")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(
    req: Request<Incoming>,
    log: Arc<Mutex<Vec<Recorded>>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .unwrap_or_default();
    let recorded = Recorded {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
    };
    log.lock().push(recorded.clone());
    Ok(route(&recorded).await)
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .unwrap()
}

fn redirect(status: StatusCode, location: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(LOCATION, location)
        .body(Full::default())
        .unwrap()
}

async fn route(req: &Recorded) -> Response<Full<Bytes>> {
    if req.uri.scheme().is_some() {
        return text(StatusCode::OK, format!("proxied {}", req.uri));
    }

    match req.uri.path() {
        "/foo" => text(StatusCode::OK, "foo"),
        "/getquery" => text(StatusCode::OK, req.uri.query().unwrap_or_default().to_owned()),
        "/json" => Response::builder()
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from_static(br#"{"foo":"bar"}"#)))
            .unwrap(),
        "/redirect_test/301" => redirect(StatusCode::MOVED_PERMANENTLY, "/redirect_test/302"),
        "/redirect_test/302" => redirect(StatusCode::FOUND, "/redirect_test/303"),
        "/redirect_test/303" => redirect(StatusCode::SEE_OTHER, "/redirect_test/307"),
        "/redirect_test/307" => redirect(StatusCode::TEMPORARY_REDIRECT, "/getquery?chain=done"),
        "/redirect_test/to" => {
            let destination = req
                .uri
                .query()
                .and_then(|q| q.strip_prefix("destination="))
                .map(|d| urlencoding::decode(d).unwrap().into_owned())
                .unwrap_or_default();
            redirect(StatusCode::FOUND, &destination)
        }
        "/compressed" => {
            let mut response = text(StatusCode::OK, req.body.clone());
            if let Some(encoding) = req.headers.get(CONTENT_ENCODING) {
                response
                    .headers_mut()
                    .insert(CONTENT_ENCODING, encoding.clone());
            }
            response
        }
        "/compressed_no_header" => text(StatusCode::OK, req.body.clone()),
        "/basic_auth" => {
            // foo:bar
            let ok = req
                .headers
                .get(AUTHORIZATION)
                .is_some_and(|v| v == "Basic Zm9vOmJhcg==");
            if ok {
                text(StatusCode::OK, "authorized")
            } else {
                text(StatusCode::UNAUTHORIZED, "")
            }
        }
        "/setcookie" => Response::builder()
            .header(SET_COOKIE, "session=abc; Path=/; HttpOnly")
            .body(Full::new(Bytes::from_static(b"cookie set")))
            .unwrap(),
        "/readcookie" => {
            let cookie = req
                .headers
                .get(COOKIE)
                .map(|v| v.to_str().unwrap().to_owned())
                .unwrap_or_default();
            text(StatusCode::OK, cookie)
        }
        "/hang" => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            text(StatusCode::OK, "too late")
        }
        _ => text(StatusCode::NOT_FOUND, ""),
    }
}

/// Accept one connection, record the CONNECT request head and refuse it.
///
/// Returns the listener address and a handle yielding the raw head.
pub async fn connect_recorder() -> (SocketAddr, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind connect recorder");
    let addr = listener.local_addr().expect("connect recorder address");
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept CONNECT");
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.expect("read CONNECT");
            if n == 0 {
                break;
            }
            head.extend_from_slice(&buf[..n]);
        }
        stream
            .write_all(b"HTTP/1.1 403 Forbidden\r\ncontent-length: 0\r\n\r\n")
            .await
            .expect("write CONNECT reply");
        String::from_utf8_lossy(&head).into_owned()
    });
    (addr, handle)
}
