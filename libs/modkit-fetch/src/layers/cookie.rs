use crate::cookie::CookieStore;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Request, Response, Uri};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tower::{Layer, Service};

/// Sends stored cookies with each request and records `Set-Cookie` replies.
///
/// Sits below the redirect follower, so it runs once per hop.
#[derive(Clone)]
pub struct CookieLayer {
    store: Arc<dyn CookieStore>,
}

impl CookieLayer {
    #[must_use]
    pub fn new(store: Arc<dyn CookieStore>) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for CookieLayer {
    type Service = CookieService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CookieService {
            inner,
            store: Arc::clone(&self.store),
        }
    }
}

#[derive(Clone)]
pub struct CookieService<S> {
    inner: S,
    store: Arc<dyn CookieStore>,
}

/// Stored cookies go after any the caller set explicitly.
fn attach_cookies(headers: &mut HeaderMap, stored: &HeaderValue) {
    let combined = match headers.get(COOKIE) {
        Some(existing) if !existing.is_empty() => {
            let mut bytes = existing.as_bytes().to_vec();
            bytes.extend_from_slice(b"; ");
            bytes.extend_from_slice(stored.as_bytes());
            HeaderValue::from_bytes(&bytes).unwrap_or_else(|_| existing.clone())
        }
        _ => stored.clone(),
    };
    headers.insert(COOKIE, combined);
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CookieService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = CookieFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        if let Some(stored) = self.store.cookies(req.uri()) {
            attach_cookies(req.headers_mut(), &stored);
        }
        let uri = req.uri().clone();
        CookieFuture {
            inner: self.inner.call(req),
            store: Arc::clone(&self.store),
            uri,
        }
    }
}

pin_project! {
    /// Response future of [`CookieService`].
    pub struct CookieFuture<F> {
        #[pin]
        inner: F,
        store: Arc<dyn CookieStore>,
        uri: Uri,
    }
}

impl<F, B, E> Future for CookieFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));
        if let Ok(response) = &result
            && response.headers().contains_key(SET_COOKIE)
        {
            this.store
                .set_cookies(&mut response.headers().get_all(SET_COOKIE).iter(), this.uri);
        }
        Poll::Ready(result)
    }
}
