use crate::transport::ProxyRoute;
use http::header::PROXY_AUTHORIZATION;
use http::uri::Scheme;
use http::Request;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Adds `Proxy-Authorization` to plain-HTTP requests forwarded to a proxy.
///
/// The credentials come from the proxy the route picks for the request's
/// destination. HTTPS requests are tunneled; their credentials travel on the
/// CONNECT request instead and must not reach the origin.
#[derive(Clone)]
pub struct ProxyAuthorizationLayer {
    route: ProxyRoute,
}

impl ProxyAuthorizationLayer {
    #[must_use]
    pub fn new(route: ProxyRoute) -> Self {
        Self { route }
    }
}

impl<S> Layer<S> for ProxyAuthorizationLayer {
    type Service = ProxyAuthorizationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ProxyAuthorizationService {
            inner,
            route: self.route.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ProxyAuthorizationService<S> {
    inner: S,
    route: ProxyRoute,
}

impl<S, B> Service<Request<B>> for ProxyAuthorizationService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if req.uri().scheme() == Some(&Scheme::HTTP)
            && !req.headers().contains_key(PROXY_AUTHORIZATION)
            && let Some(credentials) = self
                .route
                .select(req.uri())
                .and_then(|proxy| proxy.authorization().cloned())
        {
            req.headers_mut().insert(PROXY_AUTHORIZATION, credentials);
        }
        self.inner.call(req)
    }
}
