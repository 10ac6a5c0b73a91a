//! Redirect policy with a hop limit.
//!
//! - `max == 0`: redirects are never followed; the 3xx response is returned
//!   as-is and is not an error
//! - otherwise a redirect is followed while the number of completed hops is
//!   below `max`; the next one stops the chain and marks the
//!   [`RedirectOutcome`] carried by the first request, so the dispatcher can
//!   report a policy error alongside the last response
//! - on a redirect to another origin, `Authorization`, `Cookie` and
//!   `Proxy-Authorization` set by the caller are dropped

use http::{Request, Uri, header};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tower_http::follow_redirect::policy::{Action, Attempt, Policy};

const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// Per-dispatch record of a chain stopped on the hop limit.
///
/// The dispatcher puts one into the extensions of the request it sends;
/// the policy clone serving that request picks it up on the first hop.
#[derive(Debug, Clone, Default)]
pub struct RedirectOutcome(Arc<AtomicBool>);

impl RedirectOutcome {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the chain stopped because the limit was reached.
    #[must_use]
    pub fn limit_reached(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct RedirectLimit {
    max: usize,
    /// Hops already followed in this chain
    followed: usize,
    cross_origin: bool,
    outcome: Option<RedirectOutcome>,
}

impl RedirectLimit {
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max,
            followed: 0,
            cross_origin: false,
            outcome: None,
        }
    }

    fn is_same_origin(previous: &Uri, target: &Uri) -> bool {
        previous.scheme() == target.scheme()
            && previous.host() == target.host()
            && port_or_default(previous) == port_or_default(target)
    }
}

fn port_or_default(uri: &Uri) -> Option<u16> {
    uri.port_u16().or_else(|| match uri.scheme_str() {
        Some("http") => Some(80),
        Some("https") => Some(443),
        _ => None,
    })
}

impl<B: Clone, E> Policy<B, E> for RedirectLimit {
    fn redirect(&mut self, attempt: &Attempt<'_>) -> Result<Action, E> {
        if self.max == 0 {
            return Ok(Action::Stop);
        }
        if self.followed >= self.max {
            tracing::debug!(
                max = self.max,
                location = %attempt.location(),
                "redirecting limit reached"
            );
            if let Some(outcome) = &self.outcome {
                outcome.mark();
            }
            return Ok(Action::Stop);
        }

        self.followed += 1;
        if !Self::is_same_origin(attempt.previous(), attempt.location()) {
            self.cross_origin = true;
        }
        tracing::debug!(
            hop = self.followed,
            status = attempt.status().as_u16(),
            location = %attempt.location(),
            "following redirect"
        );
        Ok(Action::Follow)
    }

    fn on_request(&mut self, request: &mut Request<B>) {
        if self.outcome.is_none() {
            self.outcome = request.extensions().get::<RedirectOutcome>().cloned();
        }
        if self.cross_origin {
            let headers = request.headers_mut();
            for name in SENSITIVE_HEADERS {
                if headers.remove(name).is_some() {
                    tracing::debug!(header = %name, "dropped header on cross-origin redirect");
                }
            }
        }
    }

    fn clone_body(&self, body: &B) -> Option<B> {
        // 307/308 replay the body
        Some(body.clone())
    }
}
