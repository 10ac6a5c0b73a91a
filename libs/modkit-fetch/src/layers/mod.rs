//! Tower layers for the client middleware stack
//!
//! - [`UserAgentLayer`] - adds a User-Agent header when the request has none
//! - [`CookieLayer`] - attaches and records cookies through a [`CookieStore`](crate::CookieStore)
//! - [`ProxyAuthorizationLayer`] - adds proxy credentials to forwarded requests
//! - [`RedirectLimit`] - redirect policy with a hop limit and header hygiene

mod cookie;
mod proxy_auth;
mod redirect;
mod user_agent;

pub use cookie::{CookieFuture, CookieLayer, CookieService};
pub use proxy_auth::{ProxyAuthorizationLayer, ProxyAuthorizationService};
pub use redirect::{RedirectLimit, RedirectOutcome};
pub use user_agent::{UserAgentLayer, UserAgentService};
