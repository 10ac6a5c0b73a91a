//! Cookie store collaborator.
//!
//! The client only wires a store into its middleware stack: every hop asks
//! the store for cookies matching the request URI and hands back the
//! response's `Set-Cookie` values. Storage semantics belong to the store.

use http::{HeaderValue, Uri};
use parking_lot::RwLock;
use url::Url;

/// Persistent cookie storage consulted on every hop.
pub trait CookieStore: Send + Sync {
    /// Store the `Set-Cookie` values received from `uri`.
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, uri: &Uri);

    /// `Cookie` header value for a request to `uri`, if any cookies apply.
    fn cookies(&self, uri: &Uri) -> Option<HeaderValue>;
}

/// In-memory cookie jar backed by [`cookie_store::CookieStore`].
///
/// Follows the usual browser rules: `Domain` and `Path` scope a cookie,
/// `Max-Age`/`Expires` in the past delete it, `Secure` cookies are only sent
/// over https. Unparseable `Set-Cookie` values are dropped.
#[derive(Debug, Default)]
pub struct MemoryCookieStore {
    jar: RwLock<cookie_store::CookieStore>,
}

impl MemoryCookieStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of cookie `name` that a request to `url` would carry.
    #[must_use]
    pub fn get(&self, url: &str, name: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        self.jar
            .read()
            .get_request_values(&url)
            .find(|(n, _)| *n == name)
            .map(|(_, value)| value.to_owned())
    }

    /// Whether no unexpired cookie is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jar.read().iter_unexpired().next().is_none()
    }
}

fn to_url(uri: &Uri) -> Option<Url> {
    Url::parse(&uri.to_string()).ok()
}

impl CookieStore for MemoryCookieStore {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, uri: &Uri) {
        let Some(url) = to_url(uri) else {
            return;
        };
        let cookies: Vec<_> = cookie_headers
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| match ::cookie::Cookie::parse(value) {
                Ok(cookie) => Some(cookie.into_owned()),
                Err(err) => {
                    tracing::debug!(error = %err, "ignoring malformed Set-Cookie");
                    None
                }
            })
            .inspect(|cookie| {
                tracing::debug!(
                    host = url.host_str().unwrap_or_default(),
                    cookie = %cookie.name(),
                    "storing cookie"
                );
            })
            .collect();
        self.jar
            .write()
            .store_response_cookies(cookies.into_iter(), &url);
    }

    fn cookies(&self, uri: &Uri) -> Option<HeaderValue> {
        let url = to_url(uri)?;
        let joined = self
            .jar
            .read()
            .get_request_values(&url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        if joined.is_empty() {
            return None;
        }
        HeaderValue::from_str(&joined).ok()
    }
}
