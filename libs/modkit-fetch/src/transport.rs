//! Proxy-aware TCP connector.
//!
//! The proxy for a destination comes from a [`ProxyRoute`]: none, the
//! configured proxy URL, or the `HTTP_PROXY`/`HTTPS_PROXY`/`ALL_PROXY` and
//! `NO_PROXY` environment. Destinations without a proxy are dialed directly.
//! Otherwise:
//! - `http://` destinations are dialed to the proxy and the connection is
//!   marked as proxied, so requests go out in absolute-form
//! - `https://` destinations are tunneled with CONNECT; the TLS layer above
//!   then handshakes with the origin through the tunnel

use crate::error::{BoxError, HttpError, InvalidUriKind};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::uri::Scheme;
use http::{HeaderMap, HeaderName, HeaderValue, Uri};
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::proxy::Tunnel;
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::client::proxy::matcher::{Intercept, Matcher};
use hyper_util::rt::TokioIo;
use pin_project_lite::pin_project;
use std::borrow::Cow;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpStream;
use tower::{Service, ServiceExt};

/// Parsed proxy URL plus the extras sent to the proxy.
#[derive(Clone)]
pub struct ProxySettings {
    uri: Uri,
    authorization: Option<HeaderValue>,
    connect_headers: HeaderMap,
}

impl ProxySettings {
    /// Parse an `http://[user[:password]@]host[:port]` proxy URL.
    ///
    /// Percent-encoded credentials are decoded before being turned into a
    /// `Basic` authorization value.
    ///
    /// # Errors
    /// - `HttpError::InvalidUri` if the URL is malformed, has no host, or is not `http`
    /// - `HttpError::InvalidHeaderName` / `InvalidHeaderValue` for bad connect headers
    pub fn parse(url: &str, connect_headers: &[(String, String)]) -> Result<Self, HttpError> {
        let invalid = |kind, reason: String| HttpError::InvalidUri {
            url: redact_proxy(url),
            kind,
            reason,
        };

        let parsed = url::Url::parse(url)
            .map_err(|e| invalid(InvalidUriKind::ParseError, e.to_string()))?;
        if parsed.scheme() != "http" {
            return Err(invalid(
                InvalidUriKind::UnsupportedScheme,
                format!("unsupported proxy scheme '{}'", parsed.scheme()),
            ));
        }
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid(InvalidUriKind::MissingAuthority, "proxy URL has no host".to_owned()))?;
        let port = parsed.port_or_known_default().unwrap_or(80);
        let uri: Uri = format!("http://{host}:{port}")
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(InvalidUriKind::ParseError, e.to_string()))?;

        let authorization = if parsed.username().is_empty() && parsed.password().is_none() {
            None
        } else {
            let decode = |raw: &str| -> Result<String, HttpError> {
                urlencoding::decode(raw)
                    .map(Cow::into_owned)
                    .map_err(|e| invalid(InvalidUriKind::ParseError, e.to_string()))
            };
            let username = decode(parsed.username())?;
            let password = parsed.password().map(decode).transpose()?.unwrap_or_default();
            let encoded = STANDARD.encode(format!("{username}:{password}"));
            let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))?;
            value.set_sensitive(true);
            Some(value)
        };

        let mut headers = HeaderMap::new();
        for (name, value) in connect_headers {
            headers.append(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }

        Ok(Self {
            uri,
            authorization,
            connect_headers: headers,
        })
    }

    /// `http://host:port` of the proxy, without credentials.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// `Proxy-Authorization` value built from the URL credentials.
    #[must_use]
    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.authorization.as_ref()
    }

    #[must_use]
    pub fn connect_headers(&self) -> &HeaderMap {
        &self.connect_headers
    }

    /// Settings for a proxy picked from the environment.
    fn from_intercept(intercept: &Intercept, connect_headers: &HeaderMap) -> Option<Self> {
        let uri = intercept.uri();
        if uri.scheme() != Some(&Scheme::HTTP) {
            tracing::debug!(proxy = %uri, "ignoring non-http proxy from the environment");
            return None;
        }
        let authorization = intercept.basic_auth().cloned().map(|mut value| {
            value.set_sensitive(true);
            value
        });
        Some(Self {
            uri: uri.clone(),
            authorization,
            connect_headers: connect_headers.clone(),
        })
    }
}

/// How the connector picks a proxy for each destination.
#[derive(Clone, Default)]
pub enum ProxyRoute {
    /// Always dial the destination
    #[default]
    Direct,
    /// Every destination goes through this proxy
    Fixed(ProxySettings),
    /// Proxy chosen per destination from environment-style rules;
    /// loopback destinations are never proxied
    Environment {
        matcher: Arc<Matcher>,
        connect_headers: HeaderMap,
    },
}

impl ProxyRoute {
    /// Rules from `HTTP_PROXY`, `HTTPS_PROXY`, `ALL_PROXY` and `NO_PROXY`
    /// (either case), read now.
    #[must_use]
    pub fn from_env(connect_headers: HeaderMap) -> Self {
        Self::from_matcher(Matcher::from_env(), connect_headers)
    }

    #[must_use]
    pub fn from_matcher(matcher: Matcher, connect_headers: HeaderMap) -> Self {
        Self::Environment {
            matcher: Arc::new(matcher),
            connect_headers,
        }
    }

    #[must_use]
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct)
    }

    /// Proxy to use for `dst`, `None` to connect directly.
    #[must_use]
    pub fn select(&self, dst: &Uri) -> Option<ProxySettings> {
        match self {
            Self::Direct => None,
            Self::Fixed(proxy) => Some(proxy.clone()),
            Self::Environment {
                matcher,
                connect_headers,
            } => {
                if is_loopback(dst) {
                    return None;
                }
                let intercept = matcher.intercept(dst)?;
                ProxySettings::from_intercept(&intercept, connect_headers)
            }
        }
    }
}

fn is_loopback(dst: &Uri) -> bool {
    let Some(host) = dst.host() else {
        return false;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Proxy URL with any userinfo masked, for logs and errors.
pub fn redact_proxy(proxy: &str) -> String {
    match url::Url::parse(proxy) {
        Ok(parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            let host = parsed.host_str().unwrap_or_default();
            match parsed.port() {
                Some(port) => format!("{}://***@{host}:{port}", parsed.scheme()),
                None => format!("{}://***@{host}", parsed.scheme()),
            }
        }
        _ => proxy.to_owned(),
    }
}

/// TCP connector that routes through a proxy when the [`ProxyRoute`] says so.
#[derive(Clone)]
pub struct ProxyConnector {
    http: HttpConnector,
    route: ProxyRoute,
}

impl ProxyConnector {
    #[must_use]
    pub fn new(http: HttpConnector, route: ProxyRoute) -> Self {
        Self { http, route }
    }
}

type ConnectFuture = Pin<Box<dyn Future<Output = Result<ProxyStream, BoxError>> + Send>>;

impl Service<Uri> for ProxyConnector {
    type Response = ProxyStream;
    type Error = BoxError;
    type Future = ConnectFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let http = self.http.clone();
        let Some(proxy) = self.route.select(&dst) else {
            return Box::pin(async move {
                let io = http.oneshot(dst).await?;
                Ok(ProxyStream::new(io, false))
            });
        };

        if dst.scheme() == Some(&Scheme::HTTPS) {
            let mut tunnel = Tunnel::new(proxy.uri.clone(), http)
                .with_headers(proxy.connect_headers.clone());
            if let Some(auth) = proxy.authorization.clone() {
                tunnel = tunnel.with_auth(auth);
            }
            Box::pin(async move {
                tracing::debug!(proxy = %proxy.uri, target = %dst, "opening CONNECT tunnel");
                let io = tunnel.oneshot(dst).await?;
                Ok(ProxyStream::new(io, false))
            })
        } else {
            Box::pin(async move {
                tracing::debug!(proxy = %proxy.uri, target = %dst, "forwarding through proxy");
                let io = http.oneshot(proxy.uri).await?;
                Ok(ProxyStream::new(io, true))
            })
        }
    }
}

pin_project! {
    /// TCP stream that knows whether requests on it go to a forwarding proxy.
    pub struct ProxyStream {
        #[pin]
        inner: TokioIo<TcpStream>,
        forwarded: bool,
    }
}

impl ProxyStream {
    fn new(inner: TokioIo<TcpStream>, forwarded: bool) -> Self {
        Self { inner, forwarded }
    }
}

impl Connection for ProxyStream {
    fn connected(&self) -> Connected {
        self.inner.connected().proxy(self.forwarded)
    }
}

impl Read for ProxyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl Write for ProxyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write_vectored(cx, bufs)
    }
}
