use crate::client::HttpClient;
use crate::config::{ClientOptions, HttpClientConfig, TlsRootConfig};
use crate::cookie::CookieStore;
use crate::error::{BoxError, HttpError};
use crate::layers::{CookieLayer, ProxyAuthorizationLayer, RedirectLimit, UserAgentLayer};
use crate::request::WireRequest;
use crate::response::RawBody;
use crate::tls;
use crate::transport::{ProxyConnector, ProxyRoute, ProxySettings};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::follow_redirect::FollowRedirectLayer;

/// Type-erased service that performs one HTTP exchange.
///
/// The default transport is a pooled hyper client; a custom one can be
/// supplied with [`HttpClientBuilder::transport`] (test doubles, recorded
/// traffic, an in-process service). The client's own layers (User-Agent,
/// cookies, redirects) always wrap it.
pub type Transport = BoxCloneSyncService<WireRequest, http::Response<RawBody>, BoxError>;

/// Builder for [`HttpClient`].
///
/// Fluent setters edit a [`HttpClientConfig`] snapshot; [`build`](Self::build)
/// turns it into an immutable client.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    transport: Option<Transport>,
}

impl HttpClientBuilder {
    /// Builder with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            transport: None,
        }
    }

    /// Builder from caller options; unset options take the defaults.
    #[must_use]
    pub fn from_options(options: ClientOptions) -> Self {
        Self::with_config(options.resolve())
    }

    /// Overall timeout of one dispatch, from connect to the last body byte
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Dial timeout; leaves keep-alive and the overall timeout untouched
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Accept any server certificate
    ///
    /// **WARNING**: exposes traffic to interception. Intended for tests and
    /// self-signed development endpoints.
    #[must_use]
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.config.insecure_skip_verify = skip;
        self
    }

    /// Redirects to follow; `0` disables following (3xx responses pass through)
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    /// Connect directly: no configured proxy and no proxy environment variables
    #[must_use]
    pub fn no_proxy(mut self) -> Self {
        self.config.proxy = None;
        self.config.proxy_from_env = false;
        self
    }

    /// Without an explicit proxy, honor `HTTP_PROXY`/`HTTPS_PROXY`/`ALL_PROXY`
    /// and `NO_PROXY` (default: on). Loopback destinations are never proxied.
    #[must_use]
    pub fn proxy_from_env(mut self, enabled: bool) -> Self {
        self.config.proxy_from_env = enabled;
        self
    }

    /// Add a header to proxy CONNECT requests; duplicates are kept
    #[must_use]
    pub fn proxy_connect_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .proxy_connect_headers
            .push((name.into(), value.into()));
        self
    }

    /// Maximum idle connections per host; `0` disables connection reuse
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    #[must_use]
    pub fn cookie_store(mut self, store: Arc<dyn CookieStore>) -> Self {
        self.config.cookie_store = Some(store);
        self
    }

    /// Replace the hyper transport.
    ///
    /// Proxy and TLS settings only apply to the built-in transport; combining
    /// a proxy with a custom transport fails at [`build`](Self::build).
    #[must_use]
    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    ///
    /// Stack, outer to inner (the overall timeout is applied per dispatch):
    /// `FollowRedirect → UserAgent → Cookie? → ProxyAuthorization? → transport`
    ///
    /// # Errors
    /// - `HttpError::InvalidUri` for a malformed proxy URL
    /// - `HttpError::Configuration` for a proxy combined with a custom transport
    /// - `HttpError::Tls` if TLS initialization fails
    /// - `HttpError::InvalidHeaderValue` for an invalid user agent or proxy header
    pub fn build(self) -> Result<HttpClient, HttpError> {
        let proxy = self
            .config
            .proxy
            .as_deref()
            .map(|url| ProxySettings::parse(url, &self.config.proxy_connect_headers))
            .transpose()?;

        let (base, route) = match (&self.transport, proxy) {
            (Some(_), Some(_)) => {
                return Err(HttpError::configuration(
                    "proxy settings cannot be applied to a custom transport",
                ));
            }
            (Some(transport), None) => (transport.clone(), ProxyRoute::Direct),
            (None, proxy) => {
                let route = proxy_route(&self.config, proxy, ProxyRoute::from_env)?;
                (hyper_transport(&self.config, route.clone())?, route)
            }
        };

        let ua_layer = UserAgentLayer::try_new(&self.config.user_agent)?;
        let cookie_layer = self.config.cookie_store.clone().map(CookieLayer::new);
        let proxy_auth_layer = (!route.is_direct()).then(|| ProxyAuthorizationLayer::new(route));

        let service = ServiceBuilder::new()
            .layer(FollowRedirectLayer::with_policy(RedirectLimit::new(
                self.config.max_redirects,
            )))
            .layer(ua_layer)
            .option_layer(cookie_layer)
            .option_layer(proxy_auth_layer)
            .service(base);

        Ok(HttpClient::from_parts(
            self.config,
            BoxCloneSyncService::new(service),
            self.transport,
        ))
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Explicit proxy first, then the environment when allowed.
fn proxy_route(
    config: &HttpClientConfig,
    proxy: Option<ProxySettings>,
    from_env: impl FnOnce(HeaderMap) -> ProxyRoute,
) -> Result<ProxyRoute, HttpError> {
    if let Some(proxy) = proxy {
        return Ok(ProxyRoute::Fixed(proxy));
    }
    if !config.proxy_from_env {
        return Ok(ProxyRoute::Direct);
    }
    let mut headers = HeaderMap::new();
    for (name, value) in &config.proxy_connect_headers {
        headers.append(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }
    Ok(from_env(headers))
}

/// Pooled hyper client over the proxy-aware, TLS-capable connector.
fn hyper_transport(config: &HttpClientConfig, route: ProxyRoute) -> Result<Transport, HttpError> {
    let mut http = HttpConnector::new();
    // the TLS wrapper decides per scheme
    http.enforce_http(false);
    http.set_connect_timeout(Some(config.connect_timeout));
    http.set_keepalive(Some(config.keep_alive));

    let https = https_connector(config, ProxyConnector::new(http, route))?;

    let mut client_builder = Client::builder(TokioExecutor::new());
    // pool_timer is required for pool_idle_timeout to take effect
    client_builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .http2_only(false);
    if let Some(idle_timeout) = config.pool_idle_timeout {
        client_builder.pool_idle_timeout(idle_timeout);
    }
    let client = client_builder.build::<_, Full<Bytes>>(https);

    let service = client
        .map_response(|response| {
            response.map(|body| body.map_err(|e| -> BoxError { Box::new(e) }).boxed())
        })
        .map_err(|e| -> BoxError { Box::new(e) });
    Ok(BoxCloneSyncService::new(service))
}

/// Wrap the TCP connector with rustls.
///
/// ALPN advertises both h2 and http/1.1; plain `http://` stays unencrypted.
fn https_connector(
    config: &HttpClientConfig,
    connector: ProxyConnector,
) -> Result<HttpsConnector<ProxyConnector>, HttpError> {
    let builder = if config.insecure_skip_verify {
        tracing::warn!(
            target: "modkit_fetch::security",
            "TLS certificate verification disabled (insecure_skip_verify); \
             any server certificate will be accepted"
        );
        HttpsConnectorBuilder::new().with_tls_config(tls::insecure_client_config()?)
    } else {
        match config.tls_roots {
            TlsRootConfig::WebPki => HttpsConnectorBuilder::new()
                .with_provider_and_webpki_roots(tls::crypto_provider())
                .map_err(|e| HttpError::Tls(Box::new(e)))?,
            TlsRootConfig::Native => {
                HttpsConnectorBuilder::new().with_tls_config(tls::native_roots_client_config()?)
            }
        }
    };
    Ok(builder
        .https_or_http()
        .enable_all_versions()
        .wrap_connector(connector))
}
