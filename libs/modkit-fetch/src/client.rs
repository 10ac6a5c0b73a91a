use crate::builder::{HttpClientBuilder, Transport};
use crate::compression::{Compression, Decompress};
use crate::config::{ClientOptions, HttpClientConfig};
use crate::error::{DispatchError, HttpError};
use crate::layers::RedirectOutcome;
use crate::request::{Request, WireRequest};
use crate::response::{HttpResponse, RawBody, ResponseBody};
use bytes::Bytes;
use http::header::CONTENT_ENCODING;
use http::{HeaderMap, Version};
use http_body_util::{BodyExt, Full};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::follow_redirect::RequestUri;

/// Per-dispatch cancellation and deadline.
///
/// The effective deadline of a dispatch is the earlier of this deadline and
/// the client's overall timeout. A cancelled token aborts the dispatch with
/// a non-timeout transport error.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub cancellation: Option<CancellationToken>,
    pub deadline: Option<Instant>,
}

impl DispatchContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }
}

/// HTTP client for declarative [`Request`]s.
///
/// Cheap to clone; clones share the connection pool. Configuration is fixed
/// at construction, use [`reconfigure`](Self::reconfigure) to derive a client
/// with different settings. Safe to use from many tasks at once.
///
/// ```ignore
/// let client = HttpClient::builder()
///     .timeout(Duration::from_secs(10))
///     .max_redirects(3)
///     .build()?;
///
/// let response = client
///     .dispatch(Request::get("https://api.example.com/items").query(filter))
///     .await?;
/// let items: Vec<Item> = response.json().await?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    config: Arc<HttpClientConfig>,
    service: Transport,
    custom_transport: Option<Transport>,
}

impl HttpClient {
    pub(crate) fn from_parts(
        config: HttpClientConfig,
        service: Transport,
        custom_transport: Option<Transport>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            service,
            custom_transport,
        }
    }

    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Client from caller options merged over the defaults.
    ///
    /// # Errors
    /// See [`HttpClientBuilder::build`].
    pub fn from_options(options: ClientOptions) -> Result<Self, HttpError> {
        HttpClientBuilder::from_options(options).build()
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Builder seeded with this client's configuration and transport.
    ///
    /// The new client gets its own connection pool unless a custom
    /// transport was supplied.
    #[must_use]
    pub fn reconfigure(&self) -> HttpClientBuilder {
        let builder = HttpClientBuilder::with_config((*self.config).clone());
        match &self.custom_transport {
            Some(transport) => builder.transport(transport.clone()),
            None => builder,
        }
    }

    /// `GET uri` with no further options.
    ///
    /// # Errors
    /// See [`dispatch`](Self::dispatch).
    pub async fn get(&self, uri: impl Into<String>) -> Result<HttpResponse, DispatchError> {
        self.dispatch(Request::get(uri)).await
    }

    /// Build and send `request`.
    ///
    /// # Errors
    /// - `HttpError::Configuration` if the client timeout is zero
    /// - build errors from [`Request::build`]
    /// - `HttpError::Transport` for connect, TLS handshake, write or read
    ///   failures; [`DispatchError::is_timeout`] reports timeouts
    /// - `HttpError::RedirectLimit` with the last 3xx response attached
    pub async fn dispatch(&self, request: Request) -> Result<HttpResponse, DispatchError> {
        self.dispatch_with_context(&DispatchContext::default(), request)
            .await
    }

    /// [`dispatch`](Self::dispatch) under a caller cancellation token and deadline.
    ///
    /// # Errors
    /// See [`dispatch`](Self::dispatch). Cancellation yields a non-timeout
    /// transport error; an expired context deadline yields a timeout.
    pub async fn dispatch_with_context(
        &self,
        ctx: &DispatchContext,
        mut request: Request,
    ) -> Result<HttpResponse, DispatchError> {
        let timeout = self.config.timeout;
        if timeout.is_zero() {
            return Err(HttpError::configuration("overall timeout must be greater than zero").into());
        }

        let hook = request.on_before_request.take();
        let compression = request.compression.clone();
        let show_debug = request.show_debug;

        let mut wire = request.build().await?;
        if show_debug {
            wire = dump_request(wire).await;
        }
        if let Some(hook) = hook {
            hook(&mut wire);
        }
        let sent = request_head(&wire);

        let deadline = [Instant::now().checked_add(timeout), ctx.deadline]
            .into_iter()
            .flatten()
            .min();

        let outcome = RedirectOutcome::new();
        wire.extensions_mut().insert(outcome.clone());
        tracing::debug!(method = %sent.method(), uri = %sent.uri(), "dispatching request");
        let response = self.exchange(ctx, wire, deadline).await?;

        let (head, body) = response.into_parts();
        let uri = head
            .extensions
            .get::<RequestUri>()
            .map_or_else(|| sent.uri().clone(), |final_uri| final_uri.0.clone());
        let decoder = response_decoder(compression.as_ref(), &head.headers)?;
        let body = ResponseBody::new(body, decoder).with_deadline(deadline);
        let response = HttpResponse::new(head, uri, sent, body);

        tracing::debug!(status = %response.status(), uri = %response.uri(), "response received");

        if outcome.limit_reached() {
            return Err(DispatchError::with_response(
                HttpError::RedirectLimit {
                    max: self.config.max_redirects,
                },
                response,
            ));
        }
        Ok(response)
    }
}

impl HttpClient {
    /// Run one exchange, redirects included, until `deadline` or until the
    /// caller's token is cancelled.
    async fn exchange(
        &self,
        ctx: &DispatchContext,
        wire: WireRequest,
        deadline: Option<Instant>,
    ) -> Result<http::Response<RawBody>, HttpError> {
        let call = self.service.clone().oneshot(wire);
        let timed = async move {
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, call).await,
                None => Ok(call.await),
            }
        };

        let outcome = match &ctx.cancellation {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => {
                    return Err(HttpError::transport(Box::new(io::Error::new(
                        io::ErrorKind::Interrupted,
                        "dispatch cancelled",
                    ))));
                }
                outcome = timed => outcome,
            },
            None => timed.await,
        };
        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(HttpError::transport(err)),
            Err(elapsed) => Err(HttpError::transport(Box::new(elapsed))),
        }
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("custom_transport", &self.custom_transport.is_some())
            .finish_non_exhaustive()
    }
}

/// Decoder for the response body when the response is encoded with the
/// request's codec.
fn response_decoder(
    compression: Option<&Compression>,
    headers: &HeaderMap,
) -> Result<Option<Box<dyn Decompress>>, HttpError> {
    let Some(compression) = compression else {
        return Ok(None);
    };
    let encoded = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|encoding| compression.matches(encoding));
    if !encoded {
        return Ok(None);
    }
    compression
        .codec()
        .reader()
        .map(Some)
        .map_err(|e| HttpError::Decode(Box::new(e)))
}

/// Head of the wire request, kept on the response.
fn request_head(wire: &WireRequest) -> http::Request<()> {
    let mut head = http::Request::new(());
    head.method_mut().clone_from(wire.method());
    head.uri_mut().clone_from(wire.uri());
    *head.version_mut() = wire.version();
    head.headers_mut().clone_from(wire.headers());
    head
}

/// Log the wire request and hand it back with its body intact.
async fn dump_request(wire: WireRequest) -> WireRequest {
    let (parts, body) = wire.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    };
    tracing::info!(target: "modkit_fetch::dump", "\n{}", format_dump(&parts, &bytes));
    http::Request::from_parts(parts, Full::new(bytes))
}

fn format_dump(parts: &http::request::Parts, body: &Bytes) -> String {
    let request_line = format!(
        "{} {} {}",
        parts.method,
        parts.uri,
        version_name(parts.version)
    );
    let headers: String = parts
        .headers
        .iter()
        .map(|(name, value)| {
            if value.is_sensitive() {
                format!("{name}: <redacted>\n")
            } else {
                format!("{name}: {}\n", String::from_utf8_lossy(value.as_bytes()))
            }
        })
        .collect();
    let body = match std::str::from_utf8(body) {
        Ok(text) => text.to_owned(),
        Err(_) => format!("<{} bytes of binary data>", body.len()),
    };
    format!("{request_line}\n{headers}\n{body}")
}

fn version_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}
