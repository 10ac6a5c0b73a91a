use crate::response::HttpResponse;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Boxed error used by the transport stack and body streams.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// How many wrapping layers below the immediate error are inspected
/// when deciding whether a transport failure was a timeout.
const TIMEOUT_UNWRAP_DEPTH: usize = 2;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
    /// URL scheme is neither `http` nor `https`
    UnsupportedScheme,
}

/// HTTP client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Client setup is unusable; raised before any I/O
    #[error("invalid client configuration: {0}")]
    Configuration(String),

    /// Body or query parameters could not be turned into bytes
    #[error("failed to encode {context}: {source}")]
    Encoding {
        /// What was being encoded (request body, query string, ...)
        context: &'static str,
        #[source]
        source: BoxError,
    },

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field is
    /// a diagnostic message for logging only.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Invalid request method
    #[error("invalid method: {0}")]
    InvalidMethod(#[from] http::method::InvalidMethod),

    /// Invalid header name
    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Request assembly failed
    #[error("failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Connect, write or read failure
    #[error("transport error: {source}")]
    Transport {
        #[source]
        source: BoxError,
        /// Derived from the error chain when the error was created
        timeout: bool,
    },

    /// TLS configuration failed
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// More redirects were offered than the client allows
    #[error("redirecting limit reached: more than {max} redirects")]
    RedirectLimit {
        /// Configured maximum number of followed redirects
        max: usize,
    },

    /// Response body could not be decompressed or decoded
    #[error("failed to decode response body: {0}")]
    Decode(#[source] BoxError),

    /// The raw body stream was read after being closed
    #[error("response body is closed")]
    BodyClosed,
}

impl HttpError {
    /// Returns `true` if this error was caused by a timeout.
    ///
    /// Only transport errors carry timeouts; the flag is computed from the
    /// wrapped error chain once, when the error is created.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { timeout: true, .. })
    }

    /// Wrap a transport-layer failure, classifying it as timeout or not.
    pub fn transport(source: BoxError) -> Self {
        // Already classified (e.g. surfaced from an inner layer)
        let source = match source.downcast::<HttpError>() {
            Ok(err) => return *err,
            Err(other) => other,
        };
        let timeout = is_timeout_chain(source.as_ref());
        Self::Transport { source, timeout }
    }

    pub(crate) fn encoding(context: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Encoding {
            context,
            source: source.into(),
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::transport(Box::new(err))
    }
}

/// Inspect the error and up to [`TIMEOUT_UNWRAP_DEPTH`] wrapped causes.
fn is_timeout_chain(err: &(dyn StdError + 'static)) -> bool {
    std::iter::successors(Some(err), |&e| e.source())
        .take(TIMEOUT_UNWRAP_DEPTH + 1)
        .any(signals_timeout)
}

fn signals_timeout(err: &(dyn StdError + 'static)) -> bool {
    if err.is::<tower::timeout::error::Elapsed>() || err.is::<tokio::time::error::Elapsed>() {
        return true;
    }
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        return io_err.kind() == io::ErrorKind::TimedOut;
    }
    if let Some(hyper_err) = err.downcast_ref::<hyper::Error>() {
        return hyper_err.is_timeout();
    }
    err.downcast_ref::<HttpError>()
        .is_some_and(HttpError::is_timeout)
}

/// A failed dispatch.
///
/// Carries the classified [`HttpError`] and, when the transport produced a
/// real protocol response before failing (redirect limit), that partial
/// response. Configuration, encoding and URL errors never carry one.
pub struct DispatchError {
    error: HttpError,
    response: Option<HttpResponse>,
}

impl DispatchError {
    pub(crate) fn with_response(error: HttpError, response: HttpResponse) -> Self {
        Self {
            error,
            response: Some(response),
        }
    }

    /// The classified error.
    #[must_use]
    pub fn error(&self) -> &HttpError {
        &self.error
    }

    /// The last response reached before the failure, if any.
    #[must_use]
    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    /// Split into the error and the partial response.
    #[must_use]
    pub fn into_parts(self) -> (HttpError, Option<HttpResponse>) {
        (self.error, self.response)
    }

    /// Shorthand for `self.error().is_timeout()`.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.error.is_timeout()
    }
}

impl From<HttpError> for DispatchError {
    fn from(error: HttpError) -> Self {
        Self {
            error,
            response: None,
        }
    }
}

impl fmt::Debug for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchError")
            .field("error", &self.error)
            .field("status", &self.response.as_ref().map(HttpResponse::status))
            .finish()
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl StdError for DispatchError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}
