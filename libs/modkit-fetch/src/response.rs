use crate::compression::Decompress;
use crate::error::{BoxError, HttpError};
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode, Uri, Version};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use serde::de::DeserializeOwned;
use std::fmt;
use tokio::time::Instant;

/// Type-erased body as produced by the transport stack.
pub type RawBody = BoxBody<Bytes, BoxError>;

enum RawLayer {
    Open(RawBody),
    Exhausted,
    Closed,
}

impl RawLayer {
    async fn next(&mut self, deadline: Option<Instant>) -> Result<Option<Bytes>, HttpError> {
        loop {
            let body = match self {
                Self::Open(body) => body,
                Self::Exhausted => return Ok(None),
                Self::Closed => return Err(HttpError::BodyClosed),
            };
            let frame = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, body.frame())
                    .await
                    .map_err(|elapsed| HttpError::transport(Box::new(elapsed)))?,
                None => body.frame().await,
            };
            match frame {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data()
                        && !data.is_empty()
                    {
                        return Ok(Some(data));
                    }
                }
                Some(Err(err)) => return Err(HttpError::transport(err)),
                None => {
                    *self = Self::Exhausted;
                    return Ok(None);
                }
            }
        }
    }
}

enum DecodeLayer {
    /// Body is passed through raw
    Absent,
    Active(Box<dyn Decompress>),
    /// Decoder reached end of stream and was dropped
    Finished,
    /// Decoder dropped by `close()` before end of stream
    Released,
}

/// Lazily read response body.
///
/// Owns the raw network stream and, when the response matched the
/// request's codec, a decompressor layered on top of it. [`chunk`] always
/// reads through the outermost layer; [`raw_chunk`] bypasses decompression.
///
/// [`close`] releases both layers and may be called any number of times.
/// Afterwards raw reads fail with [`HttpError::BodyClosed`], while a
/// decompressor that had already reached its end keeps reporting end of
/// stream. Dropping the body releases everything as well.
///
/// [`chunk`]: ResponseBody::chunk
/// [`raw_chunk`]: ResponseBody::raw_chunk
/// [`close`]: ResponseBody::close
pub struct ResponseBody {
    raw: RawLayer,
    decoder: DecodeLayer,
    deadline: Option<Instant>,
}

impl ResponseBody {
    pub(crate) fn new(raw: RawBody, decoder: Option<Box<dyn Decompress>>) -> Self {
        Self {
            raw: RawLayer::Open(raw),
            decoder: decoder.map_or(DecodeLayer::Absent, DecodeLayer::Active),
            deadline: None,
        }
    }

    /// Bound every raw read by `deadline`.
    pub(crate) fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Whether reads go through a decompressor.
    #[must_use]
    pub fn is_decompressing(&self) -> bool {
        !matches!(self.decoder, DecodeLayer::Absent)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.raw, RawLayer::Closed)
    }

    /// Next chunk from the outermost layer, `None` at end of stream.
    ///
    /// # Errors
    /// - `HttpError::Decode` if decompression fails
    /// - `HttpError::Transport` if the connection fails or the deadline passes
    /// - `HttpError::BodyClosed` after [`ResponseBody::close`]
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, HttpError> {
        loop {
            let decoder = match &mut self.decoder {
                DecodeLayer::Absent => return self.raw.next(self.deadline).await,
                DecodeLayer::Finished => return Ok(None),
                DecodeLayer::Released => return Err(HttpError::BodyClosed),
                DecodeLayer::Active(decoder) => decoder,
            };
            if let Some(input) = self.raw.next(self.deadline).await? {
                let output = decoder
                    .decompress(&input)
                    .map_err(|e| HttpError::Decode(Box::new(e)))?;
                if !output.is_empty() {
                    return Ok(Some(output));
                }
            } else {
                let tail = decoder
                    .finish()
                    .map_err(|e| HttpError::Decode(Box::new(e)))?;
                self.decoder = DecodeLayer::Finished;
                return Ok((!tail.is_empty()).then_some(tail));
            }
        }
    }

    /// Next chunk straight from the network, ignoring any decompressor.
    ///
    /// # Errors
    /// - `HttpError::Transport` if the connection fails or the deadline passes
    /// - `HttpError::BodyClosed` after [`ResponseBody::close`]
    pub async fn raw_chunk(&mut self) -> Result<Option<Bytes>, HttpError> {
        self.raw.next(self.deadline).await
    }

    /// Read the rest of the body through the outermost layer.
    ///
    /// # Errors
    /// See [`ResponseBody::chunk`].
    pub async fn bytes(&mut self) -> Result<Bytes, HttpError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Read the rest of the body as text; invalid UTF-8 is replaced.
    ///
    /// # Errors
    /// See [`ResponseBody::chunk`].
    pub async fn text(&mut self) -> Result<String, HttpError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read the rest of the body and decode it as JSON.
    ///
    /// # Errors
    /// `HttpError::Decode` if the body is not valid JSON for `T`, plus the
    /// errors of [`ResponseBody::chunk`].
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, HttpError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| HttpError::Decode(Box::new(e)))
    }

    /// Release the network stream and the decompressor, if any.
    pub fn close(&mut self) {
        self.raw = RawLayer::Closed;
        if matches!(self.decoder, DecodeLayer::Active(_)) {
            self.decoder = DecodeLayer::Released;
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("decompressing", &self.is_decompressing())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Response of one dispatch.
///
/// Besides status, headers and body it records the final URI (after any
/// followed redirects) and the head of the request that was actually sent,
/// including changes made by the pre-send hook.
pub struct HttpResponse {
    head: http::response::Parts,
    uri: Uri,
    request: http::Request<()>,
    body: ResponseBody,
}

impl HttpResponse {
    pub(crate) fn new(
        head: http::response::Parts,
        uri: Uri,
        request: http::Request<()>,
        body: ResponseBody,
    ) -> Self {
        Self {
            head,
            uri,
            request,
            body,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.head.version
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// URI of the last hop reached.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Head of the wire request as sent (the first hop).
    #[must_use]
    pub fn request(&self) -> &http::Request<()> {
        &self.request
    }

    #[must_use]
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Read the whole body through the outermost layer.
    ///
    /// # Errors
    /// See [`ResponseBody::chunk`].
    pub async fn bytes(mut self) -> Result<Bytes, HttpError> {
        self.body.bytes().await
    }

    /// Read the whole body as text (lossy UTF-8).
    ///
    /// # Errors
    /// See [`ResponseBody::chunk`].
    pub async fn text(mut self) -> Result<String, HttpError> {
        self.body.text().await
    }

    /// Decode the whole body as JSON.
    ///
    /// # Errors
    /// See [`ResponseBody::json`].
    pub async fn json<T: DeserializeOwned>(mut self) -> Result<T, HttpError> {
        self.body.json().await
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.head.status)
            .field("uri", &self.uri)
            .field("headers", &self.head.headers)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}
