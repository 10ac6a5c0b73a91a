use crate::error::HttpError;
use bytes::Bytes;
use std::fmt;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

const BODY_CONTEXT: &str = "request body";

type SerializeFn = Box<dyn FnOnce() -> Result<Vec<u8>, serde_json::Error> + Send>;

/// Request body, one explicit variant per accepted shape.
#[derive(Default)]
pub enum RequestBody {
    /// No body at all
    #[default]
    Absent,
    /// UTF-8 text, sent as-is
    Text(String),
    /// Raw bytes, sent as-is
    Bytes(Bytes),
    /// A caller-provided stream; consumed while the request is built
    Stream(Pin<Box<dyn AsyncRead + Send>>),
    /// A value serialized to JSON while the request is built
    Serializable(SerializeFn),
}

impl RequestBody {
    /// Serialize `value` as JSON when the request is built.
    ///
    /// The value is moved in, so later changes to the caller's copy cannot
    /// reach an in-flight request.
    #[must_use]
    pub fn json<T>(value: T) -> Self
    where
        T: serde::Serialize + Send + 'static,
    {
        Self::Serializable(Box::new(move || serde_json::to_vec(&value)))
    }

    /// Wrap a readable stream.
    #[must_use]
    pub fn stream(reader: impl AsyncRead + Send + 'static) -> Self {
        Self::Stream(Box::pin(reader))
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Normalize the body into bytes.
    ///
    /// Returns `None` for [`RequestBody::Absent`], so "no body" stays
    /// distinguishable from an empty body.
    ///
    /// # Errors
    /// Returns `HttpError::Encoding` if serialization or reading the stream fails.
    pub async fn prepare(self) -> Result<Option<Bytes>, HttpError> {
        match self {
            Self::Absent => Ok(None),
            Self::Text(text) => Ok(Some(Bytes::from(text))),
            Self::Bytes(bytes) => Ok(Some(bytes)),
            Self::Stream(mut reader) => {
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| HttpError::encoding(BODY_CONTEXT, e))?;
                Ok(Some(Bytes::from(buf)))
            }
            Self::Serializable(serialize) => serialize()
                .map(|bytes| Some(Bytes::from(bytes)))
                .map_err(|e| HttpError::encoding(BODY_CONTEXT, e)),
        }
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Serializable(_) => f.write_str("Serializable(..)"),
        }
    }
}
