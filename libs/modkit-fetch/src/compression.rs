//! Content-encoding codecs.
//!
//! A [`Compression`] is a shared handle to a [`Codec`]: a content-encoding
//! token plus factories for a compressing writer (request bodies) and an
//! incremental decompressor (response bodies).

use bytes::Bytes;
use flate2::write::{GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

/// Compressing sink for a whole request body.
pub trait Compress: Write + Send {
    /// Flush trailing data and return the compressed bytes.
    ///
    /// # Errors
    /// Returns the underlying write error.
    fn finish_boxed(self: Box<Self>) -> io::Result<Vec<u8>>;
}

/// Push-based decompressor for a streamed response body.
///
/// Each `decompress` call consumes one raw chunk and returns the decoded
/// bytes that are ready so far (possibly empty).
pub trait Decompress: Send {
    /// # Errors
    /// Returns an error if the input is not valid for this encoding.
    fn decompress(&mut self, input: &[u8]) -> io::Result<Bytes>;

    /// Signal end of input and return any remaining decoded bytes.
    ///
    /// # Errors
    /// Returns an error if the stream was truncated.
    fn finish(&mut self) -> io::Result<Bytes>;
}

/// A named content-encoding strategy.
pub trait Codec: Send + Sync + 'static {
    /// Token used in `Content-Encoding` / `Accept-Encoding`.
    fn content_encoding(&self) -> &'static str;

    /// Writer that compresses into an in-memory buffer.
    fn writer(&self) -> Box<dyn Compress>;

    /// Decoder for a response body.
    ///
    /// # Errors
    /// Returns an error if the decoder cannot be initialized.
    fn reader(&self) -> io::Result<Box<dyn Decompress>>;
}

/// GZIP-family codec (`gzip`).
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

/// DEFLATE-family codec (`deflate`, zlib-wrapped).
#[derive(Debug, Clone, Copy, Default)]
pub struct DeflateCodec;

impl Codec for GzipCodec {
    fn content_encoding(&self) -> &'static str {
        "gzip"
    }

    fn writer(&self) -> Box<dyn Compress> {
        Box::new(GzEncoder::new(Vec::new(), flate2::Compression::default()))
    }

    fn reader(&self) -> io::Result<Box<dyn Decompress>> {
        Ok(Box::new(GzDecoder::new(Vec::new())))
    }
}

impl Codec for DeflateCodec {
    fn content_encoding(&self) -> &'static str {
        "deflate"
    }

    fn writer(&self) -> Box<dyn Compress> {
        Box::new(ZlibEncoder::new(Vec::new(), flate2::Compression::default()))
    }

    fn reader(&self) -> io::Result<Box<dyn Decompress>> {
        Ok(Box::new(ZlibDecoder::new(Vec::new())))
    }
}

impl Compress for GzEncoder<Vec<u8>> {
    fn finish_boxed(self: Box<Self>) -> io::Result<Vec<u8>> {
        GzEncoder::finish(*self)
    }
}

impl Compress for ZlibEncoder<Vec<u8>> {
    fn finish_boxed(self: Box<Self>) -> io::Result<Vec<u8>> {
        ZlibEncoder::finish(*self)
    }
}

impl Decompress for GzDecoder<Vec<u8>> {
    fn decompress(&mut self, input: &[u8]) -> io::Result<Bytes> {
        self.write_all(input)?;
        self.flush()?;
        Ok(Bytes::from(std::mem::take(self.get_mut())))
    }

    fn finish(&mut self) -> io::Result<Bytes> {
        self.try_finish()?;
        Ok(Bytes::from(std::mem::take(self.get_mut())))
    }
}

impl Decompress for ZlibDecoder<Vec<u8>> {
    fn decompress(&mut self, input: &[u8]) -> io::Result<Bytes> {
        self.write_all(input)?;
        self.flush()?;
        Ok(Bytes::from(std::mem::take(self.get_mut())))
    }

    fn finish(&mut self) -> io::Result<Bytes> {
        self.try_finish()?;
        Ok(Bytes::from(std::mem::take(self.get_mut())))
    }
}

/// Compression descriptor attached to a request.
///
/// Cheap to clone; used symmetrically for the request body and the
/// response body.
#[derive(Clone)]
pub struct Compression(Arc<dyn Codec>);

impl Compression {
    /// Wrap a custom codec.
    #[must_use]
    pub fn new(codec: impl Codec) -> Self {
        Self(Arc::new(codec))
    }

    #[must_use]
    pub fn gzip() -> Self {
        Self::new(GzipCodec)
    }

    #[must_use]
    pub fn deflate() -> Self {
        Self::new(DeflateCodec)
    }

    /// Alias of [`Compression::deflate`].
    #[must_use]
    pub fn zlib() -> Self {
        Self::deflate()
    }

    /// Look up a built-in codec by name (`gzip`, `deflate`, `zlib`).
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "gzip" => Some(Self::gzip()),
            "deflate" | "zlib" => Some(Self::deflate()),
            _ => None,
        }
    }

    #[must_use]
    pub fn content_encoding(&self) -> &'static str {
        self.0.content_encoding()
    }

    #[must_use]
    pub fn codec(&self) -> &dyn Codec {
        self.0.as_ref()
    }

    /// Compress a complete body in one pass.
    ///
    /// # Errors
    /// Returns the codec's write error.
    pub fn compress(&self, body: &[u8]) -> io::Result<Vec<u8>> {
        let mut writer = self.0.writer();
        writer.write_all(body)?;
        writer.finish_boxed()
    }

    /// Whether a response `Content-Encoding` value selects this codec.
    ///
    /// Substring match, not equality: `x-gzip` or `gzip, identity` match `gzip`.
    #[must_use]
    pub fn matches(&self, content_encoding: &str) -> bool {
        content_encoding.contains(self.content_encoding())
    }
}

impl fmt::Debug for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Compression")
            .field(&self.content_encoding())
            .finish()
    }
}
