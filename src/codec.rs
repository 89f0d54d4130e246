use std::io::{self, Read, Write};

#[cfg(any(feature = "gzip", feature = "deflate"))]
use std::fmt;
#[cfg(any(feature = "gzip", feature = "deflate"))]
use std::sync::Arc;

#[cfg(any(feature = "gzip", feature = "deflate"))]
use flate2::Compression;
#[cfg(feature = "deflate")]
use flate2::{read::DeflateDecoder, write::DeflateEncoder};
#[cfg(feature = "gzip")]
use flate2::{read::GzDecoder, write::GzEncoder};

#[cfg(any(feature = "gzip", feature = "deflate"))]
use crate::buffer::{BufferManager, SimpleBufferManager};

/// Compression level used by the built-in codecs unless overridden, on a
/// scale of 0 (no compression) to 9 (best compression).
#[cfg(any(feature = "gzip", feature = "deflate"))]
pub const DEFAULT_LEVEL: u32 = 6;

/// A body transcoder identified by a `Content-Encoding` token.
///
/// Codecs work on whole bodies: the pipeline buffers a message body, runs it
/// through [`compress`](Codec::compress) or
/// [`decompress`](Codec::decompress), and replaces the body with the result.
/// Compression reports the number of bytes written so the pipeline can set
/// `Content-Length` without a second pass.
pub trait Codec: Send + Sync {
    /// The token this codec writes into `Content-Encoding`, e.g. `"gzip"`.
    fn encoding_type(&self) -> &str;

    /// Whether `token` selects this codec. Tokens compare case-insensitively.
    fn matches(&self, token: &str) -> bool {
        token.eq_ignore_ascii_case(self.encoding_type())
    }

    /// Compresses all of `source` into `destination`, returning the number
    /// of compressed bytes written.
    fn compress(&self, source: &mut dyn Read, destination: &mut dyn Write) -> io::Result<u64>;

    /// Decompresses all of `source` into `destination`.
    fn decompress(&self, source: &mut dyn Read, destination: &mut dyn Write) -> io::Result<()>;
}

/// A [`Codec`] for the `gzip` encoding.
#[cfg(feature = "gzip")]
pub struct GzipCodec {
    level: u32,
    buffers: Arc<dyn BufferManager>,
}

#[cfg(feature = "gzip")]
impl GzipCodec {
    /// Creates a codec compressing at [`DEFAULT_LEVEL`].
    pub fn new() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            buffers: Arc::new(SimpleBufferManager::new()),
        }
    }

    /// Sets the compression level, clamped to the 0 to 9 scale.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Sets the manager supplying scratch buffers for compression.
    pub fn with_buffer_manager(mut self, buffers: Arc<dyn BufferManager>) -> Self {
        self.buffers = buffers;
        self
    }
}

#[cfg(feature = "gzip")]
impl Default for GzipCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "gzip")]
impl fmt::Debug for GzipCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipCodec")
            .field("level", &self.level)
            .finish()
    }
}

#[cfg(feature = "gzip")]
impl Codec for GzipCodec {
    fn encoding_type(&self) -> &str {
        "gzip"
    }

    // `x-gzip` is equivalent to `gzip` per RFC 9110.
    fn matches(&self, token: &str) -> bool {
        token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip")
    }

    fn compress(&self, source: &mut dyn Read, destination: &mut dyn Write) -> io::Result<u64> {
        let mut staged = self.buffers.acquire(Some("gzip"));
        let mut encoder = GzEncoder::new(&mut *staged, Compression::new(self.level));
        io::copy(source, &mut encoder)?;
        encoder.finish()?;
        destination.write_all(&staged)?;
        Ok(staged.len() as u64)
    }

    fn decompress(&self, source: &mut dyn Read, destination: &mut dyn Write) -> io::Result<()> {
        let mut decoder = GzDecoder::new(source);
        io::copy(&mut decoder, destination)?;
        Ok(())
    }
}

/// A [`Codec`] for the `deflate` encoding.
///
/// Writes raw DEFLATE streams without a zlib wrapper, matching what most
/// HTTP peers produce under this token.
#[cfg(feature = "deflate")]
pub struct DeflateCodec {
    level: u32,
    buffers: Arc<dyn BufferManager>,
}

#[cfg(feature = "deflate")]
impl DeflateCodec {
    /// Creates a codec compressing at [`DEFAULT_LEVEL`].
    pub fn new() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            buffers: Arc::new(SimpleBufferManager::new()),
        }
    }

    /// Sets the compression level, clamped to the 0 to 9 scale.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Sets the manager supplying scratch buffers for compression.
    pub fn with_buffer_manager(mut self, buffers: Arc<dyn BufferManager>) -> Self {
        self.buffers = buffers;
        self
    }
}

#[cfg(feature = "deflate")]
impl Default for DeflateCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "deflate")]
impl fmt::Debug for DeflateCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeflateCodec")
            .field("level", &self.level)
            .finish()
    }
}

#[cfg(feature = "deflate")]
impl Codec for DeflateCodec {
    fn encoding_type(&self) -> &str {
        "deflate"
    }

    fn compress(&self, source: &mut dyn Read, destination: &mut dyn Write) -> io::Result<u64> {
        let mut staged = self.buffers.acquire(Some("deflate"));
        let mut encoder = DeflateEncoder::new(&mut *staged, Compression::new(self.level));
        io::copy(source, &mut encoder)?;
        encoder.finish()?;
        destination.write_all(&staged)?;
        Ok(staged.len() as u64)
    }

    fn decompress(&self, source: &mut dyn Read, destination: &mut dyn Write) -> io::Result<()> {
        let mut decoder = DeflateDecoder::new(source);
        io::copy(&mut decoder, destination)?;
        Ok(())
    }
}
