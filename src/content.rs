use std::fmt;

use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::codec::Codec;
use crate::error::{CompressionError, MessageDirection};

/// A fully buffered message body together with the headers describing it.
#[derive(Debug, Clone, Default)]
pub struct MessageContent {
    /// The body bytes.
    pub data: Bytes,
    /// The headers describing the body.
    pub headers: HeaderMap,
}

impl MessageContent {
    /// Creates content from buffered bytes and their headers.
    pub fn new(data: Bytes, headers: HeaderMap) -> Self {
        Self { data, headers }
    }
}

/// Copies every header from `source` except `skip`, preserving repeated
/// values. A header the destination map cannot hold is dropped with a
/// warning instead of failing the exchange.
pub(crate) fn copy_headers(source: &HeaderMap, skip: Option<&HeaderName>) -> HeaderMap {
    let mut copied = HeaderMap::new();
    for (name, value) in source {
        if skip.is_some_and(|skipped| skipped == name) {
            continue;
        }
        if let Err(fault) = copied.try_append(name.clone(), value.clone()) {
            warn!(header = %name, error = %fault, "skipping header that could not be copied");
        }
    }
    copied
}

/// Builds the `Content-Encoding` value naming `codec`.
pub(crate) fn encoding_header_value(codec: &dyn Codec) -> Result<HeaderValue, CompressionError> {
    let token = codec.encoding_type();
    if token.is_empty() {
        return Err(CompressionError::InvalidArgument(
            "codec declares an empty encoding token",
        ));
    }
    HeaderValue::from_str(token).map_err(|_| {
        CompressionError::InvalidArgument("codec encoding token is not a valid header value")
    })
}

/// Presents buffered content in its compressed form.
///
/// [`encode`](CompressedContent::encode) yields content carrying the
/// original headers minus `Content-Length`, with the codec token appended to
/// `Content-Encoding` and `Content-Length` set to the compressed size.
pub struct CompressedContent<'a> {
    content: MessageContent,
    codec: &'a dyn Codec,
    direction: MessageDirection,
}

impl<'a> CompressedContent<'a> {
    /// Wraps `content` for compression with `codec`.
    pub fn new(content: MessageContent, codec: &'a dyn Codec, direction: MessageDirection) -> Self {
        Self {
            content,
            codec,
            direction,
        }
    }

    /// Compresses the wrapped body and produces the replacement content.
    pub fn encode(self) -> Result<MessageContent, CompressionError> {
        let encoding = encoding_header_value(self.codec)?;
        let mut headers = copy_headers(&self.content.headers, Some(&CONTENT_LENGTH));
        headers.append(CONTENT_ENCODING, encoding);

        let mut reader = self.content.data.as_ref();
        let mut compressed = Vec::new();
        let written = self
            .codec
            .compress(&mut reader, &mut compressed)
            .map_err(|fault| {
                CompressionError::compress(self.codec.encoding_type(), self.direction, fault)
            })?;
        headers.insert(CONTENT_LENGTH, HeaderValue::from(written));

        Ok(MessageContent::new(Bytes::from(compressed), headers))
    }
}

impl fmt::Debug for CompressedContent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressedContent")
            .field("codec", &self.codec.encoding_type())
            .field("len", &self.content.data.len())
            .finish()
    }
}

/// Presents buffered content in its decoded form.
///
/// Headers are copied verbatim; the caller owns rewriting `Content-Encoding`
/// and `Content-Length` once the decoded size is known.
pub struct DecompressedContent<'a> {
    content: MessageContent,
    codec: &'a dyn Codec,
    direction: MessageDirection,
}

impl<'a> DecompressedContent<'a> {
    /// Wraps `content` for decompression with `codec`.
    pub fn new(content: MessageContent, codec: &'a dyn Codec, direction: MessageDirection) -> Self {
        Self {
            content,
            codec,
            direction,
        }
    }

    /// Decompresses the wrapped body and produces the replacement content.
    pub fn decode(self) -> Result<MessageContent, CompressionError> {
        let mut reader = self.content.data.as_ref();
        let mut decompressed = Vec::new();
        self.codec
            .decompress(&mut reader, &mut decompressed)
            .map_err(|fault| {
                CompressionError::decompress(self.codec.encoding_type(), self.direction, fault)
            })?;

        Ok(MessageContent::new(
            Bytes::from(decompressed),
            copy_headers(&self.content.headers, None),
        ))
    }
}

impl fmt::Debug for DecompressedContent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecompressedContent")
            .field("codec", &self.codec.encoding_type())
            .field("len", &self.content.data.len())
            .finish()
    }
}
