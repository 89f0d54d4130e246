use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use http::{Extensions, HeaderMap, HeaderValue};
use http_body::Body;
use http_body_util::BodyExt;
use tracing::debug;

use crate::codec::Codec;
use crate::config::CompressionConfig;
use crate::content::{CompressedContent, DecompressedContent, MessageContent};
use crate::error::{CompressionError, MessageDirection};
use crate::negotiate::{EncodingPreference, negotiate};

/// Extension overriding whether an exchange takes part in compression.
///
/// May be set on the request by a routing layer or on the response by a
/// handler. A response value wins over a request value, which wins over the
/// configured predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionEnabled(pub bool);

/// Response extension set by host adapters once headers have reached the
/// wire. Marked responses pass through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadersWritten(pub bool);

/// Collects `body` fully into memory, returning its bytes and trailers.
pub(crate) async fn buffer_body<B>(
    body: B,
    direction: MessageDirection,
) -> Result<(Bytes, Option<HeaderMap>), CompressionError>
where
    B: Body,
    B::Error: Into<tower::BoxError>,
{
    let collected = body
        .collect()
        .await
        .map_err(|fault| CompressionError::Buffering {
            direction,
            source: fault.into(),
        })?;
    let trailers = collected.trailers().cloned();
    Ok((collected.to_bytes(), trailers))
}

/// Whether an inbound message carries an encoding a configured codec can
/// undo, making its body worth buffering.
pub(crate) fn should_decode(config: &CompressionConfig, headers: &HeaderMap) -> bool {
    first_content_encoding(headers).is_some_and(|token| config.codec_for(&token).is_some())
}

/// Decodes buffered inbound content according to its first
/// `Content-Encoding` token.
///
/// Content that is empty, carries no encoding, or names one that no
/// configured codec claims comes back unchanged. Decoded content has the
/// claimed token stripped and `Content-Length` rewritten to the decoded
/// size.
pub(crate) fn decode_inbound(
    config: &CompressionConfig,
    content: MessageContent,
    direction: MessageDirection,
) -> Result<MessageContent, CompressionError> {
    if content.data.is_empty() {
        return Ok(content);
    }
    let Some(token) = first_content_encoding(&content.headers) else {
        return Ok(content);
    };
    let Some(codec) = config.codec_for(&token) else {
        debug!(direction = %direction, encoding = %token, "no codec claims encoding, forwarding as is");
        return Ok(content);
    };

    let mut decoded = DecompressedContent::new(content, codec.as_ref(), direction).decode()?;
    strip_first_encoding(&mut decoded.headers, &token);
    decoded
        .headers
        .insert(CONTENT_LENGTH, HeaderValue::from(decoded.data.len() as u64));
    debug!(
        direction = %direction,
        encoding = %token,
        decoded_len = decoded.data.len(),
        "decompressed inbound body"
    );
    Ok(decoded)
}

/// Picks the codec for an outbound body, or `None` to leave it untouched.
///
/// Requires the exchange to be enabled, a body that is not declared empty,
/// and a negotiated codec the body does not already carry. Bodies declaring
/// a size below the threshold are rejected here; bodies of unknown size
/// pass and are measured against the threshold again once buffered.
pub(crate) fn select_outbound_codec<'a>(
    config: &'a CompressionConfig,
    preferences: &[EncodingPreference],
    headers: &HeaderMap,
    declared_size: Option<u64>,
    enabled: bool,
    direction: MessageDirection,
) -> Option<&'a Arc<dyn Codec>> {
    if !enabled {
        debug!(direction = %direction, "compression disabled for this exchange");
        return None;
    }
    if declared_size == Some(0) {
        return None;
    }
    let codec = negotiate(preferences, config.codecs())?;
    if content_encoding_contains(headers, codec.as_ref()) {
        debug!(
            direction = %direction,
            encoding = codec.encoding_type(),
            "body already carries the negotiated encoding"
        );
        return None;
    }
    if let Some(declared) = declared_size {
        if !meets_threshold(config.threshold(), Some(declared)) {
            debug!(
                direction = %direction,
                declared_size = declared,
                threshold = config.threshold(),
                "body below compression threshold"
            );
            return None;
        }
    }
    Some(codec)
}

/// Compresses buffered content with `codec`, returning the replacement.
pub(crate) fn compress_content(
    content: MessageContent,
    codec: &dyn Codec,
    direction: MessageDirection,
) -> Result<MessageContent, CompressionError> {
    let original_len = content.data.len();
    let compressed = CompressedContent::new(content, codec, direction).encode()?;
    debug!(
        direction = %direction,
        encoding = codec.encoding_type(),
        original_len,
        compressed_len = compressed.data.len(),
        "compressed outbound body"
    );
    Ok(compressed)
}

/// Whether `length` satisfies `threshold`. A zero threshold accepts
/// everything; a positive threshold rejects unknown lengths.
pub(crate) fn meets_threshold(threshold: u64, length: Option<u64>) -> bool {
    if threshold == 0 {
        return true;
    }
    length.is_some_and(|length| length >= threshold)
}

/// The size a body claims before being buffered, from its own hint or from
/// `Content-Length`.
pub(crate) fn declared_length<B: Body>(headers: &HeaderMap, body: &B) -> Option<u64> {
    if let Some(length) = body.size_hint().exact() {
        return Some(length);
    }
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Resolves the effective enable signal for a response.
pub(crate) fn compression_enabled(
    response_extensions: &Extensions,
    request_signal: Option<CompressionEnabled>,
    default: bool,
) -> bool {
    response_extensions
        .get::<CompressionEnabled>()
        .copied()
        .or(request_signal)
        .map_or(default, |signal| signal.0)
}

/// Whether a host adapter reports the response headers as already sent.
pub(crate) fn headers_already_written(extensions: &Extensions) -> bool {
    extensions
        .get::<HeadersWritten>()
        .is_some_and(|written| written.0)
}

/// The first `Content-Encoding` token on the message, if any.
pub(crate) fn first_content_encoding(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .find(|token| !token.is_empty())
        .map(str::to_owned)
}

/// Removes the first occurrence of `token` from `Content-Encoding`,
/// keeping any remaining tokens in order.
pub(crate) fn strip_first_encoding(headers: &mut HeaderMap, token: &str) {
    let mut tokens: Vec<String> = headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect();

    if let Some(position) = tokens
        .iter()
        .position(|entry| entry.eq_ignore_ascii_case(token))
    {
        tokens.remove(position);
    }

    headers.remove(CONTENT_ENCODING);
    if !tokens.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&tokens.join(", ")) {
            headers.insert(CONTENT_ENCODING, value);
        }
    }
}

/// Whether any `Content-Encoding` token on the message names `codec`.
pub(crate) fn content_encoding_contains(headers: &HeaderMap, codec: &dyn Codec) -> bool {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .any(|token| !token.is_empty() && codec.matches(token))
}

#[cfg(test)]
mod tests {
    use std::io::{self, Read, Write};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use http_body::Frame;
    use http_body_util::Full;
    use tower::BoxError;

    use super::*;

    struct TestCodec(&'static str);

    impl Codec for TestCodec {
        fn encoding_type(&self) -> &str {
            self.0
        }

        fn compress(&self, source: &mut dyn Read, destination: &mut dyn Write) -> io::Result<u64> {
            io::copy(source, destination)
        }

        fn decompress(&self, source: &mut dyn Read, destination: &mut dyn Write) -> io::Result<()> {
            io::copy(source, destination)?;
            Ok(())
        }
    }

    /// A body that streams without a known size.
    struct UnsizedBody(Option<Bytes>);

    impl Body for UnsizedBody {
        type Data = Bytes;
        type Error = BoxError;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            Poll::Ready(self.0.take().map(|data| Ok(Frame::data(data))))
        }
    }

    /// A body that yields predefined frames.
    struct FramedBody {
        frames: std::collections::VecDeque<Frame<Bytes>>,
    }

    impl Body for FramedBody {
        type Data = Bytes;
        type Error = BoxError;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            Poll::Ready(self.frames.pop_front().map(Ok))
        }
    }

    /// A body that fails midway through streaming.
    struct BrokenBody {
        yielded: bool,
    }

    impl Body for BrokenBody {
        type Data = Bytes;
        type Error = BoxError;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            if self.yielded {
                Poll::Ready(Some(Err("stream reset".into())))
            } else {
                self.yielded = true;
                Poll::Ready(Some(Ok(Frame::data(Bytes::from_static(b"partial")))))
            }
        }
    }

    fn config() -> CompressionConfig {
        CompressionConfig::builder()
            .codec(TestCodec("noop"))
            .codec(TestCodec("alt"))
            .build()
    }

    fn preference(token: &str) -> EncodingPreference {
        EncodingPreference {
            token: token.to_owned(),
            quality: 1.0,
        }
    }

    fn encoded_headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_meets_threshold() {
        assert!(meets_threshold(0, None));
        assert!(meets_threshold(0, Some(0)));
        assert!(meets_threshold(100, Some(100)));
        assert!(meets_threshold(100, Some(150)));
        assert!(!meets_threshold(100, Some(50)));
        assert!(!meets_threshold(100, None));
    }

    #[test]
    fn test_declared_length_prefers_body_hint() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("999"));

        let body = Full::new(Bytes::from_static(b"12345"));
        assert_eq!(declared_length(&headers, &body), Some(5));

        let unsized_body = UnsizedBody(Some(Bytes::from_static(b"12345")));
        assert_eq!(declared_length(&headers, &unsized_body), Some(999));

        assert_eq!(declared_length(&HeaderMap::new(), &unsized_body), None);
    }

    #[test]
    fn test_compression_enabled_precedence() {
        let mut response = Extensions::new();
        assert!(compression_enabled(&response, None, true));
        assert!(!compression_enabled(&response, None, false));

        assert!(!compression_enabled(
            &response,
            Some(CompressionEnabled(false)),
            true
        ));

        response.insert(CompressionEnabled(true));
        assert!(compression_enabled(
            &response,
            Some(CompressionEnabled(false)),
            false
        ));

        response.insert(CompressionEnabled(false));
        assert!(!compression_enabled(&response, Some(CompressionEnabled(true)), true));
    }

    #[test]
    fn test_headers_already_written() {
        let mut extensions = Extensions::new();
        assert!(!headers_already_written(&extensions));

        extensions.insert(HeadersWritten(false));
        assert!(!headers_already_written(&extensions));

        extensions.insert(HeadersWritten(true));
        assert!(headers_already_written(&extensions));
    }

    #[test]
    fn test_first_content_encoding() {
        assert_eq!(first_content_encoding(&HeaderMap::new()), None);
        assert_eq!(
            first_content_encoding(&encoded_headers("noop")),
            Some("noop".to_owned())
        );
        assert_eq!(
            first_content_encoding(&encoded_headers("noop, alt")),
            Some("noop".to_owned())
        );
        assert_eq!(first_content_encoding(&encoded_headers(" , ")), None);
    }

    #[test]
    fn test_strip_first_encoding() {
        let mut headers = encoded_headers("noop");
        strip_first_encoding(&mut headers, "noop");
        assert!(headers.get(CONTENT_ENCODING).is_none());

        let mut headers = encoded_headers("noop, alt");
        strip_first_encoding(&mut headers, "NOOP");
        assert_eq!(headers.get(CONTENT_ENCODING).unwrap(), "alt");

        let mut headers = encoded_headers("noop, noop");
        strip_first_encoding(&mut headers, "noop");
        assert_eq!(headers.get(CONTENT_ENCODING).unwrap(), "noop");
    }

    #[test]
    fn test_content_encoding_contains() {
        let codec = TestCodec("noop");
        assert!(content_encoding_contains(&encoded_headers("noop"), &codec));
        assert!(content_encoding_contains(&encoded_headers("alt, NOOP"), &codec));
        assert!(!content_encoding_contains(&encoded_headers("alt"), &codec));
        assert!(!content_encoding_contains(&HeaderMap::new(), &codec));
    }

    #[test]
    fn test_select_requires_enabled_exchange() {
        let config = config();
        let preferences = [preference("noop")];
        let selected = select_outbound_codec(
            &config,
            &preferences,
            &HeaderMap::new(),
            Some(4096),
            false,
            MessageDirection::Response,
        );
        assert!(selected.is_none());
    }

    #[test]
    fn test_select_skips_empty_bodies() {
        let config = config();
        let preferences = [preference("noop")];
        let selected = select_outbound_codec(
            &config,
            &preferences,
            &HeaderMap::new(),
            Some(0),
            true,
            MessageDirection::Response,
        );
        assert!(selected.is_none());
    }

    #[test]
    fn test_select_requires_negotiated_codec() {
        let config = config();
        let preferences = [preference("br")];
        let selected = select_outbound_codec(
            &config,
            &preferences,
            &HeaderMap::new(),
            Some(4096),
            true,
            MessageDirection::Response,
        );
        assert!(selected.is_none());
    }

    #[test]
    fn test_select_never_recompresses_same_encoding() {
        let config = config();
        let preferences = [preference("noop")];
        let selected = select_outbound_codec(
            &config,
            &preferences,
            &encoded_headers("noop"),
            Some(4096),
            true,
            MessageDirection::Response,
        );
        assert!(selected.is_none());

        let selected = select_outbound_codec(
            &config,
            &preferences,
            &encoded_headers("alt"),
            Some(4096),
            true,
            MessageDirection::Response,
        );
        assert_eq!(selected.map(|codec| codec.encoding_type()), Some("noop"));
    }

    #[test]
    fn test_select_applies_declared_threshold() {
        let config = CompressionConfig::builder()
            .codec(TestCodec("noop"))
            .threshold(100)
            .build();
        let preferences = [preference("noop")];

        let below = select_outbound_codec(
            &config,
            &preferences,
            &HeaderMap::new(),
            Some(50),
            true,
            MessageDirection::Response,
        );
        assert!(below.is_none());

        let above = select_outbound_codec(
            &config,
            &preferences,
            &HeaderMap::new(),
            Some(150),
            true,
            MessageDirection::Response,
        );
        assert!(above.is_some());

        let unknown = select_outbound_codec(
            &config,
            &preferences,
            &HeaderMap::new(),
            None,
            true,
            MessageDirection::Response,
        );
        assert!(unknown.is_some());
    }

    #[test]
    fn test_should_decode() {
        let config = config();
        assert!(should_decode(&config, &encoded_headers("noop")));
        assert!(should_decode(&config, &encoded_headers("NOOP, alt")));
        assert!(!should_decode(&config, &encoded_headers("br")));
        assert!(!should_decode(&config, &HeaderMap::new()));
    }

    #[test]
    fn test_decode_inbound_rewrites_headers() {
        let config = config();
        let mut headers = encoded_headers("noop");
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("999"));
        let content = MessageContent::new(Bytes::from_static(b"payload"), headers);

        let decoded = decode_inbound(&config, content, MessageDirection::Request).unwrap();
        assert_eq!(decoded.data, Bytes::from_static(b"payload"));
        assert!(decoded.headers.get(CONTENT_ENCODING).is_none());
        assert_eq!(decoded.headers.get(CONTENT_LENGTH).unwrap(), "7");
    }

    #[test]
    fn test_decode_inbound_keeps_outer_encodings() {
        let config = config();
        let content = MessageContent::new(Bytes::from_static(b"payload"), encoded_headers("noop, br"));

        let decoded = decode_inbound(&config, content, MessageDirection::Request).unwrap();
        assert_eq!(decoded.headers.get(CONTENT_ENCODING).unwrap(), "br");
    }

    #[test]
    fn test_decode_inbound_leaves_unclaimed_encodings() {
        let config = config();
        let content = MessageContent::new(Bytes::from_static(b"payload"), encoded_headers("br"));

        let decoded = decode_inbound(&config, content, MessageDirection::Request).unwrap();
        assert_eq!(decoded.data, Bytes::from_static(b"payload"));
        assert_eq!(decoded.headers.get(CONTENT_ENCODING).unwrap(), "br");
    }

    #[test]
    fn test_decode_inbound_leaves_empty_bodies() {
        let config = config();
        let content = MessageContent::new(Bytes::new(), encoded_headers("noop"));

        let decoded = decode_inbound(&config, content, MessageDirection::Request).unwrap();
        assert!(decoded.data.is_empty());
        assert_eq!(decoded.headers.get(CONTENT_ENCODING).unwrap(), "noop");
    }

    #[tokio::test]
    async fn test_buffer_body_collects_frames() {
        let body = Full::new(Bytes::from_static(b"streamed payload"));
        let (data, trailers) = buffer_body(body, MessageDirection::Response).await.unwrap();
        assert_eq!(data, Bytes::from_static(b"streamed payload"));
        assert!(trailers.is_none());
    }

    #[tokio::test]
    async fn test_buffer_body_concatenates_frames_and_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", HeaderValue::from_static("abc123"));
        let body = FramedBody {
            frames: vec![
                Frame::data(Bytes::from_static(b"hello ")),
                Frame::data(Bytes::from_static(b"world")),
                Frame::trailers(trailers),
            ]
            .into(),
        };

        let (data, trailers) = buffer_body(body, MessageDirection::Request).await.unwrap();
        assert_eq!(data, Bytes::from_static(b"hello world"));
        assert_eq!(trailers.unwrap().get("x-checksum").unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_buffer_body_surfaces_stream_faults() {
        let fault = buffer_body(BrokenBody { yielded: false }, MessageDirection::Response)
            .await
            .unwrap_err();
        assert!(matches!(
            fault,
            CompressionError::Buffering {
                direction: MessageDirection::Response,
                ..
            }
        ));
    }
}
