use std::fmt;
use std::sync::Arc;

use http::request;

use crate::buffer::{BufferManager, SimpleBufferManager};
use crate::codec::Codec;
#[cfg(feature = "deflate")]
use crate::codec::DeflateCodec;
#[cfg(feature = "gzip")]
use crate::codec::GzipCodec;

/// Smallest body size, in bytes, compressed by default (approximately one
/// MTU). Bodies below it typically grow when compressed.
pub const DEFAULT_MIN_SIZE: u64 = 860;

type EnablePredicate = dyn Fn(&request::Parts) -> bool + Send + Sync;

/// Shared configuration for the compression services.
///
/// Holds the codec registry in preference order, the minimum body size
/// worth compressing, and the predicate deciding whether an exchange takes
/// part in compression at all.
pub struct CompressionConfig {
    codecs: Vec<Arc<dyn Codec>>,
    threshold: u64,
    enable: Arc<EnablePredicate>,
}

impl CompressionConfig {
    /// Starts building a configuration.
    pub fn builder() -> CompressionConfigBuilder {
        CompressionConfigBuilder::new()
    }

    /// The registered codecs, in preference order.
    pub fn codecs(&self) -> &[Arc<dyn Codec>] {
        &self.codecs
    }

    /// The minimum body size, in bytes, worth compressing. Zero compresses
    /// every negotiated body regardless of size.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Whether the exchange described by `parts` takes part in compression.
    pub(crate) fn enabled_for(&self, parts: &request::Parts) -> bool {
        (self.enable)(parts)
    }

    /// The first codec claiming `token`.
    pub(crate) fn codec_for(&self, token: &str) -> Option<&Arc<dyn Codec>> {
        self.codecs.iter().find(|codec| codec.matches(token))
    }

    /// The comma-separated token list advertised in `Accept-Encoding`.
    pub(crate) fn advertised_encodings(&self) -> String {
        self.codecs
            .iter()
            .map(|codec| codec.encoding_type())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for CompressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codecs: Vec<_> = self
            .codecs
            .iter()
            .map(|codec| codec.encoding_type())
            .collect();
        f.debug_struct("CompressionConfig")
            .field("codecs", &codecs)
            .field("threshold", &self.threshold)
            .finish()
    }
}

/// Builder for [`CompressionConfig`].
pub struct CompressionConfigBuilder {
    codecs: Vec<Arc<dyn Codec>>,
    threshold: Option<u64>,
    enable: Option<Arc<EnablePredicate>>,
    buffers: Arc<dyn BufferManager>,
}

impl CompressionConfigBuilder {
    fn new() -> Self {
        Self {
            codecs: Vec::new(),
            threshold: None,
            enable: None,
            buffers: Arc::new(SimpleBufferManager::new()),
        }
    }

    /// Registers a codec. Codecs are preferred in registration order;
    /// registering any codec replaces the built-in set.
    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codecs.push(Arc::new(codec));
        self
    }

    /// Registers an already shared codec.
    pub fn shared_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codecs.push(codec);
        self
    }

    /// Sets the minimum body size, in bytes, worth compressing. Defaults to
    /// [`DEFAULT_MIN_SIZE`]; zero compresses every negotiated body.
    pub fn threshold(mut self, threshold: u64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Sets the predicate deciding per request whether compression applies.
    /// Defaults to compressing everything.
    pub fn enable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&request::Parts) -> bool + Send + Sync + 'static,
    {
        self.enable = Some(Arc::new(predicate));
        self
    }

    /// Sets the manager supplying scratch buffers to the built-in codecs.
    /// Has no effect on codecs registered explicitly.
    pub fn buffer_manager(mut self, buffers: Arc<dyn BufferManager>) -> Self {
        self.buffers = buffers;
        self
    }

    /// Finishes the configuration, falling back to the built-in codecs when
    /// none were registered.
    pub fn build(self) -> CompressionConfig {
        #[allow(unused_mut)]
        let mut codecs = self.codecs;
        if codecs.is_empty() {
            #[cfg(feature = "gzip")]
            codecs.push(Arc::new(
                GzipCodec::new().with_buffer_manager(Arc::clone(&self.buffers)),
            ) as Arc<dyn Codec>);
            #[cfg(feature = "deflate")]
            codecs.push(Arc::new(
                DeflateCodec::new().with_buffer_manager(Arc::clone(&self.buffers)),
            ) as Arc<dyn Codec>);
        }

        CompressionConfig {
            codecs,
            threshold: self.threshold.unwrap_or(DEFAULT_MIN_SIZE),
            enable: self.enable.unwrap_or_else(|| Arc::new(|_| true)),
        }
    }
}

impl fmt::Debug for CompressionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codecs: Vec<_> = self
            .codecs
            .iter()
            .map(|codec| codec.encoding_type())
            .collect();
        f.debug_struct("CompressionConfigBuilder")
            .field("codecs", &codecs)
            .field("threshold", &self.threshold)
            .finish()
    }
}
