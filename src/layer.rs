use std::sync::Arc;

use tower::Layer;

use crate::config::CompressionConfig;
use crate::service::{ClientCompressionService, ServerCompressionService};

/// A Tower layer for servers that decompresses request bodies and
/// compresses response bodies.
///
/// Wrapped services see requests with their bodies already decoded and
/// have their responses compressed according to the client's
/// `Accept-Encoding` header.
#[derive(Debug, Clone)]
pub struct ServerCompressionLayer {
    config: Arc<CompressionConfig>,
}

impl ServerCompressionLayer {
    /// Creates a new layer with the default configuration.
    pub fn new() -> Self {
        Self::with_config(CompressionConfig::default())
    }

    /// Creates a new layer with the given configuration.
    pub fn with_config(config: CompressionConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for ServerCompressionLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for ServerCompressionLayer {
    type Service = ServerCompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ServerCompressionService::new(inner, Arc::clone(&self.config))
    }
}

/// A Tower layer for clients that compresses request bodies and
/// decompresses response bodies.
///
/// When the caller set no `Accept-Encoding`, the configured codecs are
/// advertised on outgoing requests so the remote side may compress its
/// responses.
#[derive(Debug, Clone)]
pub struct ClientCompressionLayer {
    config: Arc<CompressionConfig>,
}

impl ClientCompressionLayer {
    /// Creates a new layer with the default configuration.
    pub fn new() -> Self {
        Self::with_config(CompressionConfig::default())
    }

    /// Creates a new layer with the given configuration.
    pub fn with_config(config: CompressionConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for ClientCompressionLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for ClientCompressionLayer {
    type Service = ClientCompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientCompressionService::new(inner, Arc::clone(&self.config))
    }
}
