//! Transparent compression and decompression middleware for Tower HTTP
//! services and clients.
//!
//! [`ServerCompressionLayer`] decodes request bodies whose
//! `Content-Encoding` names a configured codec and compresses response
//! bodies negotiated through the request's `Accept-Encoding` header.
//! [`ClientCompressionLayer`] is its mirror image: it advertises the
//! configured codecs, compresses request bodies, and decodes compressed
//! responses. Gzip and Deflate ship behind default features; other codecs
//! plug in through the [`Codec`] trait.
//!
//! # Example
//!
//! ```ignore
//! use http_message_compression::ServerCompressionLayer;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(ServerCompressionLayer::new())
//!     .service(my_service);
//! ```
//!
//! # Compression Rules
//!
//! The middleware will **not** compress a message when:
//! - Negotiation against `Accept-Encoding` selects no configured codec
//! - A `Content-Encoding` header is already set
//! - The body's known size is below the minimum size threshold (default: 860 bytes)
//! - The body turns out to be empty
//! - A [`CompressionEnabled`] extension or the configured predicate disables it
//!
//! A body whose size is unknown up front is buffered so the threshold can
//! be applied to its actual size.
//!
//! # Message Modifications
//!
//! When compression is applied:
//! - The codec's token is appended to `Content-Encoding`
//! - `Content-Length` is replaced with the compressed size
//!
//! When a body is decompressed:
//! - The first matching `Content-Encoding` token is removed
//! - `Content-Length` is replaced with the decoded size
//!
//! Messages carrying an unrecognized `Content-Encoding` pass through
//! untouched.

#![deny(missing_docs)]

mod body;
mod buffer;
mod codec;
mod config;
mod content;
mod error;
mod future;
mod layer;
mod negotiate;
mod pipeline;
mod service;

pub use body::CompressionBody;
pub use buffer::{BufferLease, BufferManager, PooledBufferManager, SimpleBufferManager};
pub use codec::Codec;
#[cfg(any(feature = "gzip", feature = "deflate"))]
pub use codec::DEFAULT_LEVEL;
#[cfg(feature = "deflate")]
pub use codec::DeflateCodec;
#[cfg(feature = "gzip")]
pub use codec::GzipCodec;
pub use config::{CompressionConfig, CompressionConfigBuilder, DEFAULT_MIN_SIZE};
pub use content::{CompressedContent, DecompressedContent, MessageContent};
pub use error::{CompressionError, MessageDirection};
pub use future::ResponseFuture;
pub use layer::{ClientCompressionLayer, ServerCompressionLayer};
pub use negotiate::{EncodingPreference, negotiate, parse_accept_encoding};
pub use pipeline::{CompressionEnabled, HeadersWritten};
pub use service::{ClientCompressionService, ServerCompressionService};
