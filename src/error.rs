use std::fmt;
use std::io;

use thiserror::Error;
use tower::BoxError;

/// The message a pipeline operation was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// An outgoing or incoming request body.
    Request,
    /// An outgoing or incoming response body.
    Response,
}

impl fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageDirection::Request => f.write_str("request"),
            MessageDirection::Response => f.write_str("response"),
        }
    }
}

/// Errors produced while compressing or decompressing message bodies.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// A required argument was missing or unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A codec failed while compressing a body.
    #[error("unable to compress {direction} using codec '{codec}'")]
    Compress {
        /// Encoding token of the codec that failed.
        codec: String,
        /// Message the codec was applied to.
        direction: MessageDirection,
        /// Underlying stream fault.
        #[source]
        source: io::Error,
    },

    /// A codec failed while decompressing a body.
    #[error("unable to decompress {direction} using codec '{codec}'")]
    Decompress {
        /// Encoding token of the codec that failed.
        codec: String,
        /// Message the codec was applied to.
        direction: MessageDirection,
        /// Underlying stream fault.
        #[source]
        source: io::Error,
    },

    /// The body failed while being buffered, typically because the
    /// underlying content was already released by an earlier consumer.
    #[error("unable to buffer {direction} body")]
    Buffering {
        /// Message whose body could not be buffered.
        direction: MessageDirection,
        /// Error reported by the body while polling it.
        #[source]
        source: BoxError,
    },
}

impl CompressionError {
    pub(crate) fn compress(token: &str, direction: MessageDirection, source: io::Error) -> Self {
        CompressionError::Compress {
            codec: token.to_owned(),
            direction,
            source,
        }
    }

    pub(crate) fn decompress(token: &str, direction: MessageDirection, source: io::Error) -> Self {
        CompressionError::Decompress {
            codec: token.to_owned(),
            direction,
            source,
        }
    }
}
