use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use tower::BoxError;

pin_project! {
    /// A message body that may have been rewritten by the pipeline.
    ///
    /// This type either forwards the original body unchanged, serves a fully
    /// buffered replacement produced by a codec, or reproduces the fault
    /// that interrupted buffering of the original body.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    #[derive(Debug)]
    pub enum CompressionBody<B> {
        /// The original body, forwarded unchanged.
        Passthrough {
            #[pin]
            inner: B,
        },
        /// A buffered replacement body.
        Replaced {
            data: Option<Bytes>,
            trailers: Option<HeaderMap>,
        },
        /// A body whose buffering failed.
        Failed {
            error: Option<BoxError>,
        },
    }
}

impl<B> CompressionBody<B> {
    /// Forwards the original body unchanged.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    /// Replaces the body with buffered bytes, optionally followed by the
    /// trailers the original body carried.
    pub fn replaced(data: Bytes, trailers: Option<HeaderMap>) -> Self {
        Self::Replaced {
            data: (!data.is_empty()).then_some(data),
            trailers: trailers.filter(|trailers| !trailers.is_empty()),
        }
    }

    /// A body that reproduces `error` on first poll and then ends.
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Failed {
            error: Some(error.into()),
        }
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => match inner.poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    let frame = frame.map_data(|mut data| data.copy_to_bytes(data.remaining()));
                    Poll::Ready(Some(Ok(frame)))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(io::Error::other(e.into())))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
            CompressionBodyProj::Replaced { data, trailers } => {
                if let Some(data) = data.take() {
                    return Poll::Ready(Some(Ok(Frame::data(data))));
                }
                if let Some(trailers) = trailers.take() {
                    return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
                }
                Poll::Ready(None)
            }
            CompressionBodyProj::Failed { error } => match error.take() {
                Some(error) => Poll::Ready(Some(Err(io::Error::other(error)))),
                None => Poll::Ready(None),
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Replaced { data, trailers } => data.is_none() && trailers.is_none(),
            CompressionBody::Failed { error } => error.is_none(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            CompressionBody::Replaced { data, .. } => {
                SizeHint::with_exact(data.as_ref().map_or(0, Bytes::len) as u64)
            }
            CompressionBody::Failed { .. } => SizeHint::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// A test body that yields predefined frames.
    struct TestBody {
        frames: VecDeque<Frame<Bytes>>,
    }

    impl TestBody {
        fn new(frames: Vec<Frame<Bytes>>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl Body for TestBody {
        type Data = Bytes;
        type Error = std::convert::Infallible;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            match self.frames.pop_front() {
                Some(frame) => Poll::Ready(Some(Ok(frame))),
                None => Poll::Ready(None),
            }
        }
    }

    /// A test body that fails on first poll.
    struct BrokenBody;

    impl Body for BrokenBody {
        type Data = Bytes;
        type Error = BoxError;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            Poll::Ready(Some(Err("stream reset".into())))
        }
    }

    fn poll_body<B: Body + Unpin>(body: &mut B) -> Option<Result<Frame<B::Data>, B::Error>> {
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        match Pin::new(body).poll_frame(&mut cx) {
            Poll::Ready(result) => result,
            Poll::Pending => None,
        }
    }

    #[test]
    fn test_passthrough_data() {
        let inner = TestBody::new(vec![Frame::data(Bytes::from("hello world"))]);
        let mut body = CompressionBody::passthrough(inner);

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from("hello world"));

        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn test_passthrough_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());

        let inner = TestBody::new(vec![
            Frame::data(Bytes::from("data")),
            Frame::trailers(trailers),
        ]);
        let mut body = CompressionBody::passthrough(inner);

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert!(frame.is_data());

        let frame = poll_body(&mut body).unwrap().unwrap();
        let trailers = frame.into_trailers().unwrap();
        assert_eq!(trailers.get("x-checksum").unwrap(), "abc123");

        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn test_passthrough_converts_errors() {
        let mut body = CompressionBody::passthrough(BrokenBody);

        let fault = poll_body(&mut body).unwrap().unwrap_err();
        assert_eq!(fault.to_string(), "stream reset");
    }

    #[test]
    fn test_replaced_yields_data_then_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc123".parse().unwrap());

        let mut body: CompressionBody<TestBody> =
            CompressionBody::replaced(Bytes::from("rewritten"), Some(trailers));
        assert_eq!(body.size_hint().exact(), Some(9));
        assert!(!body.is_end_stream());

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from("rewritten"));

        let frame = poll_body(&mut body).unwrap().unwrap();
        assert!(frame.is_trailers());

        assert!(poll_body(&mut body).is_none());
        assert!(body.is_end_stream());
    }

    #[test]
    fn test_replaced_empty_body_ends_immediately() {
        let mut body: CompressionBody<TestBody> = CompressionBody::replaced(Bytes::new(), None);

        assert!(body.is_end_stream());
        assert_eq!(body.size_hint().exact(), Some(0));
        assert!(poll_body(&mut body).is_none());
    }

    #[test]
    fn test_failed_yields_error_once() {
        let mut body: CompressionBody<TestBody> = CompressionBody::failed("buffering interrupted");
        assert!(!body.is_end_stream());

        let fault = poll_body(&mut body).unwrap().unwrap_err();
        assert_eq!(fault.to_string(), "buffering interrupted");

        assert!(poll_body(&mut body).is_none());
        assert!(body.is_end_stream());
    }
}
