use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_TYPE};
use http::{HeaderValue, Request, Response, StatusCode};
use http_body::Body;
use tower::{BoxError, Service, ServiceExt};
use tracing::{error, warn};

use crate::body::CompressionBody;
use crate::config::CompressionConfig;
use crate::content::MessageContent;
use crate::error::{CompressionError, MessageDirection};
use crate::future::ResponseFuture;
use crate::negotiate::parse_accept_encoding;
use crate::pipeline::{
    CompressionEnabled, buffer_body, compress_content, compression_enabled, decode_inbound,
    declared_length, headers_already_written, meets_threshold, select_outbound_codec,
    should_decode,
};

/// A [`Service`] for servers that decompresses request bodies and
/// compresses response bodies.
///
/// Request bodies whose `Content-Encoding` names a configured codec are
/// decoded before the wrapped service sees them; a body that cannot be
/// decoded fails that exchange with a `400` response. Response bodies are
/// compressed when the request's `Accept-Encoding` negotiates a codec and
/// the configured policy allows it.
#[derive(Debug, Clone)]
pub struct ServerCompressionService<S> {
    inner: S,
    config: Arc<CompressionConfig>,
}

impl<S> ServerCompressionService<S> {
    /// Creates a new service wrapping `inner`.
    pub fn new(inner: S, config: Arc<CompressionConfig>) -> Self {
        Self { inner, config }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ServerCompressionService<S>
where
    S: Service<Request<CompressionBody<ReqBody>>, Response = Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    ReqBody: Body + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: Into<BoxError>,
    ResBody: Body + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<CompressionBody<ResBody>>;
    type Error = BoxError;
    type Future = ResponseFuture<Response<CompressionBody<ResBody>>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let config = Arc::clone(&self.config);
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        ResponseFuture::new(async move {
            let (mut parts, body) = req.into_parts();
            let preferences = parse_accept_encoding(&parts.headers);
            let request_signal = parts.extensions.get::<CompressionEnabled>().copied();
            let enabled_by_default = config.enabled_for(&parts);

            let request = if should_decode(&config, &parts.headers) {
                let (data, trailers) = match buffer_body(body, MessageDirection::Request).await {
                    Ok(buffered) => buffered,
                    Err(fault) => return Ok(bad_request(&fault)),
                };
                let content = MessageContent::new(data, std::mem::take(&mut parts.headers));
                match decode_inbound(&config, content, MessageDirection::Request) {
                    Ok(decoded) => {
                        parts.headers = decoded.headers;
                        Request::from_parts(parts, CompressionBody::replaced(decoded.data, trailers))
                    }
                    Err(fault) => return Ok(bad_request(&fault)),
                }
            } else {
                Request::from_parts(parts, CompressionBody::passthrough(body))
            };

            let response = inner.oneshot(request).await.map_err(Into::into)?;
            let (mut parts, body) = response.into_parts();

            if headers_already_written(&parts.extensions) {
                return Ok(Response::from_parts(parts, CompressionBody::passthrough(body)));
            }

            let enabled = compression_enabled(&parts.extensions, request_signal, enabled_by_default);
            let declared = declared_length(&parts.headers, &body);
            let codec = select_outbound_codec(
                &config,
                &preferences,
                &parts.headers,
                declared,
                enabled,
                MessageDirection::Response,
            )
            .cloned();

            let Some(codec) = codec else {
                return Ok(Response::from_parts(parts, CompressionBody::passthrough(body)));
            };

            let (data, trailers) = match buffer_body(body, MessageDirection::Response).await {
                Ok(buffered) => buffered,
                Err(fault) => {
                    warn!(error = %fault, "response body failed while buffering, forwarding the fault");
                    return Ok(Response::from_parts(parts, CompressionBody::failed(fault)));
                }
            };

            if data.is_empty() || !meets_threshold(config.threshold(), Some(data.len() as u64)) {
                return Ok(Response::from_parts(
                    parts,
                    CompressionBody::replaced(data, trailers),
                ));
            }

            let content = MessageContent::new(data.clone(), parts.headers.clone());
            match compress_content(content, codec.as_ref(), MessageDirection::Response) {
                Ok(compressed) => {
                    parts.headers = compressed.headers;
                    Ok(Response::from_parts(
                        parts,
                        CompressionBody::replaced(compressed.data, trailers),
                    ))
                }
                Err(fault) => {
                    error!(error = %fault, "failed to compress response body, sending it uncompressed");
                    Ok(Response::from_parts(
                        parts,
                        CompressionBody::replaced(data, trailers),
                    ))
                }
            }
        })
    }
}

/// A [`Service`] for clients that compresses request bodies and
/// decompresses response bodies.
///
/// When the caller set no `Accept-Encoding`, the configured codec tokens
/// are advertised before the request leaves. Request bodies are compressed
/// under the same negotiation and threshold policy the server applies to
/// responses; failures fail the exchange. Response bodies carrying a
/// recognized `Content-Encoding` are decoded transparently.
#[derive(Debug, Clone)]
pub struct ClientCompressionService<S> {
    inner: S,
    config: Arc<CompressionConfig>,
}

impl<S> ClientCompressionService<S> {
    /// Creates a new service wrapping `inner`.
    pub fn new(inner: S, config: Arc<CompressionConfig>) -> Self {
        Self { inner, config }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ClientCompressionService<S>
where
    S: Service<Request<CompressionBody<ReqBody>>, Response = Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    ReqBody: Body + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: Into<BoxError>,
    ResBody: Body + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<CompressionBody<ResBody>>;
    type Error = BoxError;
    type Future = ResponseFuture<Response<CompressionBody<ResBody>>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let config = Arc::clone(&self.config);
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        ResponseFuture::new(async move {
            let (mut parts, body) = req.into_parts();

            if !parts.headers.contains_key(ACCEPT_ENCODING) {
                let advertised = config.advertised_encodings();
                if !advertised.is_empty() {
                    if let Ok(value) = HeaderValue::from_str(&advertised) {
                        parts.headers.insert(ACCEPT_ENCODING, value);
                    }
                }
            }

            let preferences = parse_accept_encoding(&parts.headers);
            let enabled = match parts.extensions.get::<CompressionEnabled>() {
                Some(signal) => signal.0,
                None => config.enabled_for(&parts),
            };

            let declared = declared_length(&parts.headers, &body);
            let codec = select_outbound_codec(
                &config,
                &preferences,
                &parts.headers,
                declared,
                enabled,
                MessageDirection::Request,
            )
            .cloned();

            let request = match codec {
                None => Request::from_parts(parts, CompressionBody::passthrough(body)),
                Some(codec) => {
                    let (data, trailers) = buffer_body(body, MessageDirection::Request).await?;
                    if data.is_empty()
                        || !meets_threshold(config.threshold(), Some(data.len() as u64))
                    {
                        Request::from_parts(parts, CompressionBody::replaced(data, trailers))
                    } else {
                        let content =
                            MessageContent::new(data, std::mem::take(&mut parts.headers));
                        let compressed =
                            compress_content(content, codec.as_ref(), MessageDirection::Request)?;
                        parts.headers = compressed.headers;
                        Request::from_parts(
                            parts,
                            CompressionBody::replaced(compressed.data, trailers),
                        )
                    }
                }
            };

            let response = inner.oneshot(request).await.map_err(Into::into)?;
            let (mut parts, body) = response.into_parts();

            if !should_decode(&config, &parts.headers) {
                return Ok(Response::from_parts(parts, CompressionBody::passthrough(body)));
            }

            let (data, trailers) = match buffer_body(body, MessageDirection::Response).await {
                Ok(buffered) => buffered,
                Err(fault) => {
                    warn!(error = %fault, "response body failed while buffering, forwarding the fault");
                    return Ok(Response::from_parts(parts, CompressionBody::failed(fault)));
                }
            };

            let content = MessageContent::new(data, std::mem::take(&mut parts.headers));
            let decoded = decode_inbound(&config, content, MessageDirection::Response)?;
            parts.headers = decoded.headers;
            Ok(Response::from_parts(
                parts,
                CompressionBody::replaced(decoded.data, trailers),
            ))
        })
    }
}

/// The response sent when an inbound request body cannot be decoded.
fn bad_request<B>(fault: &CompressionError) -> Response<CompressionBody<B>> {
    warn!(error = %fault, "rejecting request with undecodable body");
    let mut response = Response::new(CompressionBody::replaced(
        Bytes::from(fault.to_string()),
        None,
    ));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
