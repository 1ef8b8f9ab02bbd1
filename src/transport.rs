//! Tower-compatible delivery of envelopes to HTTP endpoints.
//!
//! The synchronous [`RequestDispatcher`](crate::RequestDispatcher) handles a
//! single record. This module lifts it into an async `tower::Service` so that
//! records can be pushed through middleware (serialization, timeouts, rate
//! limits, retries) before reaching the endpoint.
//!
//! ## Key components
//!
//! - [`Transport`]: public-facing wrapper implementing `tower::Service`
//! - [`SenderService`]: adapter from a [`Sender`] to a Tower service
//! - [`Sender`]: trait implemented by delivery backends such as [`http::Http`]
//! - [`TransportError`]: unified error type exposing the [`DispatchError`] of
//!   a failed delivery

#[cfg(feature = "http")]
pub mod http;

pub mod layers;

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;
use tracing_error::SpanTrace;

use crate::{DispatchError, Envelope};

#[cfg(feature = "http")]
pub use http::Http;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Generic Tower-compatible transport wrapper.
///
/// Wraps a service stack ending in a [`Sender`] and normalizes its errors into
/// [`TransportError`]. Layers are stacked with [`layer`](Transport::layer):
///
/// ```rust,no_run
/// use kafka_http_sink::transport::{Http, RawPayload, Transport, layers::JsonLayer};
///
/// let transport = Transport::new(Http::<RawPayload>::new("http://localhost:8080/ingest"))
///     .layer(JsonLayer);
/// ```
#[derive(Clone)]
pub struct Transport<S> {
    service: S,
}

impl<D> Transport<SenderService<D>> {
    /// Build a transport on top of a delivery backend.
    pub fn new(sender: D) -> Self {
        Self {
            service: SenderService::new(sender),
        }
    }
}

impl<S> Transport<S> {
    /// Wrap the current service stack in a Tower layer.
    pub fn layer<L>(self, layer: L) -> Transport<L::Service>
    where
        L: tower::Layer<S>,
    {
        Transport {
            service: layer.layer(self.service),
        }
    }

    /// Deliver one envelope without going through the `tower::Service` API.
    pub async fn send<H, M>(&mut self, envelope: Envelope<H, M>) -> Result<(), TransportError>
    where
        S: Service<Envelope<H, M>> + Clone + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<tower::BoxError>,
    {
        let mut service = self.service.clone();
        service
            .call(envelope)
            .await
            .map_err(|e| TransportError::from_boxed(e.into()))?;
        Ok(())
    }
}

impl<R, S> Service<R> for Transport<S>
where
    S: Service<R> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<tower::BoxError>,
    R: Send + 'static,
{
    type Response = ();
    type Error = TransportError;
    type Future = BoxFuture<Result<(), TransportError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service
            .poll_ready(cx)
            .map_err(|e| TransportError::from_boxed(e.into()))
    }

    fn call(&mut self, req: R) -> Self::Future {
        let mut service = self.service.clone();
        Box::pin(async move {
            service
                .call(req)
                .await
                .map(|_| ())
                .map_err(|e| TransportError::from_boxed(e.into()))
        })
    }
}

/// Error returned by transport operations.
///
/// Each error captures the underlying failure and a tracing span backtrace.
#[derive(Debug)]
pub struct TransportError {
    context: SpanTrace,
    kind: TransportErrorKind,
}

/// Transport error kinds.
#[derive(Debug)]
pub enum TransportErrorKind {
    /// The backend failed to deliver the envelope.
    Delivery(tower::BoxError),
    /// The message could not be serialized.
    Serde(tower::BoxError),
}

impl TransportError {
    /// Create a delivery-related transport error.
    pub fn delivery(err: tower::BoxError) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: TransportErrorKind::Delivery(err),
        }
    }

    /// Create a serialization-related transport error.
    pub fn serde(err: tower::BoxError) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: TransportErrorKind::Serde(err),
        }
    }

    /// Recover a transport error passed through the service stack, or treat
    /// any other error as a delivery failure.
    pub fn from_boxed(err: tower::BoxError) -> Self {
        match err.downcast::<TransportError>() {
            Ok(err) => *err,
            Err(err) => Self::delivery(err),
        }
    }

    pub fn kind(&self) -> &TransportErrorKind {
        &self.kind
    }

    /// The dispatch failure behind this error, if the endpoint was reached.
    pub fn dispatch_error(&self) -> Option<&DispatchError> {
        match &self.kind {
            TransportErrorKind::Delivery(err) => err.downcast_ref::<DispatchError>(),
            TransportErrorKind::Serde(_) => None,
        }
    }

    /// Whether the envelope should be delivered again.
    pub fn is_retryable(&self) -> bool {
        self.dispatch_error()
            .is_some_and(DispatchError::is_retryable)
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            TransportErrorKind::Delivery(err) => writeln!(f, "Delivery error: {err}"),
            TransportErrorKind::Serde(err) => writeln!(f, "Serde error: {err}"),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            TransportErrorKind::Delivery(err) | TransportErrorKind::Serde(err) => {
                Some(err.as_ref())
            }
        }
    }
}

/// Tower service adapter for a [`Sender`] backend.
#[derive(Clone)]
pub struct SenderService<D> {
    sender: D,
}

impl<D> SenderService<D> {
    pub fn new(sender: D) -> Self {
        Self { sender }
    }
}

impl<H, M, D> Service<Envelope<H, M>> for SenderService<D>
where
    H: Send + 'static,
    M: Send + 'static,
    D: Sender<H, M> + Clone + Send + 'static,
{
    type Response = ();
    type Error = tower::BoxError;
    type Future = BoxFuture<Result<(), tower::BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Envelope<H, M>) -> Self::Future {
        let mut sender = self.sender.clone();
        Box::pin(async move { sender.send(req).await.map_err(Into::<tower::BoxError>::into) })
    }
}

/// Trait implemented by delivery backends.
///
/// A sender turns one [`Envelope`] into one request against an external
/// endpoint and reports whether it was accepted.
#[async_trait::async_trait]
pub trait Sender<H, M> {
    /// Backend-specific error type.
    type Error: Into<tower::BoxError>;

    /// Deliver an envelope.
    async fn send(&mut self, envelope: Envelope<H, M>) -> Result<(), Self::Error>;
}

/// Already encoded payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload(pub(crate) Vec<u8>);

impl From<Vec<u8>> for RawPayload {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<String> for RawPayload {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

/// Values that can be viewed as payload bytes.
pub trait ToBytes {
    fn to_bytes(&self) -> &[u8];
}

impl ToBytes for [u8] {
    fn to_bytes(&self) -> &[u8] {
        self
    }
}

impl ToBytes for str {
    fn to_bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl ToBytes for Vec<u8> {
    fn to_bytes(&self) -> &[u8] {
        self
    }
}

impl ToBytes for String {
    fn to_bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl ToBytes for RawPayload {
    fn to_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl<T: ToBytes + ?Sized> ToBytes for &T {
    fn to_bytes(&self) -> &[u8] {
        (**self).to_bytes()
    }
}
