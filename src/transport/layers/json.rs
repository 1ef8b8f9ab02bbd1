use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::{Layer, Service};

use crate::{
    Envelope,
    transport::{RawPayload, TransportError},
};

/// Tower `Service` that encodes messages as JSON request bodies.
///
/// Any `serde::Serialize` message is turned into a [`RawPayload`] before the
/// inner service sees it; record metadata is passed through untouched.
/// Serialization failures surface as [`TransportErrorKind::Serde`](crate::transport::TransportErrorKind::Serde).
#[derive(Clone)]
pub struct JsonService<T> {
    inner: T,
}

impl<T, H, M> Service<Envelope<H, M>> for JsonService<T>
where
    H: Send + 'static,
    M: serde::Serialize + Send + 'static,
    T: Service<Envelope<H, RawPayload>> + Clone + Send + 'static,
    T::Error: Into<tower::BoxError>,
    T::Future: Send + 'static,
{
    type Response = T::Response;
    type Error = tower::BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Envelope<H, M>) -> Self::Future {
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let body = serde_json::to_vec(&req.message)
                .map_err(|e| TransportError::serde(Box::new(e)))?;
            let envelope = req.map_message(|_| RawPayload(body));

            inner.call(envelope).await.map_err(Into::<tower::BoxError>::into)
        })
    }
}

/// Tower `Layer` applying [`JsonService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLayer;

impl<S> Layer<S> for JsonLayer {
    type Service = JsonService<S>;

    fn layer(&self, service: S) -> Self::Service {
        JsonService { inner: service }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::{Arc, Mutex},
    };

    use serde::Serialize;

    use super::*;
    use crate::{
        SourceRecord,
        transport::{Sender, Transport, TransportErrorKind},
    };

    #[derive(Clone, Default)]
    struct Collect {
        bodies: Arc<Mutex<Vec<(SourceRecord, Vec<u8>)>>>,
    }

    #[async_trait::async_trait]
    impl Sender<SourceRecord, RawPayload> for Collect {
        type Error = std::io::Error;

        async fn send(
            &mut self,
            envelope: Envelope<SourceRecord, RawPayload>,
        ) -> Result<(), Self::Error> {
            self.bodies
                .lock()
                .unwrap()
                .push((envelope.headers, envelope.message.0));
            Ok(())
        }
    }

    #[derive(Serialize)]
    struct Order {
        id: u32,
        item: &'static str,
    }

    #[tokio::test]
    async fn message_is_encoded_as_json() {
        let sender = Collect::default();
        let mut transport = Transport::new(sender.clone()).layer(JsonLayer);

        transport
            .send(Envelope {
                headers: SourceRecord::new("orders", 7),
                message: Order { id: 1, item: "tea" },
            })
            .await
            .unwrap();

        let bodies = sender.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].0, SourceRecord::new("orders", 7));
        assert_eq!(bodies[0].1, br#"{"id":1,"item":"tea"}"#.to_vec());
    }

    #[tokio::test]
    async fn unserializable_message_is_a_serde_error() {
        let sender = Collect::default();
        let mut transport = Transport::new(sender.clone()).layer(JsonLayer);

        let mut message = BTreeMap::new();
        message.insert(vec![1u8], 1u8);

        let err = transport
            .send(Envelope {
                headers: SourceRecord::new("orders", 8),
                message,
            })
            .await
            .unwrap_err();

        assert!(matches!(err.kind(), TransportErrorKind::Serde(_)));
        assert!(!err.is_retryable());
        assert!(sender.bodies.lock().unwrap().is_empty());
    }
}
