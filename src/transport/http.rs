use std::{io, marker::PhantomData, time::Duration};

use async_trait::async_trait;
use reqwest::blocking::Client;

use crate::{
    DispatchError, Envelope, RecordMetadata, RequestDispatcher, SourceRecord,
    connection::HttpConnection,
    headers::HeaderTemplate,
    transport::{Sender, ToBytes},
};

/// HTTP transport sender.
///
/// POSTs each envelope's payload to a fixed URL through a
/// [`RequestDispatcher`], with the configured header template plus the
/// correlation id and topic headers derived from the envelope.
///
/// Each delivery opens its own connection on tokio's blocking pool, so the
/// sender can be driven from async code.
///
/// ## Type Parameters
///
/// - `M`: message payload type (phantom, inferred from `Sender`)
pub struct Http<M> {
    /// Endpoint receiving the records
    url: String,
    /// Headers applied to every request
    headers: HeaderTemplate,
    /// Whole-request timeout, if any
    timeout: Option<Duration>,
    _msg: PhantomData<fn() -> M>,
}

impl<M> Http<M> {
    /// Create a sender posting to `url` with no extra headers and no timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HeaderTemplate::default(),
            timeout: None,
            _msg: PhantomData,
        }
    }

    /// Set the header template applied to every request.
    pub fn with_header_template(
        mut self,
        template: impl Into<String>,
        separator: impl Into<String>,
    ) -> Self {
        self.headers = HeaderTemplate::new(template, separator);
        self
    }

    /// Bound the duration of a whole request, from connect to end of body.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn client(&self) -> reqwest::Result<Client> {
        let mut builder = Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }

    /// Blocking delivery of one record.
    fn dispatch(&self, record: SourceRecord, payload: Vec<u8>) -> Result<(), tower::BoxError> {
        let payload = String::from_utf8(payload).map_err(|e| {
            DispatchError::transmission(record.clone(), io::Error::new(io::ErrorKind::InvalidData, e))
        })?;

        let client = self
            .client()
            .map_err(|e| DispatchError::transmission(record.clone(), io::Error::other(e)))?;
        let connection = HttpConnection::post(client, self.url.clone());
        RequestDispatcher::new(connection, record)
            .apply_headers(self.headers.template(), self.headers.separator())
            .send_payload(&payload)?;
        Ok(())
    }
}

impl<M> Clone for Http<M> {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            headers: self.headers.clone(),
            timeout: self.timeout,
            _msg: PhantomData,
        }
    }
}

#[async_trait]
impl<H, M> Sender<H, M> for Http<M>
where
    H: RecordMetadata + Send + 'static,
    M: ToBytes + Send + 'static,
{
    type Error = tower::BoxError;

    /// Deliver an envelope.
    ///
    /// Fails with a [`DispatchError`] when the endpoint was not reached or
    /// did not accept the record; payloads that are not UTF-8 are rejected as
    /// transmission errors before any request is made.
    #[tracing::instrument(
        skip_all,
        fields(topic = envelope.headers.topic(), offset = envelope.headers.offset())
    )]
    async fn send(&mut self, envelope: Envelope<H, M>) -> Result<(), Self::Error> {
        let record = envelope.record();
        let payload = envelope.message.to_bytes().to_vec();
        let sender = self.clone();

        tokio::task::spawn_blocking(move || sender.dispatch(record, payload)).await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    use super::*;
    use crate::{
        DispatchErrorKind, RetryCause,
        transport::{Transport, layers::JsonLayer},
    };

    #[derive(Serialize)]
    struct Order {
        id: u32,
    }

    fn envelope() -> Envelope<SourceRecord, Order> {
        Envelope {
            headers: SourceRecord::new("orders", 42),
            message: Order { id: 1 },
        }
    }

    async fn endpoint(status: u16, body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn delivers_json_with_record_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .and(header("x-api-correlation-id", "orders-42"))
            .and(header("x-kafka-topic", "orders"))
            .and(header("x-tenant", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"retry":false}"#))
            .expect(1)
            .mount(&server)
            .await;

        let http = Http::new(format!("{}/ingest", server.uri()))
            .with_header_template("X-Tenant:acme|X-Kafka-Topic:spoofed", "|")
            .with_timeout(Duration::from_secs(5));
        let mut transport = Transport::new(http).layer(JsonLayer);

        transport.send(envelope()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].body, br#"{"id":1}"#.to_vec());
    }

    #[tokio::test]
    async fn retry_reply_is_retryable() {
        let server = endpoint(200, r#"{"retry":true}"#).await;
        let mut transport =
            Transport::new(Http::new(format!("{}/ingest", server.uri()))).layer(JsonLayer);

        let err = transport.send(envelope()).await.unwrap_err();

        assert!(err.is_retryable());
        let dispatch = err.dispatch_error().unwrap();
        assert_eq!(dispatch.record(), &SourceRecord::new("orders", 42));
        assert!(matches!(
            dispatch.kind(),
            DispatchErrorKind::RetryableDelivery(RetryCause::Requested)
        ));
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let server = endpoint(500, "oops").await;
        let mut transport =
            Transport::new(Http::new(format!("{}/ingest", server.uri()))).layer(JsonLayer);

        let err = transport.send(envelope()).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(matches!(
            err.dispatch_error().unwrap().kind(),
            DispatchErrorKind::RetryableDelivery(RetryCause::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn reply_timeout_after_delivery_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"retry":false}"#)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let http = Http::new(format!("{}/ingest", server.uri()))
            .with_timeout(Duration::from_millis(500));
        let mut transport = Transport::new(http).layer(JsonLayer);

        let err = transport.send(envelope()).await.unwrap_err();

        assert!(err.is_retryable());
        let dispatch = err.dispatch_error().unwrap();
        assert_eq!(dispatch.record(), &SourceRecord::new("orders", 42));
        assert!(matches!(
            dispatch.kind(),
            DispatchErrorKind::RetryableDelivery(RetryCause::InvalidResponse(_))
        ));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transmission_error() {
        let mut transport =
            Transport::new(Http::new("http://127.0.0.1:1/ingest")).layer(JsonLayer);

        let err = transport.send(envelope()).await.unwrap_err();

        assert!(!err.is_retryable());
        assert!(matches!(
            err.dispatch_error().unwrap().kind(),
            DispatchErrorKind::Transmission(_)
        ));
    }

    #[tokio::test]
    async fn non_utf8_payload_is_not_sent() {
        let server = endpoint(200, r#"{"retry":false}"#).await;
        let mut transport = Transport::new(Http::new(format!("{}/ingest", server.uri())));

        let err = transport
            .send(Envelope {
                headers: SourceRecord::new("orders", 43),
                message: vec![0xffu8, 0xfe],
            })
            .await
            .unwrap_err();

        let dispatch = err.dispatch_error().unwrap();
        assert!(matches!(dispatch.kind(), DispatchErrorKind::Transmission(_)));
        assert_eq!(dispatch.record().offset(), 43);
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
