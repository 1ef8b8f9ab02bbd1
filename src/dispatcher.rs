//! Per-record request dispatch.
//!
//! A [`RequestDispatcher`] drives one request/response cycle for one
//! [`SourceRecord`] over a borrowed [`Connection`]:
//!
//! - Applies a header template plus the correlation and topic headers
//! - Writes the payload as UTF-8
//! - Reads the endpoint's reply and classifies it
//! - Releases the connection, whatever the outcome
//!
//! Dispatch is synchronous. Concurrency, if any, is up to the caller, with one
//! dispatcher per record.

use std::io::{BufRead as _, BufReader};

use tracing_error::SpanTrace;

use crate::{
    SourceRecord,
    connection::Connection,
    headers::{self, CORRELATION_ID_HEADER, KAFKA_TOPIC_HEADER},
    response::{ResponseDecision, ResponseError},
};

/// Dispatches one record over one connection.
///
/// Generic parameters:
/// - `C`: the connection, owned or borrowed (`&mut C` is a connection too)
/// - `HK`: hook observing the dispatch
///
/// The connection is disconnected when the dispatcher is dropped, so it is
/// released after success, after any error, and when the dispatcher is
/// discarded before sending.
pub struct RequestDispatcher<C, HK = DefaultDispatchHook>
where
    C: Connection,
    HK: DispatchHook,
{
    connection: C,
    record: SourceRecord,
    hook: HK,
}

impl<C> RequestDispatcher<C, DefaultDispatchHook>
where
    C: Connection,
{
    /// Create a dispatcher logging through [`DefaultDispatchHook`].
    pub fn new(connection: C, record: SourceRecord) -> Self {
        Self::with_hook(connection, record, DefaultDispatchHook)
    }
}

impl<C, HK> RequestDispatcher<C, HK>
where
    C: Connection,
    HK: DispatchHook,
{
    /// Create a dispatcher reporting to a custom hook.
    pub fn with_hook(connection: C, record: SourceRecord, hook: HK) -> Self {
        Self {
            connection,
            record,
            hook,
        }
    }

    /// The record being dispatched.
    pub fn record(&self) -> &SourceRecord {
        &self.record
    }

    /// Apply `template` entries as request headers, then the correlation id
    /// and topic headers.
    ///
    /// Entries without a colon are skipped; see [`headers::parse_entries`] for
    /// the entry format. Headers overwrite earlier values, so applying the
    /// same template twice leaves the same header set, and the correlation and
    /// topic headers always win over same-named template entries.
    pub fn apply_headers(mut self, template: &str, separator: &str) -> Self {
        self.hook.on_headers_processing(separator);

        for (name, value) in headers::parse_entries(template, separator) {
            self.set_header(name, value);
        }

        let correlation_id = self.record.correlation_id();
        self.set_header(CORRELATION_ID_HEADER, &correlation_id);
        let topic = self.record.topic().to_owned();
        self.set_header(KAFKA_TOPIC_HEADER, &topic);

        self
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.hook.on_header_set(name);
        self.connection.set_header(name, value);
    }

    /// Send `payload` and validate the reply.
    ///
    /// Fails with [`DispatchErrorKind::Transmission`] when the payload cannot
    /// be written; no reply is read in that case. Fails with
    /// [`DispatchErrorKind::RetryableDelivery`] when the endpoint answers
    /// `retry: true` or its reply cannot be understood.
    #[tracing::instrument(
        skip_all,
        fields(topic = %self.record.topic(), offset = self.record.offset())
    )]
    pub fn send_payload(mut self, payload: &str) -> Result<(), DispatchError> {
        if let Err(err) = self.connection.send_body(payload.as_bytes()) {
            self.hook.on_transmission_error(&err);
            return Err(DispatchError::transmission(self.record.clone(), err));
        }
        self.hook.on_payload_submitted(self.connection.url(), payload);

        self.validate_response()
    }

    fn validate_response(&mut self) -> Result<(), DispatchError> {
        let decision = self
            .read_response()
            .and_then(|body| ResponseDecision::from_body(&body));

        match decision {
            Ok(ResponseDecision::Accepted) => Ok(()),
            Ok(ResponseDecision::RetryRequested) => {
                self.hook.on_retry_requested(&self.record);
                Err(DispatchError::retry_requested(self.record.clone()))
            }
            Err(err) => {
                self.hook.on_invalid_response(&err);
                Err(DispatchError::invalid_response(self.record.clone(), err))
            }
        }
    }

    /// Read the whole reply, concatenating its lines without separators.
    fn read_response(&mut self) -> Result<String, ResponseError> {
        let reader = self.connection.response_body().map_err(ResponseError::read)?;

        let mut body = String::new();
        for line in BufReader::new(reader).lines() {
            body.push_str(&line.map_err(ResponseError::read)?);
        }

        self.hook.on_response_received(&body);
        Ok(body)
    }
}

impl<C, HK> Drop for RequestDispatcher<C, HK>
where
    C: Connection,
    HK: DispatchHook,
{
    fn drop(&mut self) {
        self.connection.disconnect();
        self.hook.on_released(self.connection.url());
    }
}

/// Error returned when a record could not be delivered.
///
/// Carries the record so callers can correlate the failure with its topic and
/// offset.
#[derive(Debug)]
pub struct DispatchError {
    context: SpanTrace,
    record: SourceRecord,
    kind: DispatchErrorKind,
}

/// Classification of delivery failures.
#[derive(Debug)]
pub enum DispatchErrorKind {
    /// The payload could not be written to the connection.
    Transmission(std::io::Error),
    /// The record should be delivered again.
    RetryableDelivery(RetryCause),
}

/// Why a delivery is retryable.
///
/// Both causes surface as [`DispatchErrorKind::RetryableDelivery`]; the cause
/// is kept for diagnostics.
#[derive(Debug)]
pub enum RetryCause {
    /// The endpoint answered `retry: true`.
    Requested,
    /// The reply could not be read or understood.
    InvalidResponse(ResponseError),
}

impl DispatchError {
    pub(crate) fn transmission(record: SourceRecord, err: std::io::Error) -> Self {
        Self {
            context: SpanTrace::capture(),
            record,
            kind: DispatchErrorKind::Transmission(err),
        }
    }

    fn retry_requested(record: SourceRecord) -> Self {
        Self {
            context: SpanTrace::capture(),
            record,
            kind: DispatchErrorKind::RetryableDelivery(RetryCause::Requested),
        }
    }

    fn invalid_response(record: SourceRecord, err: ResponseError) -> Self {
        Self {
            context: SpanTrace::capture(),
            record,
            kind: DispatchErrorKind::RetryableDelivery(RetryCause::InvalidResponse(err)),
        }
    }

    /// The record whose delivery failed.
    pub fn record(&self) -> &SourceRecord {
        &self.record
    }

    /// The failure classification.
    pub fn kind(&self) -> &DispatchErrorKind {
        &self.kind
    }

    /// Whether the caller should deliver the record again.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DispatchErrorKind::RetryableDelivery(_))
    }
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topic = self.record.topic();
        let offset = self.record.offset();
        match &self.kind {
            DispatchErrorKind::Transmission(err) => {
                writeln!(f, "Request transmission error ({topic}@{offset}): {err}")
            }
            DispatchErrorKind::RetryableDelivery(RetryCause::Requested) => {
                writeln!(f, "Unable to process message ({topic}@{offset})")
            }
            DispatchErrorKind::RetryableDelivery(RetryCause::InvalidResponse(err)) => {
                writeln!(f, "Invalid response ({topic}@{offset}): {err}")
            }
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            DispatchErrorKind::Transmission(err) => Some(err),
            DispatchErrorKind::RetryableDelivery(RetryCause::InvalidResponse(err)) => Some(err),
            DispatchErrorKind::RetryableDelivery(RetryCause::Requested) => None,
        }
    }
}

/// Hook trait for observing a dispatch.
///
/// Hooks are invoked synchronously on the dispatching thread. Header values
/// are never passed to hooks since they may carry credentials. The payload
/// given to `on_payload_submitted` is the raw record content and may hold
/// sensitive data; implementations should not log it above `trace`.
pub trait DispatchHook: Send + Sync {
    fn on_headers_processing(&self, separator: &str);
    fn on_header_set(&self, name: &str);
    fn on_payload_submitted(&self, url: &str, payload: &str);
    fn on_transmission_error(&self, error: &std::io::Error);
    fn on_response_received(&self, body: &str);
    fn on_retry_requested(&self, record: &SourceRecord);
    fn on_invalid_response(&self, error: &ResponseError);
    fn on_released(&self, url: &str);
}

/// Default dispatch hook.
///
/// Logs dispatch events using `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDispatchHook;

impl DispatchHook for DefaultDispatchHook {
    fn on_headers_processing(&self, separator: &str) {
        tracing::info!(separator, "Processing headers");
    }

    fn on_header_set(&self, name: &str) {
        tracing::info!(header = name, "Setting header");
    }

    fn on_payload_submitted(&self, url: &str, payload: &str) {
        tracing::info!(url, bytes = payload.len(), "Submitted request");
        tracing::trace!(payload, "Request payload");
    }

    fn on_transmission_error(&self, error: &std::io::Error) {
        tracing::error!(%error, "Failed to send request");
    }

    fn on_response_received(&self, body: &str) {
        tracing::debug!(body, "Response received");
    }

    fn on_retry_requested(&self, record: &SourceRecord) {
        tracing::warn!(
            topic = record.topic(),
            offset = record.offset(),
            "Endpoint requested redelivery"
        );
    }

    fn on_invalid_response(&self, error: &ResponseError) {
        tracing::warn!(%error, "Unable to validate response");
    }

    fn on_released(&self, url: &str) {
        tracing::debug!(url, "Connection released");
    }
}
