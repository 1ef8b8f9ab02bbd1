//! Classification of the endpoint's reply.
//!
//! The endpoint answers every delivery with a JSON object carrying a `retry`
//! flag. No other field is interpreted.

use serde_json::{Map, Value};
use tracing_error::SpanTrace;

/// Name of the reply field holding the retry flag.
pub const RETRY_FIELD: &str = "retry";

/// What the endpoint decided about a delivered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDecision {
    /// `retry: false`, the record was processed.
    Accepted,
    /// `retry: true`, the endpoint wants the record redelivered.
    RetryRequested,
}

impl ResponseDecision {
    /// Decode a reply body.
    ///
    /// The body must be a JSON object. `retry` may be a JSON boolean or one of
    /// the strings `"true"`/`"false"`, compared case-insensitively.
    pub fn from_body(body: &str) -> Result<Self, ResponseError> {
        let reply: Map<String, Value> = serde_json::from_str(body)?;

        let retry = match reply.get(RETRY_FIELD) {
            None => return Err(ResponseError::missing_retry()),
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(flag)) if flag.eq_ignore_ascii_case("true") => true,
            Some(Value::String(flag)) if flag.eq_ignore_ascii_case("false") => false,
            Some(other) => return Err(ResponseError::invalid_retry(other.clone())),
        };

        Ok(Self::from_retry_flag(retry))
    }

    fn from_retry_flag(retry: bool) -> Self {
        if retry {
            Self::RetryRequested
        } else {
            Self::Accepted
        }
    }

    /// Whether the endpoint asked for redelivery.
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::RetryRequested)
    }
}

/// Error returned when a reply cannot be read or understood.
#[derive(Debug)]
pub struct ResponseError {
    context: SpanTrace,
    kind: ResponseErrorKind,
}

/// Reasons a reply is rejected.
#[derive(Debug)]
pub enum ResponseErrorKind {
    /// The body could not be read from the connection.
    Read(std::io::Error),
    /// The body is not a JSON object.
    Malformed(serde_json::Error),
    /// The object has no `retry` field.
    MissingRetry,
    /// `retry` holds something other than a boolean.
    InvalidRetry(Value),
}

impl ResponseError {
    pub(crate) fn read(err: std::io::Error) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ResponseErrorKind::Read(err),
        }
    }

    fn missing_retry() -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ResponseErrorKind::MissingRetry,
        }
    }

    fn invalid_retry(value: Value) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ResponseErrorKind::InvalidRetry(value),
        }
    }

    /// The reason the reply was rejected.
    pub fn kind(&self) -> &ResponseErrorKind {
        &self.kind
    }
}

impl From<serde_json::Error> for ResponseError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ResponseErrorKind::Malformed(err),
        }
    }
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ResponseErrorKind::Read(err) => writeln!(f, "Failed to read response: {err}"),
            ResponseErrorKind::Malformed(err) => writeln!(f, "Malformed response: {err}"),
            ResponseErrorKind::MissingRetry => {
                writeln!(f, "Response has no `{RETRY_FIELD}` field")
            }
            ResponseErrorKind::InvalidRetry(value) => {
                writeln!(f, "Response `{RETRY_FIELD}` is not a boolean: {value}")
            }
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for ResponseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ResponseErrorKind::Read(err) => Some(err),
            ResponseErrorKind::Malformed(err) => Some(err),
            ResponseErrorKind::MissingRetry | ResponseErrorKind::InvalidRetry(_) => None,
        }
    }
}
