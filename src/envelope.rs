use crate::{RecordMetadata, SourceRecord};

/// A record on its way to the HTTP endpoint.
///
/// `Envelope` pairs the upstream position of a message with its payload.
///
/// - `H` carries the record metadata (topic, offset, and whatever else the
///   caller tracks). The HTTP sender requires it to implement
///   [`RecordMetadata`](crate::RecordMetadata).
/// - `M` is the payload, either already encoded bytes or a serializable value
///   to be turned into JSON by [`JsonLayer`](crate::transport::layers::JsonLayer).
///
/// ## Example
///
/// ```rust
/// use kafka_http_sink::{Envelope, SourceRecord};
///
/// let envelope = Envelope {
///     headers: SourceRecord::new("orders", 42),
///     message: r#"{"id":7}"#,
/// };
///
/// // or, equivalently
/// let envelope: Envelope<_, _> = (SourceRecord::new("orders", 42), r#"{"id":7}"#).into();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<H, M> {
    /// Record metadata.
    pub headers: H,
    /// Message payload.
    pub message: M,
}

impl<H, M> Envelope<H, M> {
    /// Replace the payload, keeping the record metadata.
    pub fn map_message<N>(self, f: impl FnOnce(M) -> N) -> Envelope<H, N> {
        Envelope {
            headers: self.headers,
            message: f(self.message),
        }
    }
}

impl<H: RecordMetadata, M> Envelope<H, M> {
    /// Owned copy of the upstream position this envelope was read from.
    pub fn record(&self) -> SourceRecord {
        self.headers.to_source_record()
    }
}

impl<H, M> From<(H, M)> for Envelope<H, M> {
    fn from(value: (H, M)) -> Self {
        Envelope {
            headers: value.0,
            message: value.1,
        }
    }
}
