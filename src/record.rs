//! Source records pulled from the upstream log.

use serde::{Deserialize, Serialize};

/// One message position in an upstream Kafka topic.
///
/// Records are created by the consuming side of the connector and are
/// read-only here. The offset is only used to derive the correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRecord {
    topic: String,
    offset: i64,
}

impl SourceRecord {
    /// Create a record for the given topic and offset.
    pub fn new(topic: impl Into<String>, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            offset,
        }
    }

    /// Topic the record was read from.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Position of the record within its topic.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Correlation id sent along with the request, `{topic}-{offset}`.
    pub fn correlation_id(&self) -> String {
        format!("{}-{}", self.topic, self.offset)
    }
}

/// Provides the topic and offset of a record to be dispatched.
///
/// Implemented by envelope headers so that any header type carrying the
/// upstream position can be delivered over HTTP.
pub trait RecordMetadata {
    /// Return the Kafka topic name.
    fn topic(&self) -> &str;

    /// Return the offset within the topic.
    fn offset(&self) -> i64;

    /// Copy the metadata into an owned [`SourceRecord`].
    fn to_source_record(&self) -> SourceRecord {
        SourceRecord::new(self.topic(), self.offset())
    }
}

impl RecordMetadata for SourceRecord {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn offset(&self) -> i64 {
        self.offset
    }

    fn to_source_record(&self) -> SourceRecord {
        self.clone()
    }
}

impl<T: RecordMetadata> RecordMetadata for &T {
    fn topic(&self) -> &str {
        (*self).topic()
    }

    fn offset(&self) -> i64 {
        (*self).offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_joins_topic_and_offset() {
        let record = SourceRecord::new("orders", 42);
        assert_eq!(record.correlation_id(), "orders-42");
    }

    #[test]
    fn correlation_id_keeps_dashes_in_topic() {
        let record = SourceRecord::new("billing-events", 0);
        assert_eq!(record.correlation_id(), "billing-events-0");
    }
}
