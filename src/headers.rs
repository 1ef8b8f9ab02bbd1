//! Request header names and header template parsing.
//!
//! A header template is a single string holding `key:value` entries joined by
//! a caller-chosen separator, e.g. `Content-Type:application/json|Accept:*/*`
//! with `|` as separator. Entries without a colon are not headers and are
//! skipped.

/// Header carrying the `{topic}-{offset}` correlation id of the record.
pub const CORRELATION_ID_HEADER: &str = "X-API-Correlation-Id";

/// Header carrying the Kafka topic the record was read from.
pub const KAFKA_TOPIC_HEADER: &str = "X-Kafka-Topic";

/// An owned header template together with its entry separator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderTemplate {
    template: String,
    separator: String,
}

impl HeaderTemplate {
    /// Create a template from its raw text and separator.
    pub fn new(template: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            separator: separator.into(),
        }
    }

    /// Raw template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Separator between entries.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Iterate over the `(name, value)` pairs of the template.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        parse_entries(&self.template, &self.separator)
    }
}

/// Split `template` on `separator` and yield one `(name, value)` pair per
/// entry containing a colon.
///
/// The separator is matched literally. An empty separator makes the whole
/// template a single entry.
///
/// The name is the text before the first colon. The value is the text between
/// the first and the second colon, so `Link:http://host` yields
/// `("Link", "http")`; values cannot contain a colon.
pub fn parse_entries<'a>(
    template: &'a str,
    separator: &'a str,
) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    let entries: Box<dyn Iterator<Item = &'a str> + 'a> = if separator.is_empty() {
        Box::new(std::iter::once(template))
    } else {
        Box::new(template.split(separator))
    };

    entries.filter_map(|entry| {
        let (name, rest) = entry.split_once(':')?;
        let value = rest.split_once(':').map_or(rest, |(value, _)| value);
        Some((name, value))
    })
}
