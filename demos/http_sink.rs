use std::time::Duration;

use kafka_http_sink::transport::{Http, Transport, layers::JsonLayer};
use kafka_http_sink::{Envelope, SourceRecord};
use serde::Serialize;
use tracing_error::ErrorLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Clone, Debug, Serialize)]
struct OrderPlaced {
    order_id: u32,
    item: String,
}

#[tokio::main]
async fn main() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::from_default_env())
        .with(ErrorLayer::default())
        .init();

    let url = std::env::var("SINK_URL").unwrap_or_else(|_| "http://localhost:8080/ingest".into());
    let headers = std::env::var("SINK_HEADERS")
        .unwrap_or_else(|_| "Content-Type:application/json|X-Source:demo".into());

    let http = Http::new(url)
        .with_header_template(headers, "|")
        .with_timeout(Duration::from_secs(10));
    let mut transport = Transport::new(http).layer(JsonLayer);

    for offset in 0..5 {
        let envelope = Envelope {
            headers: SourceRecord::new("orders", offset),
            message: OrderPlaced {
                order_id: offset as u32,
                item: "tea".to_owned(),
            },
        };

        match transport.send(envelope).await {
            Ok(()) => tracing::info!(offset, "Record delivered"),
            Err(err) if err.is_retryable() => {
                tracing::warn!(offset, %err, "Record needs redelivery")
            }
            Err(err) => {
                tracing::error!(offset, %err, "Record could not be sent");
                break;
            }
        }
    }
}
