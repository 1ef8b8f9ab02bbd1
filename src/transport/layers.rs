//! Tower layers applied in front of a [`Sender`](crate::transport::Sender).

mod json;
pub use json::{JsonLayer, JsonService};
