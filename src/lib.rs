#![doc = include_str!("../README.md")]

pub mod connection;
pub mod dispatcher;
pub mod envelope;
pub mod headers;
pub mod record;
pub mod response;
pub mod transport;

#[doc(inline)]
pub use connection::{Connection, InMemoryConnection};

#[cfg(feature = "http")]
#[doc(inline)]
pub use connection::HttpConnection;

#[doc(inline)]
pub use dispatcher::{
    DefaultDispatchHook, DispatchError, DispatchErrorKind, DispatchHook, RequestDispatcher,
    RetryCause,
};

#[doc(inline)]
pub use envelope::Envelope;

#[doc(inline)]
pub use record::{RecordMetadata, SourceRecord};

#[doc(inline)]
pub use response::{ResponseDecision, ResponseError, ResponseErrorKind};

#[doc(inline)]
pub use transport::{Transport, TransportError, TransportErrorKind};
