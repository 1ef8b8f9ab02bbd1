//! Outbound connections a record is dispatched over.
//!
//! A [`Connection`] is one prepared HTTP exchange: headers are set first, the
//! body is sent once, then the response body is read and the connection is
//! released. Implementations:
//!
//! - [`HttpConnection`]: blocking `reqwest` client (feature `http`)
//! - [`InMemoryConnection`]: scripted double for tests and local pipelines

#[cfg(feature = "http")]
pub mod http;

mod inmemory;

use std::io::{self, Read};

#[cfg(feature = "http")]
pub use http::HttpConnection;
pub use inmemory::InMemoryConnection;

/// A single outbound request/response exchange.
///
/// The dispatcher borrows a connection for exactly one cycle:
/// [`set_header`](Connection::set_header) any number of times,
/// [`send_body`](Connection::send_body) once, [`response_body`](Connection::response_body)
/// once, then [`disconnect`](Connection::disconnect).
pub trait Connection {
    /// Target URL, for logging.
    fn url(&self) -> &str;

    /// Set a request header, replacing any value previously set under the
    /// same name. Names compare case-insensitively.
    fn set_header(&mut self, name: &str, value: &str);

    /// Write, flush and close the request body.
    ///
    /// Any failure here means the request did not reach the endpoint.
    fn send_body(&mut self, body: &[u8]) -> io::Result<()>;

    /// Open the response body for reading.
    fn response_body(&mut self) -> io::Result<Box<dyn Read + '_>>;

    /// Release the underlying connection. Must be safe to call more than once.
    fn disconnect(&mut self);
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn url(&self) -> &str {
        (**self).url()
    }

    fn set_header(&mut self, name: &str, value: &str) {
        (**self).set_header(name, value)
    }

    fn send_body(&mut self, body: &[u8]) -> io::Result<()> {
        (**self).send_body(body)
    }

    fn response_body(&mut self) -> io::Result<Box<dyn Read + '_>> {
        (**self).response_body()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}
