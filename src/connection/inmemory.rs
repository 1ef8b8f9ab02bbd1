use std::io::{self, Read};

use crate::connection::Connection;

/// In-memory connection for tests or local pipelines.
///
/// Records every header and the request body, and answers with a scripted
/// response body. It is useful for:
/// - Unit testing dispatch logic without a server
/// - Simulating a broken request sink
/// - Checking that connections are released
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnection {
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    response: Vec<u8>,
    broken_sink: bool,
    response_reads: usize,
    disconnects: usize,
}

impl InMemoryConnection {
    /// Create a connection pretending to target `url`, answering with an
    /// empty body.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the response body returned after the request is sent.
    pub fn with_response(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.response = body.into();
        self
    }

    /// Make every body write fail with a broken pipe.
    pub fn with_broken_sink(mut self) -> Self {
        self.broken_sink = true;
        self
    }

    /// Value of the header `name`, if set.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers in the order they were first set.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The request body, once sent.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// How many times the response body was opened.
    pub fn response_reads(&self) -> usize {
        self.response_reads
    }

    /// Whether [`Connection::disconnect`] was called at least once.
    pub fn is_disconnected(&self) -> bool {
        self.disconnects > 0
    }

    /// How many times [`Connection::disconnect`] was called.
    pub fn disconnects(&self) -> usize {
        self.disconnects
    }
}

impl Connection for InMemoryConnection {
    fn url(&self) -> &str {
        &self.url
    }

    fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value.to_owned(),
            None => self.headers.push((name.to_owned(), value.to_owned())),
        }
    }

    fn send_body(&mut self, body: &[u8]) -> io::Result<()> {
        if self.broken_sink {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "in-memory sink is broken",
            ));
        }
        self.body = Some(body.to_vec());
        Ok(())
    }

    fn response_body(&mut self) -> io::Result<Box<dyn Read + '_>> {
        self.response_reads += 1;
        if self.body.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "request body was never sent",
            ));
        }
        Ok(Box::new(self.response.as_slice()))
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}
