use std::io::{self, Read};

use reqwest::{
    StatusCode,
    blocking::{Client, Response},
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};

use crate::connection::Connection;

/// HTTP connection backed by a blocking `reqwest` client.
///
/// Headers are collected until the body is sent; [`send_body`](Connection::send_body)
/// performs the whole POST, and the response is held until it is read or the
/// connection is released. Only failures before the request reaches the
/// endpoint (connect, request building) are reported by `send_body`; anything
/// after, such as a timeout waiting for the reply, surfaces from
/// [`response_body`](Connection::response_body). Timeouts, proxies and TLS
/// settings come from the [`Client`] the connection is built with.
///
/// Must not be used from inside an async executor thread; wrap calls in
/// `tokio::task::spawn_blocking` there.
pub struct HttpConnection {
    client: Client,
    url: String,
    headers: HeaderMap,
    response: Option<Response>,
    reply_error: Option<reqwest::Error>,
    status: Option<StatusCode>,
}

impl HttpConnection {
    /// Prepare a POST to `url`.
    pub fn post(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            headers: HeaderMap::new(),
            response: None,
            reply_error: None,
            status: None,
        }
    }

    /// Status of the response, once the body has been sent.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }
}

impl Connection for HttpConnection {
    fn url(&self) -> &str {
        &self.url
    }

    /// Names or values that are not valid in HTTP are skipped with a warning.
    fn set_header(&mut self, name: &str, value: &str) {
        let header_name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(header_name) => header_name,
            Err(error) => {
                tracing::warn!(header = name, %error, "Skipping invalid header name");
                return;
            }
        };
        let header_value = match HeaderValue::from_str(value) {
            Ok(header_value) => header_value,
            Err(error) => {
                tracing::warn!(header = name, %error, "Skipping invalid header value");
                return;
            }
        };
        self.headers.insert(header_name, header_value);
    }

    #[tracing::instrument(skip_all, fields(url = %self.url))]
    fn send_body(&mut self, body: &[u8]) -> io::Result<()> {
        let mut headers = self.headers.clone();
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));

        let sent = self
            .client
            .post(&self.url)
            .headers(headers)
            .body(body.to_vec())
            .send();

        match sent {
            Ok(response) => {
                self.status = Some(response.status());
                self.response = Some(response);
            }
            Err(err) if err.is_connect() || err.is_builder() => {
                return Err(io::Error::other(err));
            }
            Err(err) => self.reply_error = Some(err),
        }
        Ok(())
    }

    /// Error statuses (4xx, 5xx) and failures after the body went out are
    /// reported as read failures.
    fn response_body(&mut self) -> io::Result<Box<dyn Read + '_>> {
        if let Some(err) = self.reply_error.take() {
            return Err(io::Error::other(err));
        }

        let response = self.response.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "request body was never sent")
        })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(io::Error::other(format!(
                "{} answered with HTTP {status}",
                self.url
            )));
        }

        Ok(Box::new(response))
    }

    fn disconnect(&mut self) {
        self.response = None;
        self.reply_error = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    #[tokio::test]
    async fn posts_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .and(header("x-tenant", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"retry":false}"#))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/ingest", server.uri());
        let (status, body) = tokio::task::spawn_blocking(move || {
            let mut conn = HttpConnection::post(Client::new(), url);
            conn.set_header("X-Tenant", "acme");
            conn.send_body(br#"{"id":1}"#).unwrap();

            let mut body = String::new();
            conn.response_body()
                .unwrap()
                .read_to_string(&mut body)
                .unwrap();
            conn.disconnect();
            (conn.status(), body)
        })
        .await
        .unwrap();

        assert_eq!(status, Some(StatusCode::OK));
        assert_eq!(body, r#"{"retry":false}"#);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].body, br#"{"id":1}"#.to_vec());
        assert_eq!(
            requests[0]
                .headers
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn explicit_content_type_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "text/plain"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = server.uri();
        tokio::task::spawn_blocking(move || {
            let mut conn = HttpConnection::post(Client::new(), url);
            conn.set_header("Content-Type", "text/plain");
            conn.send_body(b"hello").unwrap();
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn error_status_fails_response_read() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string(r#"{"retry":false}"#))
            .mount(&server)
            .await;

        let url = server.uri();
        let err = tokio::task::spawn_blocking(move || {
            let mut conn = HttpConnection::post(Client::new(), url);
            conn.send_body(b"{}").unwrap();
            conn.response_body().err()
        })
        .await
        .unwrap();

        let err = err.expect("503 must not yield a readable body");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn reply_timeout_fails_response_read_not_send() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"retry":false}"#)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let url = server.uri();
        let (sent, read) = tokio::task::spawn_blocking(move || {
            let client = Client::builder()
                .timeout(Duration::from_millis(500))
                .build()
                .unwrap();
            let mut conn = HttpConnection::post(client, url);
            let sent = conn.send_body(b"{}");
            let read = conn.response_body().err();
            (sent, read)
        })
        .await
        .unwrap();

        assert!(sent.is_ok());
        assert!(read.is_some());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_header_name_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = server.uri();
        tokio::task::spawn_blocking(move || {
            let mut conn = HttpConnection::post(Client::new(), url);
            conn.set_header(" Bad Name", "x");
            conn.set_header("X-Good", "y");
            conn.send_body(b"{}").unwrap();
        })
        .await
        .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("x-good").is_some());
        assert_eq!(
            requests[0]
                .headers
                .keys()
                .filter(|k| k.as_str().contains("bad"))
                .count(),
            0
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_send() {
        let err = tokio::task::spawn_blocking(|| {
            let mut conn = HttpConnection::post(Client::new(), "http://127.0.0.1:1/ingest");
            conn.send_body(b"{}").err()
        })
        .await
        .unwrap();

        assert!(err.is_some());
    }

    #[test]
    fn reading_before_sending_fails() {
        let mut conn = HttpConnection::post(Client::new(), "http://localhost/ingest");
        let err = conn.response_body().err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
