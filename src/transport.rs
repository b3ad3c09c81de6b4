//! Outbound HTTP.
//!
//! The client talks to the backend through the [`Transport`] trait so tests
//! can script replies. [`HttpTransport`] is the `reqwest` implementation:
//! one pooled client, configured timeout, non-2xx statuses mapped to
//! [`Error::Transport`].

use crate::stream::{AsyncByteSource, ChunkedSource, StreamByteSource};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Sends a serialized request body and returns the reply.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` and return the whole response body.
    async fn post_json(&self, url: &str, body: &str) -> Result<String>;

    /// POST `body` and return the response body as a byte source.
    async fn post_stream(&self, url: &str, body: &str) -> Result<Box<dyn AsyncByteSource>>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport whose requests time out after `timeout_secs`.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        // The timeout covers the whole request, including the streamed body.
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    async fn send(&self, url: &str, body: &str) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        // Authentication failures, quota errors and unknown models all land here.
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Unknown error (failed to read response body: {})", e));
            return Err(Error::transport(status, body));
        }

        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &str) -> Result<String> {
        let response = self.send(url, body).await?;
        response.text().await.map_err(map_reqwest_error)
    }

    async fn post_stream(&self, url: &str, body: &str) -> Result<Box<dyn AsyncByteSource>> {
        let response = self.send(url, body).await?;
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(map_body_error));

        Ok(Box::new(StreamByteSource::new(bytes)))
    }
}

/// One reply queued on a [`ScriptedTransport`]
#[derive(Debug)]
pub enum ScriptedReply {
    /// Whole response body
    Json(String),
    /// Streamed body, delivered chunk by chunk
    Stream(Vec<Vec<u8>>),
    /// The call fails with this error
    Fail(Error),
}

/// A request seen by a [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub body: String,
}

/// In-memory transport that replays queued replies in order and records
/// every request. Intended for tests and offline development.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_json(self, body: impl Into<String>) -> Self {
        self.push(ScriptedReply::Json(body.into()))
    }

    pub fn reply_stream<I, C>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        self.push(ScriptedReply::Stream(chunks.into_iter().map(Into::into).collect()))
    }

    pub fn fail(self, error: Error) -> Self {
        self.push(ScriptedReply::Fail(error))
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Replies not consumed yet
    pub fn pending(&self) -> usize {
        lock(&self.replies).len()
    }

    fn push(self, reply: ScriptedReply) -> Self {
        lock(&self.replies).push_back(reply);
        self
    }

    fn next_reply(&self, url: &str, body: &str) -> Result<ScriptedReply> {
        lock(&self.requests).push(RecordedRequest {
            url: url.to_string(),
            body: body.to_string(),
        });
        lock(&self.replies)
            .pop_front()
            .ok_or_else(|| Error::other("no scripted reply left"))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, url: &str, body: &str) -> Result<String> {
        match self.next_reply(url, body)? {
            ScriptedReply::Json(body) => Ok(body),
            ScriptedReply::Stream(chunks) => Ok(String::from_utf8_lossy(&chunks.concat()).into_owned()),
            ScriptedReply::Fail(err) => Err(err),
        }
    }

    async fn post_stream(&self, url: &str, body: &str) -> Result<Box<dyn AsyncByteSource>> {
        match self.next_reply(url, body)? {
            ScriptedReply::Json(body) => Ok(Box::new(ChunkedSource::new([body]))),
            ScriptedReply::Stream(chunks) => Ok(Box::new(ChunkedSource::new(chunks))),
            ScriptedReply::Fail(err) => Err(err),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn map_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else {
        Error::Http(err)
    }
}

// Failures after the status line arrived; the call itself already succeeded.
fn map_body_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else {
        Error::stream(format!("Response body interrupted: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Answers a single request on a loopback port with `response`, then closes.
    async fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if n == 0 || (text.contains("\r\n\r\n") && text.ends_with("{}")) {
                    break;
                }
            }
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{}/v1beta/models/m:generateContent", addr)
    }

    fn local_transport() -> HttpTransport {
        HttpTransport {
            http_client: reqwest::Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
        }
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new(60).is_ok());
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let url = serve_once(
            b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy",
        )
        .await;

        let err = local_transport().post_json(&url, "{}").await.unwrap_err();

        assert!(matches!(err, Error::Transport { status: 503, ref body } if body == "busy"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_success_body_is_returned() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}").await;

        let body = local_transport().post_json(&url, "{}").await.unwrap();
        assert_eq!(body, "{}");
    }

    #[tokio::test]
    async fn test_truncated_stream_body_is_stream_error() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 64\r\nConnection: close\r\n\r\n[{\"candidates\":",
        )
        .await;

        let mut source = local_transport().post_stream(&url, "{}").await.unwrap();
        let mut received = Vec::new();
        let err = loop {
            match source.next_chunk().await {
                Some(Ok(chunk)) => received.extend(chunk),
                Some(Err(err)) => break err,
                None => panic!("truncated body ended without an error"),
            }
        };

        assert!(matches!(err, Error::Stream(ref msg) if msg.starts_with("Response body interrupted")));
        assert!(!err.is_transient());
        assert!(b"[{\"candidates\":".starts_with(&received));
    }

    #[tokio::test]
    async fn test_scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new()
            .fail(Error::transport(503, "busy"))
            .reply_json("{}")
            .reply_stream(["[{}", "]"]);

        assert!(transport.post_json("u1", "b1").await.is_err());
        assert_eq!(transport.post_json("u2", "b2").await.unwrap(), "{}");

        let mut source = transport.post_stream("u3", "b3").await.unwrap();
        assert_eq!(source.next_chunk().await.unwrap().unwrap(), b"[{}".to_vec());
        assert_eq!(source.next_chunk().await.unwrap().unwrap(), b"]".to_vec());
        assert!(source.next_chunk().await.is_none());

        assert_eq!(transport.request_count(), 3);
        assert_eq!(transport.requests()[1].body, "b2");
        assert!(transport.post_json("u4", "b4").await.is_err());
    }
}
