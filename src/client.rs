//! Client for whole-response, streaming and tool round-trip calls
//!
//! [`GenerativeClient`] is the entry point used by the domain layer. It owns
//! no conversation state: every call takes the stored history, the user's
//! new input and [`RequestOptions`], and returns (or reports) one
//! [`Outcome`].
//!
//! ## Request Flow
//!
//! ```text
//! generate(history, new_turn, options)
//!     │
//!     ├─> compose()            history + input + options → RequestEnvelope
//!     │
//!     ├─> envelope serialized once
//!     │
//!     ├─> retry_with_backoff   connectivity check, POST, linear backoff
//!     │
//!     └─> interpret()          → Outcome
//!
//! stream(history, new_turn, callbacks, options)
//!     │
//!     ├─> compose() + retry_with_backoff (until the response headers arrive)
//!     │
//!     └─> decode_stream()      on_chunk* then on_complete | on_error
//!
//! run_with_tools(history, new_turn, executor, options)
//!     │
//!     └─> ToolOrchestrator     generate, execute one tool, generate again
//! ```
//!
//! Retries cover establishing a call. Once a stream has started delivering
//! chunks it is never restarted, so `on_chunk` never sees duplicated text.
//!
//! ## Sharing
//!
//! The client is `Send + Sync`; wrap it in an `Arc` to run several calls
//! concurrently. Calls share nothing except the connectivity probe.
//!
//! ```rust,no_run
//! use nutriplanner_ai::{ClientConfig, GenerativeClient, NewTurn, RequestOptions};
//!
//! # async fn example() -> nutriplanner_ai::Result<()> {
//! let client = GenerativeClient::new(ClientConfig::from_env()?)?;
//! let outcome = client
//!     .generate(&[], &NewTurn::text("suggest a quick dinner"), &RequestOptions::new())
//!     .await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

use crate::compose::{RequestEnvelope, RequestOptions, compose};
use crate::config::ClientConfig;
use crate::connectivity::ConnectivityProbe;
use crate::interpret::interpret;
use crate::logging::{SharedSink, default_sink};
use crate::orchestrator::{EnvelopeSender, ToolOrchestrator, ToolRun};
use crate::retry::{RetryConfig, retry_with_backoff};
use crate::stream::{StreamCallbacks, decode_stream};
use crate::tools::ToolExecutor;
use crate::transport::{HttpTransport, Transport};
use crate::types::{GenerateContentResponse, NewTurn, Outcome, Turn};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

const TARGET: &str = "nutriplanner_ai::client";

/// Generative backend client
#[derive(Clone)]
pub struct GenerativeClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    probe: ConnectivityProbe,
    retry: RetryConfig,
    sink: SharedSink,
}

impl std::fmt::Debug for GenerativeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeClient")
            .field("config", &self.config)
            .field("probe", &self.probe)
            .field("retry", &self.retry)
            .finish()
    }
}

impl GenerativeClient {
    /// Client with the HTTP transport, an always-online probe and the `log` sink.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> GenerativeClientBuilder {
        GenerativeClientBuilder {
            config,
            transport: None,
            probe: None,
            retry: None,
            sink: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn probe(&self) -> &ConnectivityProbe {
        &self.probe
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    /// Send one request and interpret the whole reply.
    ///
    /// A safety block is returned as [`Outcome::Blocked`]. Transient failures
    /// are retried per [`RetryConfig`]; everything else surfaces immediately.
    pub async fn generate(
        &self,
        history: &[Turn],
        new_turn: &NewTurn,
        options: &RequestOptions,
    ) -> Result<Outcome> {
        self.send_envelope(&compose(history, new_turn, options)).await
    }

    /// Send an already composed envelope.
    pub async fn send_envelope(&self, envelope: &RequestEnvelope) -> Result<Outcome> {
        // Serialized once so every retry resends identical bytes.
        let body = envelope.to_json()?;
        let url = self.config.generate_url();
        let (url, body) = (url.as_str(), body.as_str());

        let raw = retry_with_backoff(&self.retry, &self.probe, self.sink.as_ref(), move |_attempt| {
            self.transport.post_json(url, body)
        })
        .await?;

        let response: GenerateContentResponse = serde_json::from_str(&raw)?;
        if let Some(usage) = &response.usage_metadata {
            self.sink.debug(
                TARGET,
                &format!(
                    "Usage: prompt={} candidates={} total={}",
                    usage.prompt_token_count, usage.candidates_token_count, usage.total_token_count
                ),
            );
        }

        interpret(&response, envelope.expects_json())
    }

    /// Stream one request, reporting through `callbacks`.
    ///
    /// Every failure, including composition and connection errors, goes to
    /// `on_error`. Dropping the future stops the call; no callback runs after
    /// that.
    pub async fn stream(
        &self,
        history: &[Turn],
        new_turn: &NewTurn,
        mut callbacks: StreamCallbacks,
        options: &RequestOptions,
    ) {
        let envelope = compose(history, new_turn, options);
        let body = match envelope.to_json() {
            Ok(body) => body,
            Err(err) => return callbacks.finish(Err(err)),
        };
        let url = self.config.stream_url();
        let (url, body) = (url.as_str(), body.as_str());

        let source = retry_with_backoff(&self.retry, &self.probe, self.sink.as_ref(), move |_attempt| {
            self.transport.post_stream(url, body)
        })
        .await;

        match source {
            Ok(mut source) => {
                decode_stream(
                    &mut *source,
                    self.config.stream_framing(),
                    envelope.expects_json(),
                    callbacks,
                    self.sink.as_ref(),
                )
                .await
            }
            Err(err) => {
                self.sink
                    .warn(TARGET, &format!("Stream could not be started: {}", err));
                callbacks.finish(Err(err));
            }
        }
    }

    /// Generate, executing at most one requested tool call through `executor`.
    pub async fn run_with_tools(
        &self,
        history: &[Turn],
        new_turn: &NewTurn,
        executor: &dyn ToolExecutor,
        options: &RequestOptions,
    ) -> Result<Outcome> {
        Ok(self
            .run_with_tools_detailed(history, new_turn, executor, options)
            .await?
            .outcome)
    }

    /// Like [`run_with_tools`](Self::run_with_tools), also returning the
    /// synthetic call and response turns when a tool ran.
    pub async fn run_with_tools_detailed(
        &self,
        history: &[Turn],
        new_turn: &NewTurn,
        executor: &dyn ToolExecutor,
        options: &RequestOptions,
    ) -> Result<ToolRun> {
        ToolOrchestrator::new(self, self.sink.as_ref())
            .run(history, new_turn, executor, options)
            .await
    }
}

#[async_trait]
impl EnvelopeSender for GenerativeClient {
    async fn send(&self, envelope: &RequestEnvelope) -> Result<Outcome> {
        self.send_envelope(envelope).await
    }
}

/// Builder for [`GenerativeClient`]
pub struct GenerativeClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    probe: Option<ConnectivityProbe>,
    retry: Option<RetryConfig>,
    sink: Option<SharedSink>,
}

impl GenerativeClientBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn probe(mut self, probe: ConnectivityProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<GenerativeClient> {
        let sink = self.sink.unwrap_or_else(default_sink);
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.timeout())?),
        };
        let probe = self
            .probe
            .unwrap_or_else(|| ConnectivityProbe::always_online(sink.clone()));

        Ok(GenerativeClient {
            config: self.config,
            transport,
            probe,
            retry: self.retry.unwrap_or_default(),
            sink,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::builder().api_key("test-key").build().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let client = GenerativeClient::new(config()).unwrap();
        assert_eq!(client.config().model(), "gemini-1.5-flash");
    }

    #[test]
    fn test_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GenerativeClient>();
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let client = GenerativeClient::new(config()).unwrap();
        assert!(!format!("{:?}", client).contains("test-key"));
    }
}
