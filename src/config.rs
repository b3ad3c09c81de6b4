//! Configuration for the generative backend connection

use crate::{Error, Result};
use std::env;

/// Default REST root of the generative language service
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model used by the assistant
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

const API_KEY_ENV: &str = "GEMINI_API_KEY";
const BASE_URL_ENV: &str = "GEMINI_BASE_URL";
const MODEL_ENV: &str = "GEMINI_MODEL";

/// How the streaming endpoint frames its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFraming {
    /// A sequence of whole JSON objects, usually wrapped in `[ ... ]`
    #[default]
    JsonArray,
    /// Server-sent events (`alt=sse`), one JSON object per `data:` line
    ServerSentEvents,
}

/// Connection settings for the backend
#[derive(Clone)]
pub struct ClientConfig {
    api_key: String,
    base_url: String,
    model: String,
    timeout: u64,
    stream_framing: StreamFraming,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("stream_framing", &self.stream_framing)
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for ClientConfig
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Build a configuration from `GEMINI_API_KEY`, `GEMINI_BASE_URL` and `GEMINI_MODEL`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use nutriplanner_ai::ClientConfig;
    ///
    /// let config = ClientConfig::from_env()?;
    /// println!("{}", config.model());
    /// # Ok::<(), nutriplanner_ai::Error>(())
    /// ```
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder()
            .base_url(get_base_url(None))
            .model(get_model(None, true).unwrap_or_else(|| DEFAULT_MODEL.to_string()));

        if let Ok(key) = env::var(API_KEY_ENV) {
            builder = builder.api_key(key);
        }

        builder.build()
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request timeout in seconds
    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    pub fn stream_framing(&self) -> StreamFraming {
        self.stream_framing
    }

    /// `POST` target for whole-response calls
    pub fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }

    /// `POST` target for streaming calls
    pub fn stream_url(&self) -> String {
        let url = format!(
            "{}/models/{}:streamGenerateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        );
        match self.stream_framing {
            StreamFraming::JsonArray => url,
            StreamFraming::ServerSentEvents => format!("{url}&alt=sse"),
        }
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout: Option<u64>,
    stream_framing: Option<StreamFraming>,
}

impl std::fmt::Debug for ClientConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfigBuilder")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ClientConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stream_framing(mut self, framing: StreamFraming) -> Self {
        self.stream_framing = Some(framing);
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::config("api_key is required"))?;

        let model = self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        if model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }

        Ok(ClientConfig {
            api_key,
            base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            timeout: self.timeout.unwrap_or(60),
            stream_framing: self.stream_framing.unwrap_or_default(),
        })
    }
}

/// Get the base URL from environment variable or fallback
///
/// Priority:
/// 1. GEMINI_BASE_URL environment variable
/// 2. fallback parameter
/// 3. [`DEFAULT_BASE_URL`]
pub fn get_base_url(fallback: Option<&str>) -> String {
    if let Ok(url) = env::var(BASE_URL_ENV) {
        return url;
    }

    fallback.unwrap_or(DEFAULT_BASE_URL).to_string()
}

/// Get the model name from environment variable or fallback
///
/// Priority:
/// 1. GEMINI_MODEL environment variable (if prefer_env is true)
/// 2. fallback parameter
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    if prefer_env {
        if let Ok(model) = env::var(MODEL_ENV) {
            return Some(model);
        }
    }

    fallback.map(|s| s.to_string())
}
