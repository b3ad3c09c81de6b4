//! Error types for the generative conversation client

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Pre-flight connectivity check reported the device offline
    #[error("No network connectivity")]
    NoConnectivity,

    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-2xx status
    #[error("API error {status}: {body}")]
    Transport { status: u16, body: String },

    /// Timeout error
    #[error("Request timeout")]
    Timeout,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON output was requested but the reply text does not parse
    #[error("Structured response is not valid JSON: {source}")]
    MalformedStructuredResponse {
        raw: String,
        source: serde_json::Error,
    },

    /// Prompt or reply stopped by the backend safety filter
    #[error("Blocked by safety filter: {reason} ({detail})")]
    Blocked { reason: String, detail: String },

    /// Backend replied without any usable content
    #[error("Model returned no content")]
    EmptyResponse,

    /// The model asked for a tool the executor does not know
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// The model asked for a second tool call after receiving a tool response
    #[error("Tool loop detected: model requested '{0}' after a tool response")]
    ToolLoopDetected(String),

    /// Reply is well formed but not the kind of answer the operation asked for
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a transport error from a non-2xx status and its body
    pub fn transport(status: u16, body: impl Into<String>) -> Self {
        Error::Transport {
            status,
            body: body.into(),
        }
    }

    /// Create a safety block error
    pub fn blocked(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Blocked {
            reason: reason.into(),
            detail: detail.into(),
        }
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create an unexpected reply error
    pub fn unexpected_reply(msg: impl Into<String>) -> Self {
        Error::UnexpectedReply(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// Whether the retry executor may attempt the call again.
    ///
    /// Only connectivity and transport failures are transient. Safety blocks,
    /// malformed structured output and tool invariant violations surface on
    /// first occurrence.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::NoConnectivity | Error::Http(_) | Error::Transport { .. } | Error::Timeout
        )
    }
}
