//! # NutriPlanner AI
//!
//! Conversation client for a Gemini-style generative backend, used by a
//! household meal-planning assistant.
//!
//! ## Overview
//!
//! The client turns a stored conversation plus the user's new input into one
//! backend request, sends it, and reduces the reply to a single [`Outcome`]:
//!
//! - plain text, or structured JSON when `application/json` was requested
//! - a function call the model wants executed
//! - a safety block with its reason and ratings
//! - nothing at all
//!
//! ## Key Features
//!
//! - **Whole-response and streaming calls**: streamed fragments are decoded
//!   incrementally and split at any byte boundary without changing the result
//! - **One tool round trip**: execute the requested tool, send the result
//!   back with tool calling disabled, and detect loops
//! - **Connectivity-gated retries**: linear backoff, transient failures only
//! - **Injected diagnostics**: every component logs through a
//!   [`DiagnosticSink`], by default the `log` facade
//! - **Meal-planning operations**: menus, shopping lists, recipe analysis,
//!   ingredient availability through a store lookup tool
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use nutriplanner_ai::{ClientConfig, GenerativeClient, NewTurn, Outcome, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> nutriplanner_ai::Result<()> {
//!     let client = GenerativeClient::new(ClientConfig::from_env()?)?;
//!
//!     let outcome = client
//!         .generate(&[], &NewTurn::text("Three ideas for leftover rice"), &RequestOptions::new())
//!         .await?;
//!
//!     if let Outcome::PlainText(text) = outcome {
//!         println!("{}", text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! ```rust,no_run
//! use nutriplanner_ai::{GenerativeClient, NewTurn, RequestOptions, StreamCallbacks, StreamChunk};
//!
//! # async fn example(client: GenerativeClient) {
//! let callbacks = StreamCallbacks::new()
//!     .on_chunk(|chunk| {
//!         if let StreamChunk::Text(text) = chunk {
//!             print!("{}", text);
//!         }
//!     })
//!     .on_complete(|outcome| println!("\n{:?}", outcome))
//!     .on_error(|err| eprintln!("stream failed: {}", err));
//!
//! client
//!     .stream(&[], &NewTurn::text("A soup recipe"), callbacks, &RequestOptions::new())
//!     .await;
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **types**: stored turns, wire content blocks, outcomes
//! - **translate**: stored turns to wire content blocks
//! - **compose**: request envelope with defaults and tool configuration
//! - **interpret**: whole replies to outcomes
//! - **stream**: incremental decoding of streamed replies
//! - **connectivity**: online/offline state with change notification
//! - **retry**: backoff executor and its state machine
//! - **transport**: outbound HTTP behind a trait
//! - **tools**: tool declarations, handlers and registry
//! - **orchestrator**: the tool-call round trip
//! - **client**: the public facade
//! - **models** / **planner**: meal-planning shapes and operations

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// `GenerativeClient` and its builder.
mod client;

/// API key, endpoint and model resolution, with environment variable support.
mod config;

/// Error enum and `Result<T>` alias shared by every public API.
mod error;

/// Diagnostic sinks: the `log` facade forwarder and an in-memory recorder.
pub mod logging;

/// Request envelope, generation parameters, safety and tool configuration.
pub mod compose;

/// Online/offline probe with listeners and a watch stream.
pub mod connectivity;

/// Reply interpretation.
pub mod interpret;

/// Household shapes: ingredients, recipes, menus, family members, stores.
pub mod models;

/// Tool round-trip orchestration.
pub mod orchestrator;

/// Meal-planning operations.
pub mod planner;

/// Retry executor with linear backoff gated by connectivity.
pub mod retry;

/// Streaming decoder and byte sources.
pub mod stream;

/// Tool definitions and execution.
mod tools;

/// Stored turn to wire content translation.
pub mod translate;

/// HTTP transport and an in-memory scripted transport.
pub mod transport;

/// Conversation and wire types.
mod types;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

// --- Client ---

pub use client::{GenerativeClient, GenerativeClientBuilder};

// --- Configuration ---

pub use config::{ClientConfig, ClientConfigBuilder, StreamFraming, get_base_url, get_model};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Requests ---

pub use compose::{
    GenerationParameters, HarmBlockThreshold, HarmCategory, RequestEnvelope, RequestOptions,
    SafetyThreshold, ToolDeclaration, ToolInvocationMode, compose,
};

// --- Streaming ---

pub use stream::{AsyncByteSource, StreamCallbacks, StreamChunk};

// --- Diagnostics ---

pub use logging::{DiagnosticSink, LogSink, MemorySink, SharedSink};

// --- Tool System ---

pub use tools::{Tool, ToolBuilder, ToolExecutor, ToolHandler, ToolRegistry, tool};

// --- Core Types ---

pub use types::{
    Candidate, CandidateContent, ContentBlock, FunctionCall, FunctionResponse,
    GenerateContentResponse, InlineData, NewTurn, Outcome, Part, Payload, PromptFeedback,
    ResponsePart, Role, SafetyRating, Turn, UsageMetadata,
};

// --- Meal planning ---

pub use planner::{AvailabilityReport, MealAssistant, StoreLocator};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Commonly used types. Import with `use nutriplanner_ai::prelude::*;`.
pub mod prelude {
    pub use crate::{
        ClientConfig, Error, GenerativeClient, MealAssistant, NewTurn, Outcome, Payload,
        RequestOptions, Result, StreamCallbacks, StreamChunk, Tool, ToolRegistry, Turn, tool,
    };
}
