//! Core types: stored conversation turns, transport-level content blocks,
//! backend response shapes and the normalized [`Outcome`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inline binary attachment (mimetype + base64 payload)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl InlineData {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// Function call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Result of an executed function, sent back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

impl FunctionResponse {
    pub fn new(name: impl Into<String>, response: Value) -> Self {
        Self {
            name: name.into(),
            response,
        }
    }
}

/// Typed content of a stored turn.
///
/// The variant is fixed when the turn is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Text {
        text: String,
    },
    Json {
        data: Value,
    },
    Image {
        uri: String,
        mime_type: String,
        /// Base64 bytes; when absent only the uri is known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    FunctionCall {
        name: String,
        #[serde(default)]
        args: Map<String, Value>,
    },
    FunctionResponse {
        name: String,
        response: Value,
    },
    MenuSuggestion {
        data: Value,
    },
    Recipe {
        data: Value,
    },
    ShoppingList {
        data: Value,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text { text: text.into() }
    }

    /// Name of the variant as stored (`"text"`, `"function_call"`, ...)
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text { .. } => "text",
            Payload::Json { .. } => "json",
            Payload::Image { .. } => "image",
            Payload::FunctionCall { .. } => "function_call",
            Payload::FunctionResponse { .. } => "function_response",
            Payload::MenuSuggestion { .. } => "menu_suggestion",
            Payload::Recipe { .. } => "recipe",
            Payload::ShoppingList { .. } => "shopping_list",
            Payload::Error { .. } => "error",
        }
    }
}

/// One stored exchange unit of a conversation.
///
/// `content` is private: its variant cannot change after creation. Only the
/// update timestamp moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub conversation_id: String,
    pub is_user: bool,
    content: Payload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        is_user: bool,
        content: Payload,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            is_user,
            content,
            created_at: now,
            updated_at: now,
        }
    }

    /// User turn with a fresh id
    pub fn user(conversation_id: impl Into<String>, content: Payload) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), conversation_id, true, content)
    }

    /// Model turn with a fresh id
    pub fn model(conversation_id: impl Into<String>, content: Payload) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), conversation_id, false, content)
    }

    pub fn content(&self) -> &Payload {
        &self.content
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Role of a transport-level content block
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Function,
    System,
}

impl Role {
    pub fn for_turn(is_user: bool) -> Self {
        if is_user { Role::User } else { Role::Model }
    }
}

/// Atomic slice of a content block, serialized in the backend's externally
/// tagged form (`{"text": ...}`, `{"inlineData": {...}}`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    InlineData(InlineData),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

/// Role-tagged unit sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ContentBlock {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::Text(text.into())],
        }
    }
}

/// The user's new input, folded into the history when a request is composed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTurn {
    pub text: Option<String>,
    pub inline_binary: Option<InlineData>,
}

impl NewTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_binary: None,
        }
    }

    pub fn with_attachment(mut self, attachment: InlineData) -> Self {
        self.inline_binary = Some(attachment);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.inline_binary.is_none()
    }
}

/// Normalized result of interpreting one reply
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    PlainText(String),
    StructuredData(Value),
    FunctionCallRequested {
        name: String,
        args: Map<String, Value>,
    },
    Blocked {
        reason: String,
        detail: String,
    },
    Empty,
}

impl Outcome {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Outcome::PlainText(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self, Outcome::FunctionCallRequested { .. })
    }
}

// ============================================================================
// Backend response shapes
// ============================================================================

/// Whole (or streamed fragment of a) `generateContent` response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateContentResponse {
    /// Block reason from prompt feedback, if the prompt was refused
    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
    }

    /// Parts of the first candidate (empty when there is none)
    pub fn first_parts(&self) -> &[ResponsePart] {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

/// Reply part; unknown fields are ignored
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub function_call: Option<FunctionCall>,
    #[serde(default)]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
    #[serde(default)]
    pub safety_ratings: Vec<SafetyRating>,
}

impl PromptFeedback {
    /// `"CATEGORY: PROBABILITY"` pairs joined with `", "`
    pub fn ratings_detail(&self) -> String {
        self.safety_ratings
            .iter()
            .map(|rating| format!("{}: {}", rating.category, rating.probability))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SafetyRating {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub probability: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}
