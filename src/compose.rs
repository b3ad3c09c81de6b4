//! Request composition.
//!
//! [`compose`] turns history + new input + [`RequestOptions`] into a
//! [`RequestEnvelope`]. It is a pure function: the same inputs always yield
//! byte-identical JSON, which is what makes a retried request safe to resend.

use crate::translate::{append_new_user_turn, to_content_blocks};
use crate::types::{ContentBlock, NewTurn, Role, Turn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mime type that switches the reply into structured (JSON) mode
pub const JSON_MIME_TYPE: &str = "application/json";

/// Sampling and limit configuration.
///
/// Every field is optional so caller overrides can be merged field by field
/// over [`GenerationParameters::defaults`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

impl GenerationParameters {
    /// Temperature 0.7 and 1000 output tokens
    pub fn defaults() -> Self {
        Self {
            temperature: Some(0.7),
            max_output_tokens: Some(1000),
            ..Self::default()
        }
    }

    /// Parameters asking for a JSON reply
    pub fn json() -> Self {
        Self {
            response_mime_type: Some(JSON_MIME_TYPE.to_string()),
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn with_response_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.response_mime_type = Some(mime.into());
        self
    }

    /// Fill every unset field of `self` from `base`. Fields set on `self` win.
    pub fn merged_over(self, base: &GenerationParameters) -> Self {
        Self {
            temperature: self.temperature.or(base.temperature),
            top_p: self.top_p.or(base.top_p),
            top_k: self.top_k.or(base.top_k),
            candidate_count: self.candidate_count.or(base.candidate_count),
            max_output_tokens: self.max_output_tokens.or(base.max_output_tokens),
            stop_sequences: self.stop_sequences.or_else(|| base.stop_sequences.clone()),
            response_mime_type: self
                .response_mime_type
                .or_else(|| base.response_mime_type.clone()),
        }
    }

    pub fn expects_json(&self) -> bool {
        self.response_mime_type.as_deref() == Some(JSON_MIME_TYPE)
    }
}

/// Harm categories understood by the safety filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
}

/// Probability level at which content is blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

/// A (category, threshold) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyThreshold {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

impl SafetyThreshold {
    pub fn new(category: HarmCategory, threshold: HarmBlockThreshold) -> Self {
        Self { category, threshold }
    }

    /// Hate speech and dangerous content, both blocked at medium and above
    pub fn defaults() -> Vec<SafetyThreshold> {
        vec![
            Self::new(HarmCategory::HateSpeech, HarmBlockThreshold::BlockMediumAndAbove),
            Self::new(HarmCategory::DangerousContent, HarmBlockThreshold::BlockMediumAndAbove),
        ]
    }
}

/// Function the model may ask the caller to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON-schema object describing the arguments
    pub parameters: Value,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Whether and how the model may request tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocationMode {
    Disabled,
    Automatic,
    ForcedToAllowedSet(Vec<String>),
}

/// Wire group of declarations (`{"functionDeclarations": [...]}`)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSet {
    pub function_declarations: Vec<ToolDeclaration>,
}

/// Wire form of [`ToolInvocationMode`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallingConfig {
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

impl From<&ToolInvocationMode> for ToolConfig {
    fn from(mode: &ToolInvocationMode) -> Self {
        let function_calling_config = match mode {
            ToolInvocationMode::Disabled => FunctionCallingConfig {
                mode: "NONE",
                allowed_function_names: None,
            },
            ToolInvocationMode::Automatic => FunctionCallingConfig {
                mode: "AUTO",
                allowed_function_names: None,
            },
            ToolInvocationMode::ForcedToAllowedSet(names) => FunctionCallingConfig {
                mode: "ANY",
                allowed_function_names: Some(names.clone()),
            },
        };
        Self {
            function_calling_config,
        }
    }
}

/// Full outbound request body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub contents: Vec<ContentBlock>,
    pub generation_config: GenerationParameters,
    pub safety_settings: Vec<SafetyThreshold>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSet>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
}

impl RequestEnvelope {
    pub fn expects_json(&self) -> bool {
        self.generation_config.expects_json()
    }

    /// Serialized request body
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Per-call options for [`compose`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub generation_parameters: Option<GenerationParameters>,
    pub safety_thresholds: Option<Vec<SafetyThreshold>>,
    pub system_instruction: Option<String>,
    pub tools: Option<Vec<ToolDeclaration>>,
    pub tool_invocation_mode: Option<ToolInvocationMode>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation_parameters(mut self, parameters: GenerationParameters) -> Self {
        self.generation_parameters = Some(parameters);
        self
    }

    pub fn safety_thresholds(mut self, thresholds: Vec<SafetyThreshold>) -> Self {
        self.safety_thresholds = Some(thresholds);
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn tool_invocation_mode(mut self, mode: ToolInvocationMode) -> Self {
        self.tool_invocation_mode = Some(mode);
        self
    }
}

/// Compose a request from stored history plus the user's new input.
pub fn compose(history: &[Turn], new_turn: &NewTurn, options: &RequestOptions) -> RequestEnvelope {
    let contents = append_new_user_turn(to_content_blocks(history), new_turn);
    compose_contents(contents, options)
}

/// Compose a request around already-translated content blocks.
pub fn compose_contents(contents: Vec<ContentBlock>, options: &RequestOptions) -> RequestEnvelope {
    let generation_config = options
        .generation_parameters
        .clone()
        .unwrap_or_default()
        .merged_over(&GenerationParameters::defaults());

    // A caller-supplied list replaces the defaults entirely.
    let safety_settings = options
        .safety_thresholds
        .clone()
        .unwrap_or_else(SafetyThreshold::defaults);

    let system_instruction = options
        .system_instruction
        .as_ref()
        .map(|instruction| ContentBlock::text(Role::System, instruction.clone()));

    let tools = options.tools.as_ref().map(|declarations| {
        vec![ToolSet {
            function_declarations: declarations.clone(),
        }]
    });

    RequestEnvelope {
        contents,
        generation_config,
        safety_settings,
        system_instruction,
        tools,
        tool_config: options.tool_invocation_mode.as_ref().map(ToolConfig::from),
    }
}
