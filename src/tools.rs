//! # Tools the model may call
//!
//! A [`Tool`] pairs a [`ToolDeclaration`] (name, description, parameter
//! schema) with an async handler. Tools are collected in a [`ToolRegistry`],
//! which serves both sides of a tool round trip:
//!
//! ```text
//! ToolRegistry::declarations()  →  RequestOptions::tools   (what the model may call)
//! ToolExecutor::execute(name)   ←  Outcome::FunctionCallRequested
//! ```
//!
//! ## Schema notation
//!
//! Parameter schemas accept the same shorthand forms:
//!
//! - **Simple notation**: `{"ingredient": "string", "latitude": "number"}`
//! - **Typed schema**: `{"radius": {"type": "number", "optional": true}}`
//! - **Full JSON Schema**: an object with `type` and `properties`, passed through
//!
//! ## Handlers
//!
//! Handlers receive the argument object and return `anyhow::Result<Value>`,
//! so application code can use `?` on any error type. Failures reach the
//! caller as [`Error::Tool`] with the whole context chain.
//!
//! ```rust,no_run
//! use nutriplanner_ai::tool;
//! use serde_json::json;
//!
//! let lookup = tool("findStoresWithIngredient", "Find nearby stores stocking an ingredient")
//!     .param("ingredient", "string")
//!     .param("latitude", "number")
//!     .param("longitude", "number")
//!     .build(|args| async move {
//!         let ingredient = args["ingredient"].as_str().unwrap_or_default().to_string();
//!         Ok(json!({"ingredient": ingredient, "stores": []}))
//!     });
//! ```

use crate::compose::ToolDeclaration;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type-erased async handler
pub type ToolHandler = Arc<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>> + Send + Sync,
>;

/// Runs a named tool on behalf of the orchestrator.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute `name` with `args`.
    ///
    /// Implementations return [`Error::UnknownTool`] for names they do not
    /// handle.
    async fn execute(&self, name: &str, args: &Map<String, Value>) -> Result<Value>;
}

/// A callable tool: declaration plus handler
#[derive(Clone)]
pub struct Tool {
    declaration: ToolDeclaration,
    handler: ToolHandler,
}

impl Tool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            declaration: ToolDeclaration::new(name, description, normalize_schema(parameters)),
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Run the handler, folding its failure into [`Error::Tool`].
    pub async fn execute(&self, arguments: Value) -> Result<Value> {
        (self.handler)(arguments)
            .await
            .map_err(|err| Error::tool(format!("{}: {:#}", self.declaration.name, err)))
    }

    pub fn declaration(&self) -> &ToolDeclaration {
        &self.declaration
    }

    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    pub fn description(&self) -> &str {
        &self.declaration.description
    }

    pub fn parameters(&self) -> &Value {
        &self.declaration.parameters
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.declaration.name)
            .field("description", &self.declaration.description)
            .field("parameters", &self.declaration.parameters)
            .finish()
    }
}

/// Normalize shorthand notation to an object schema with `properties` and `required`.
fn normalize_schema(schema: Value) -> Value {
    let Value::Object(entries) = schema else {
        return serde_json::json!({"type": "object", "properties": {}, "required": []});
    };

    if entries.contains_key("type") && entries.contains_key("properties") {
        return Value::Object(entries);
    }

    let mut properties = Map::new();
    let mut required = Vec::new();

    for (param_name, param_type) in entries {
        match param_type {
            Value::String(type_str) => {
                properties.insert(param_name.clone(), type_to_json_schema(&type_str));
                required.push(param_name);
            }
            Value::Object(mut prop) => {
                let is_optional = prop
                    .remove("optional")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let is_required = prop.remove("required").and_then(|v| v.as_bool());
                let has_default = prop.contains_key("default");

                // Explicit `required` wins, then `optional`, then a default value.
                let required_param = match is_required {
                    Some(flag) => flag,
                    None => !is_optional && !has_default,
                };
                properties.insert(param_name.clone(), Value::Object(prop));
                if required_param {
                    required.push(param_name);
                }
            }
            _ => {}
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        _ => "string",
    };
    serde_json::json!({ "type": json_type })
}

/// Builder returned by [`tool`]
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({}),
        }
    }

    /// Replace the whole schema
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Add one parameter in simple notation
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        if let Value::Object(entries) = &mut self.schema {
            entries.insert(name.to_string(), Value::String(type_str.to_string()));
        } else {
            self.schema = serde_json::json!({ name: type_str });
        }
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Tool::new(self.name, self.description, self.schema, handler)
    }
}

/// Start building a tool
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// Named set of tools, usable as a [`ToolExecutor`]
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any existing tool of the same name.
    pub fn with(mut self, tool: Tool) -> Self {
        self.register(tool);
        self
    }

    pub fn register(&mut self, tool: Tool) {
        self.tools.retain(|existing| existing.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    /// Declarations for [`crate::compose::RequestOptions::tools`]
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|tool| tool.declaration().clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|tool| tool.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, name: &str, args: &Map<String, Value>) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;
        tool.execute(Value::Object(args.clone())).await
    }
}
