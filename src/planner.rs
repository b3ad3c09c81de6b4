//! Meal-planning operations built on [`GenerativeClient`].
//!
//! Each operation is one request: a short system instruction, a prompt
//! carrying the household data as JSON, and a typed result. Operations that
//! expect structured output request `application/json`; when the model still
//! answers with JSON inside a Markdown code fence the fence is removed before
//! parsing.
//!
//! Ingredient availability goes through one tool round trip: the model is
//! forced to call `findStoresWithIngredient`, a [`StoreLocator`] answers, and
//! the model summarizes the stores it was given.

use crate::client::GenerativeClient;
use crate::compose::{GenerationParameters, RequestOptions, ToolInvocationMode};
use crate::models::{
    FamilyMember, Ingredient, Location, Menu, Recipe, RecipeAnalysis, RecipePreferences,
    ShoppingItem, Store,
};
use crate::tools::{Tool, ToolRegistry, tool};
use crate::types::{NewTurn, Outcome, Payload, Turn};
use crate::{Error, Result};
use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};

const TARGET: &str = "nutriplanner_ai::planner";

/// Name of the store lookup tool offered to the model
pub const FIND_STORES_TOOL: &str = "findStoresWithIngredient";

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n?(.*?)\s*```\s*$").expect("code fence pattern is valid")
});

/// Finds stores near a location that stock an ingredient.
#[async_trait]
pub trait StoreLocator: Send + Sync {
    async fn find_stores_with_ingredient(
        &self,
        ingredient: &str,
        location: &Location,
    ) -> anyhow::Result<Vec<Store>>;
}

/// Result of [`MealAssistant::check_ingredient_availability`]
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityReport {
    /// The model's summary for the user
    pub message: String,
    /// Stores returned by the locator, empty when no lookup happened
    pub stores: Vec<Store>,
    /// Synthetic call and response turns, for callers that persist them
    pub tool_turns: Vec<Turn>,
}

/// Household meal-planning assistant
#[derive(Debug, Clone)]
pub struct MealAssistant {
    client: GenerativeClient,
}

impl MealAssistant {
    pub fn new(client: GenerativeClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GenerativeClient {
        &self.client
    }

    /// Menus for `days` days with `meals_per_day` meals each, using what is in stock.
    pub async fn suggest_menus(
        &self,
        ingredients: &[Ingredient],
        family: &[FamilyMember],
        days: u32,
        meals_per_day: u32,
    ) -> Result<Vec<Menu>> {
        if days == 0 || meals_per_day == 0 {
            return Err(Error::invalid_input("days and meals_per_day must be at least 1"));
        }
        let prompt = json!({
            "task": "suggest_menus",
            "days": days,
            "mealsPerDay": meals_per_day,
            "availableIngredients": ingredients,
            "family": family,
        });
        self.ask_json(
            "You plan family meals. Respect every allergy and medical restriction. \
             Reply with a JSON array of menus: {date, mealType, recipes, description}.",
            &prompt,
        )
        .await
    }

    /// Items to buy for `menu`, given what is already at home.
    pub async fn generate_shopping_list(
        &self,
        menu: &[Menu],
        current_ingredients: &[Ingredient],
    ) -> Result<Vec<ShoppingItem>> {
        let prompt = json!({
            "task": "generate_shopping_list",
            "menu": menu,
            "currentIngredients": current_ingredients,
        });
        self.ask_json(
            "You build shopping lists. Only list what is missing. \
             Reply with a JSON array of {name, quantity, unit, suggestedStore}.",
            &prompt,
        )
        .await
    }

    /// Calories, spice level and per-member suitability of `recipe`.
    pub async fn analyze_recipe(
        &self,
        recipe: &Recipe,
        family: &[FamilyMember],
    ) -> Result<RecipeAnalysis> {
        let prompt = json!({
            "task": "analyze_recipe",
            "recipe": recipe,
            "family": family,
        });
        self.ask_json(
            "You are a nutritionist. Reply with a JSON object {calories, spiceLevel, suitability} \
             where suitability maps each member id to suitable, unsuitable or modified.",
            &prompt,
        )
        .await
    }

    pub async fn suggest_recipes(
        &self,
        ingredients: &[Ingredient],
        preferences: &RecipePreferences,
    ) -> Result<Vec<Recipe>> {
        let prompt = json!({
            "task": "suggest_recipes",
            "ingredients": ingredients,
            "preferences": preferences,
        });
        self.ask_json(
            "You suggest recipes from the given ingredients. \
             Reply with a JSON array of recipes.",
            &prompt,
        )
        .await
    }

    /// Ask the model where `ingredient` can be bought near `location`.
    ///
    /// The model must call the store lookup tool once; `locator` answers it.
    pub async fn check_ingredient_availability(
        &self,
        ingredient: &str,
        location: &Location,
        locator: Arc<dyn StoreLocator>,
    ) -> Result<AvailabilityReport> {
        if ingredient.trim().is_empty() {
            return Err(Error::invalid_input("ingredient name is empty"));
        }

        let registry = ToolRegistry::new().with(store_lookup_tool(locator));
        let options = RequestOptions::new()
            .system_instruction(
                "You help a household find groceries. Use the store lookup tool, \
                 then summarize which stores carry the ingredient.",
            )
            .tools(registry.declarations())
            .tool_invocation_mode(ToolInvocationMode::ForcedToAllowedSet(vec![
                FIND_STORES_TOOL.to_string(),
            ]));
        let prompt = format!(
            "Where can I buy {} near latitude {}, longitude {}?",
            ingredient, location.latitude, location.longitude
        );

        let run = self
            .client
            .run_with_tools_detailed(&[], &NewTurn::text(prompt), &registry, &options)
            .await?;

        let (stores, tool_turns) = match run.round_trip {
            Some(round_trip) => {
                let stores = self.stores_from_response(round_trip.response.content())?;
                (stores, vec![round_trip.call, round_trip.response])
            }
            None => (Vec::new(), Vec::new()),
        };

        Ok(AvailabilityReport {
            message: text_or_error(run.outcome)?,
            stores,
            tool_turns,
        })
    }

    /// Free-form nutritional facts about `query`.
    pub async fn nutritional_info(&self, query: &str) -> Result<Value> {
        self.ask_json(
            "You are a nutritionist. Reply with a JSON object of nutritional facts.",
            &json!({"task": "nutritional_info", "query": query}),
        )
        .await
    }

    /// Plain-language help for a cooking or storage problem.
    pub async fn troubleshoot(&self, problem: &str) -> Result<String> {
        let options = RequestOptions::new()
            .system_instruction("You help home cooks fix kitchen problems. Answer briefly.");
        let outcome = self
            .client
            .generate(&[], &NewTurn::text(problem), &options)
            .await?;
        text_or_error(outcome)
    }

    /// Short creative ideas (themed dinners, leftovers, ...) for `context`.
    pub async fn creative_ideas(&self, context: &str) -> Result<Vec<String>> {
        self.ask_json(
            "You give creative cooking ideas. Reply with a JSON array of short strings.",
            &json!({"task": "creative_ideas", "context": context}),
        )
        .await
    }

    async fn ask_json<T: DeserializeOwned>(&self, instruction: &str, prompt: &Value) -> Result<T> {
        let options = RequestOptions::new()
            .generation_parameters(GenerationParameters::json())
            .system_instruction(instruction);
        let new_turn = NewTurn::text(prompt.to_string());

        let value = match self.client.generate(&[], &new_turn, &options).await {
            Ok(Outcome::StructuredData(value)) => value,
            Ok(Outcome::PlainText(text)) => parse_fenced(&text)?,
            Ok(other) => return Err(unexpected(other)),
            Err(Error::MalformedStructuredResponse { raw, source }) => match unfence(&raw) {
                Some(inner) => serde_json::from_str(inner)
                    .map_err(|_| Error::MalformedStructuredResponse { raw: raw.clone(), source })?,
                None => return Err(Error::MalformedStructuredResponse { raw, source }),
            },
            Err(err) => return Err(err),
        };

        serde_json::from_value(value).map_err(|err| {
            self.client
                .sink()
                .warn(TARGET, &format!("Reply does not match the expected shape: {}", err));
            Error::Json(err)
        })
    }

    fn stores_from_response(&self, payload: &Payload) -> Result<Vec<Store>> {
        let stores = match payload {
            Payload::FunctionResponse { response, .. } => &response["content"]["stores"],
            _ => return Ok(Vec::new()),
        };
        if stores.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(stores.clone()).map_err(|err| {
            self.client
                .sink()
                .warn(TARGET, &format!("Store lookup result does not parse: {}", err));
            Error::Json(err)
        })
    }
}

/// The `findStoresWithIngredient` tool backed by `locator`.
pub fn store_lookup_tool(locator: Arc<dyn StoreLocator>) -> Tool {
    tool(FIND_STORES_TOOL, "Find stores near a location that stock an ingredient")
        .param("ingredient", "string")
        .param("latitude", "number")
        .param("longitude", "number")
        .build(move |args| {
            let locator = Arc::clone(&locator);
            async move {
                let ingredient = args["ingredient"]
                    .as_str()
                    .context("ingredient must be a string")?
                    .to_string();
                let latitude = args["latitude"].as_f64().context("latitude must be a number")?;
                let longitude = args["longitude"].as_f64().context("longitude must be a number")?;

                let stores = locator
                    .find_stores_with_ingredient(&ingredient, &Location::new(latitude, longitude))
                    .await
                    .with_context(|| format!("store lookup for '{}' failed", ingredient))?;
                Ok(json!({"ingredient": ingredient, "count": stores.len(), "stores": stores}))
            }
        })
}

/// Content between a leading and trailing Markdown code fence, if any.
pub fn unfence(text: &str) -> Option<&str> {
    CODE_FENCE
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|inner| inner.as_str())
}

fn parse_fenced(text: &str) -> Result<Value> {
    let inner = unfence(text).unwrap_or(text);
    serde_json::from_str(inner).map_err(|source| Error::MalformedStructuredResponse {
        raw: text.to_string(),
        source,
    })
}

fn text_or_error(outcome: Outcome) -> Result<String> {
    match outcome {
        Outcome::PlainText(text) => Ok(text),
        Outcome::StructuredData(value) => Ok(value.to_string()),
        other => Err(unexpected(other)),
    }
}

fn unexpected(outcome: Outcome) -> Error {
    match outcome {
        Outcome::Blocked { reason, detail } => Error::Blocked { reason, detail },
        Outcome::Empty => Error::EmptyResponse,
        Outcome::FunctionCallRequested { name, .. } => Error::unexpected_reply(format!(
            "model requested function '{}' but no tools were offered",
            name
        )),
        Outcome::PlainText(_) | Outcome::StructuredData(_) => {
            Error::unexpected_reply("reply has an unexpected shape")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::logging::MemorySink;
    use crate::retry::RetryConfig;
    use crate::transport::ScriptedTransport;
    use std::time::Duration;

    fn reply_text(text: &str) -> String {
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
            .to_string()
    }

    fn reply_call(name: &str, args: Value) -> String {
        json!({"candidates": [{"content": {"role": "model", "parts": [
            {"functionCall": {"name": name, "args": args}}
        ]}}]})
        .to_string()
    }

    fn assistant(transport: Arc<ScriptedTransport>) -> MealAssistant {
        let config = ClientConfig::builder().api_key("k").build().unwrap();
        let client = GenerativeClient::builder(config)
            .transport(transport)
            .retry(RetryConfig::default().with_base_delay(Duration::from_millis(1)))
            .build()
            .unwrap();
        MealAssistant::new(client)
    }

    struct FixedLocator;

    #[async_trait]
    impl StoreLocator for FixedLocator {
        async fn find_stores_with_ingredient(
            &self,
            ingredient: &str,
            _location: &Location,
        ) -> anyhow::Result<Vec<Store>> {
            anyhow::ensure!(ingredient == "saffron", "no stock data for {}", ingredient);
            Ok(["Épicerie Fine", "Marché Central", "BioCoop"]
                .iter()
                .enumerate()
                .map(|(i, name)| Store {
                    id: format!("s{}", i),
                    name: name.to_string(),
                    category: None,
                    location: None,
                })
                .collect())
        }
    }

    #[test]
    fn test_unfence() {
        assert_eq!(unfence("```json\n[1, 2]\n```"), Some("[1, 2]"));
        assert_eq!(unfence("```\n```"), Some(""));
        assert_eq!(unfence("  ```\n{\"a\": 1}```  "), Some("{\"a\": 1}"));
        assert_eq!(unfence("[1, 2]"), None);
    }

    #[tokio::test]
    async fn test_shopping_list_from_structured_reply() {
        let transport = Arc::new(ScriptedTransport::new().reply_json(reply_text(
            r#"[{"nom": "oeufs", "quantite": 6, "unite": "pièces", "magasinSuggeré": "Marché"}]"#,
        )));
        let items = assistant(transport.clone())
            .generate_shopping_list(&[], &[Ingredient::new("lait", 1.0, "L")])
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "oeufs");
        assert_eq!(items[0].quantity, 6.0);

        let body: Value = serde_json::from_str(&transport.requests()[0].body).unwrap();
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert!(body["systemInstruction"].is_object());
    }

    #[tokio::test]
    async fn test_fenced_json_is_unwrapped() {
        let transport = Arc::new(
            ScriptedTransport::new().reply_json(reply_text("```json\n[\"Taco night\", \"Soup swap\"]\n```")),
        );
        let ideas = assistant(transport).creative_ideas("rainy weekend").await.unwrap();
        assert_eq!(ideas, vec!["Taco night".to_string(), "Soup swap".to_string()]);
    }

    #[tokio::test]
    async fn test_menus_reject_zero_days() {
        let transport = Arc::new(ScriptedTransport::new());
        let err = assistant(transport.clone())
            .suggest_menus(&[], &[], 0, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_blocked_reply_is_error() {
        let transport = Arc::new(ScriptedTransport::new().reply_json(
            json!({"promptFeedback": {"blockReason": "SAFETY", "safetyRatings": []}}).to_string(),
        ));
        let err = assistant(transport).troubleshoot("my sauce split").await.unwrap_err();
        assert!(matches!(err, Error::Blocked { ref reason, .. } if reason == "SAFETY"));
    }

    #[tokio::test]
    async fn test_availability_round_trip() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply_json(reply_call(
                    FIND_STORES_TOOL,
                    json!({"ingredient": "saffron", "latitude": 48.85, "longitude": 2.35}),
                ))
                .reply_json(reply_text("3 stores found")),
        );

        let report = assistant(transport.clone())
            .check_ingredient_availability("saffron", &Location::new(48.85, 2.35), Arc::new(FixedLocator))
            .await
            .unwrap();

        assert_eq!(report.message, "3 stores found");
        assert_eq!(report.stores.len(), 3);
        assert_eq!(report.stores[1].name, "Marché Central");
        assert_eq!(report.tool_turns.len(), 2);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        let first: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(first["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
        let second: Value = serde_json::from_str(&requests[1].body).unwrap();
        assert_eq!(second["toolConfig"]["functionCallingConfig"]["mode"], "NONE");
    }

    #[tokio::test]
    async fn test_locator_failure_is_tool_error() {
        let transport = Arc::new(ScriptedTransport::new().reply_json(reply_call(
            FIND_STORES_TOOL,
            json!({"ingredient": "truffle", "latitude": 0.0, "longitude": 0.0}),
        )));

        let err = assistant(transport)
            .check_ingredient_availability("truffle", &Location::new(0.0, 0.0), Arc::new(FixedLocator))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tool(ref msg) if msg.contains("no stock data for truffle")));
    }

    #[test]
    fn test_store_payload_parsing() {
        let sink = Arc::new(MemorySink::new());
        let config = ClientConfig::builder().api_key("k").build().unwrap();
        let client = GenerativeClient::builder(config)
            .transport(Arc::new(ScriptedTransport::new()))
            .sink(sink.clone())
            .build()
            .unwrap();
        let assistant = MealAssistant::new(client);

        let good = Payload::FunctionResponse {
            name: FIND_STORES_TOOL.to_string(),
            response: json!({"content": {"stores": [{"id": "s1", "name": "BioCoop"}]}}),
        };
        let stores = assistant.stores_from_response(&good).unwrap();
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].name, "BioCoop");

        let missing = Payload::FunctionResponse {
            name: FIND_STORES_TOOL.to_string(),
            response: json!({"content": {"count": 0}}),
        };
        assert!(assistant.stores_from_response(&missing).unwrap().is_empty());
        assert!(sink.entries().is_empty());

        let broken = Payload::FunctionResponse {
            name: FIND_STORES_TOOL.to_string(),
            response: json!({"content": {"stores": [{"id": 7}]}}),
        };
        let err = assistant.stores_from_response(&broken).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert_eq!(sink.at_level(log::Level::Warn).len(), 1);
    }

    #[tokio::test]
    async fn test_function_call_without_tools_is_unexpected_reply() {
        let transport = Arc::new(ScriptedTransport::new().reply_json(reply_call(
            FIND_STORES_TOOL,
            json!({"ingredient": "flour"}),
        )));
        let err = assistant(transport.clone())
            .troubleshoot("my bread is flat")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnexpectedReply(ref msg) if msg.contains(FIND_STORES_TOOL)));
        assert!(!matches!(err, Error::UnknownTool(_)));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_function_call_for_json_operation_is_unexpected_reply() {
        let transport = Arc::new(
            ScriptedTransport::new().reply_json(reply_call("lookupNutrients", json!({"query": "kale"}))),
        );
        let err = assistant(transport).nutritional_info("kale").await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedReply(ref msg) if msg.contains("lookupNutrients")));
    }
}
