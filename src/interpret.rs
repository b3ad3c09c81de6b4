//! Response interpretation.
//!
//! Maps one whole `generateContent` response to an [`Outcome`]. A block
//! reason always wins, then the first part of the first candidate decides.

use crate::types::{GenerateContentResponse, Outcome, ResponsePart};
use crate::{Error, Result};

/// Interpret a parsed response.
///
/// `expects_json` is true when the request asked for
/// `application/json`; a text part that does not parse is then a
/// [`Error::MalformedStructuredResponse`] and is never downgraded to text.
pub fn interpret(response: &GenerateContentResponse, expects_json: bool) -> Result<Outcome> {
    if let Some(reason) = response.block_reason() {
        let detail = response
            .prompt_feedback
            .as_ref()
            .map(|feedback| feedback.ratings_detail())
            .unwrap_or_default();
        return Ok(Outcome::Blocked {
            reason: reason.to_string(),
            detail,
        });
    }

    if response.candidates.is_empty() {
        return Ok(Outcome::Empty);
    }

    match response.first_parts().first() {
        Some(part) => interpret_part(part, expects_json),
        None => Ok(Outcome::Empty),
    }
}

/// Parse raw response text, then [`interpret`] it.
pub fn interpret_str(raw: &str, expects_json: bool) -> Result<Outcome> {
    let response: GenerateContentResponse = serde_json::from_str(raw)?;
    interpret(&response, expects_json)
}

fn interpret_part(part: &ResponsePart, expects_json: bool) -> Result<Outcome> {
    if let Some(text) = &part.text {
        return if expects_json {
            parse_structured(text)
        } else {
            Ok(Outcome::PlainText(text.clone()))
        };
    }

    if let Some(call) = &part.function_call {
        return Ok(Outcome::FunctionCallRequested {
            name: call.name.clone(),
            args: call.args.clone(),
        });
    }

    Ok(Outcome::Empty)
}

/// Parse text that was requested as JSON into [`Outcome::StructuredData`].
pub(crate) fn parse_structured(text: &str) -> Result<Outcome> {
    serde_json::from_str(text)
        .map(Outcome::StructuredData)
        .map_err(|source| Error::MalformedStructuredResponse {
            raw: text.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_structured_data() {
        let response = parse(json!({
            "candidates": [{"content": {"parts": [{"text": "{\"recipe\":\"Omelette\"}"}]}}]
        }));
        assert_eq!(
            interpret(&response, true).unwrap(),
            Outcome::StructuredData(json!({"recipe": "Omelette"}))
        );
    }

    #[test]
    fn test_plain_text_when_json_not_requested() {
        let response = parse(json!({
            "candidates": [{"content": {"parts": [{"text": "{\"recipe\":\"Omelette\"}"}]}}]
        }));
        assert_eq!(
            interpret(&response, false).unwrap(),
            Outcome::PlainText("{\"recipe\":\"Omelette\"}".into())
        );
    }

    #[test]
    fn test_malformed_structured_response_is_an_error() {
        let response = parse(json!({
            "candidates": [{"content": {"parts": [{"text": "Here is a recipe: Omelette"}]}}]
        }));
        match interpret(&response, true) {
            Err(Error::MalformedStructuredResponse { raw, .. }) => {
                assert_eq!(raw, "Here is a recipe: Omelette");
            }
            other => panic!("expected MalformedStructuredResponse, got {:?}", other),
        }
    }

    #[test]
    fn test_blocked_without_candidates() {
        let response = parse(json!({
            "promptFeedback": {
                "blockReason": "SAFETY",
                "safetyRatings": [{"category": "HATE", "probability": "HIGH"}]
            }
        }));
        assert_eq!(
            interpret(&response, false).unwrap(),
            Outcome::Blocked {
                reason: "SAFETY".into(),
                detail: "HATE: HIGH".into()
            }
        );
    }

    #[test]
    fn test_blocked_wins_over_candidates() {
        let response = parse(json!({
            "promptFeedback": {"blockReason": "OTHER"},
            "candidates": [{"content": {"parts": [{"text": "ignored"}]}}]
        }));
        assert_eq!(
            interpret(&response, true).unwrap(),
            Outcome::Blocked {
                reason: "OTHER".into(),
                detail: String::new()
            }
        );
    }

    #[test]
    fn test_no_candidates_is_empty() {
        assert_eq!(interpret(&parse(json!({})), false).unwrap(), Outcome::Empty);
    }

    #[test]
    fn test_function_call() {
        let response = parse(json!({
            "candidates": [{"content": {"parts": [{
                "functionCall": {
                    "name": "findStoresWithIngredient",
                    "args": {"ingredient": "saffron", "latitude": 48.85, "longitude": 2.35}
                }
            }]}}]
        }));
        match interpret(&response, false).unwrap() {
            Outcome::FunctionCallRequested { name, args } => {
                assert_eq!(name, "findStoresWithIngredient");
                assert_eq!(args["ingredient"], "saffron");
            }
            other => panic!("expected function call, got {:?}", other),
        }
    }

    #[test]
    fn test_candidate_without_usable_part_is_empty() {
        let no_parts = parse(json!({"candidates": [{"finishReason": "MAX_TOKENS"}]}));
        assert_eq!(interpret(&no_parts, false).unwrap(), Outcome::Empty);

        let binary_only = parse(json!({
            "candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "AA"}}]}}]
        }));
        assert_eq!(interpret(&binary_only, false).unwrap(), Outcome::Empty);
    }

    #[test]
    fn test_interpret_str_invalid_body() {
        assert!(matches!(interpret_str("not json", false), Err(Error::Json(_))));
    }
}
