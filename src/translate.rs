//! Turn history → backend content blocks.
//!
//! Each stored [`Turn`] becomes exactly one [`ContentBlock`] whose role comes
//! from `Turn::is_user`, and each payload becomes exactly one [`Part`]. The
//! payload variant is matched once here; nothing downstream inspects it again.
//!
//! Part precedence for a payload:
//!
//! ```text
//! inline binary  →  function call  →  function response  →  text  →  payload serialized as text
//! ```

use crate::types::{ContentBlock, FunctionCall, FunctionResponse, InlineData, NewTurn, Part, Payload, Role, Turn};

/// Map each turn to one content block, preserving order.
pub fn to_content_blocks(turns: &[Turn]) -> Vec<ContentBlock> {
    turns
        .iter()
        .map(|turn| ContentBlock::new(Role::for_turn(turn.is_user), vec![payload_to_part(turn.content())]))
        .collect()
}

/// Translate a single payload into its transport part.
pub fn payload_to_part(payload: &Payload) -> Part {
    match payload {
        Payload::Image {
            mime_type,
            data: Some(data),
            ..
        } => Part::InlineData(InlineData::new(mime_type.clone(), data.clone())),
        Payload::FunctionCall { name, args } => {
            Part::FunctionCall(FunctionCall::new(name.clone(), args.clone()))
        }
        Payload::FunctionResponse { name, response } => {
            Part::FunctionResponse(FunctionResponse::new(name.clone(), response.clone()))
        }
        Payload::Text { text } => Part::Text(text.clone()),
        other => Part::Text(serialize_payload(other)),
    }
}

/// Append the user's new input as a `user` block.
///
/// Text comes before the attachment when both are present. An input with
/// neither still appends a block, with no parts.
pub fn append_new_user_turn(mut blocks: Vec<ContentBlock>, new_turn: &NewTurn) -> Vec<ContentBlock> {
    let mut parts = Vec::with_capacity(2);
    if let Some(text) = &new_turn.text {
        parts.push(Part::Text(text.clone()));
    }
    if let Some(binary) = &new_turn.inline_binary {
        parts.push(Part::InlineData(binary.clone()));
    }

    blocks.push(ContentBlock::new(Role::User, parts));
    blocks
}

fn serialize_payload(payload: &Payload) -> String {
    // Payload only holds strings and JSON values, so serialization cannot fail.
    serde_json::to_string(payload).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn turn(is_user: bool, payload: Payload) -> Turn {
        Turn::new("t", "c", is_user, payload)
    }

    #[test]
    fn test_one_block_per_turn_in_order() {
        let turns = vec![
            turn(true, Payload::text("first")),
            turn(false, Payload::text("second")),
            turn(true, Payload::text("third")),
        ];

        let blocks = to_content_blocks(&turns);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].role, Role::User);
        assert_eq!(blocks[1].role, Role::Model);
        assert_eq!(blocks[2].role, Role::User);
        assert_eq!(blocks[2].parts, vec![Part::Text("third".into())]);
    }

    #[test]
    fn test_role_follows_is_user_even_for_function_payloads() {
        let turns = vec![turn(
            false,
            Payload::FunctionResponse {
                name: "lookup".into(),
                response: json!({}),
            },
        )];
        assert_eq!(to_content_blocks(&turns)[0].role, Role::Model);
    }

    #[test]
    fn test_inline_image_becomes_inline_data() {
        let part = payload_to_part(&Payload::Image {
            uri: "file:///a.png".into(),
            mime_type: "image/png".into(),
            data: Some("QUJD".into()),
        });
        assert_eq!(part, Part::InlineData(InlineData::new("image/png", "QUJD")));
    }

    #[test]
    fn test_image_without_data_falls_back_to_serialized_text() {
        let part = payload_to_part(&Payload::Image {
            uri: "https://cdn.example/a.png".into(),
            mime_type: "image/png".into(),
            data: None,
        });
        match part {
            Part::Text(text) => {
                assert!(text.contains("\"type\":\"image\""));
                assert!(text.contains("https://cdn.example/a.png"));
            }
            other => panic!("expected text fallback, got {:?}", other),
        }
    }

    #[test]
    fn test_function_payloads() {
        let mut args = Map::new();
        args.insert("ingredient".into(), json!("saffron"));
        let call = payload_to_part(&Payload::FunctionCall {
            name: "findStoresWithIngredient".into(),
            args: args.clone(),
        });
        assert_eq!(
            call,
            Part::FunctionCall(FunctionCall::new("findStoresWithIngredient", args))
        );

        let response = payload_to_part(&Payload::FunctionResponse {
            name: "findStoresWithIngredient".into(),
            response: json!({"stores": []}),
        });
        assert!(matches!(response, Part::FunctionResponse(r) if r.name == "findStoresWithIngredient"));
    }

    #[test]
    fn test_structured_payload_serialized_as_text() {
        let part = payload_to_part(&Payload::Json {
            data: json!({"recipe": "Omelette"}),
        });
        assert_eq!(
            part,
            Part::Text(r#"{"type":"json","data":{"recipe":"Omelette"}}"#.to_string())
        );
    }

    #[test]
    fn test_append_text_and_attachment() {
        let new_turn = NewTurn::text("what is this?").with_attachment(InlineData::new("image/jpeg", "Zm9v"));
        let blocks = append_new_user_turn(Vec::new(), &new_turn);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].role, Role::User);
        assert_eq!(
            blocks[0].parts,
            vec![
                Part::Text("what is this?".into()),
                Part::InlineData(InlineData::new("image/jpeg", "Zm9v")),
            ]
        );
    }

    #[test]
    fn test_append_empty_turn_has_no_parts() {
        let blocks = append_new_user_turn(
            vec![ContentBlock::text(Role::Model, "earlier")],
            &NewTurn::default(),
        );
        assert_eq!(blocks.len(), 2);
        assert!(blocks[1].parts.is_empty());
    }
}
