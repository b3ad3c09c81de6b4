//! Tool-call round trip.
//!
//! ```text
//! Idle → AwaitingModelReply ─┬─► PlainAnswer ───────────────────────────────► Done
//!                            └─► ToolRequested → Executing
//!                                  → AwaitingModelReply (tool result appended,
//!                                    tool invocation disabled) → PlainAnswer → Done
//! ```
//!
//! At most one tool call is executed per orchestrated call. A second call
//! request on the resend is [`Error::ToolLoopDetected`]; a call for a tool
//! that was not declared or that the executor does not know is
//! [`Error::UnknownTool`]. Neither is retried.

use crate::compose::{RequestEnvelope, RequestOptions, ToolInvocationMode, compose, compose_contents};
use crate::logging::DiagnosticSink;
use crate::tools::ToolExecutor;
use crate::translate::{append_new_user_turn, payload_to_part, to_content_blocks};
use crate::types::{ContentBlock, NewTurn, Outcome, Payload, Role, Turn};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

const TARGET: &str = "nutriplanner_ai::orchestrator";

/// Sends one composed request and interprets the reply.
#[async_trait]
pub trait EnvelopeSender: Send + Sync {
    async fn send(&self, envelope: &RequestEnvelope) -> Result<Outcome>;
}

/// Where an orchestrated call currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCallState {
    Idle,
    AwaitingModelReply { resend: bool },
    Executing { name: String },
    Done,
}

/// Synthetic turns created for an executed tool call.
///
/// They are not written anywhere; the caller may persist them.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRoundTrip {
    pub call: Turn,
    pub response: Turn,
}

/// Final result of an orchestrated call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRun {
    pub outcome: Outcome,
    pub round_trip: Option<ToolRoundTrip>,
}

/// Drives one request through at most one tool round trip.
pub struct ToolOrchestrator<'a> {
    sender: &'a dyn EnvelopeSender,
    sink: &'a dyn DiagnosticSink,
    state: ToolCallState,
}

impl<'a> ToolOrchestrator<'a> {
    pub fn new(sender: &'a dyn EnvelopeSender, sink: &'a dyn DiagnosticSink) -> Self {
        Self {
            sender,
            sink,
            state: ToolCallState::Idle,
        }
    }

    pub fn state(&self) -> &ToolCallState {
        &self.state
    }

    pub async fn run(
        &mut self,
        history: &[Turn],
        new_turn: &NewTurn,
        executor: &dyn ToolExecutor,
        options: &RequestOptions,
    ) -> Result<ToolRun> {
        self.transition(ToolCallState::AwaitingModelReply { resend: false });
        let first = self.sender.send(&compose(history, new_turn, options)).await?;

        let (name, args) = match first {
            Outcome::FunctionCallRequested { name, args } => (name, args),
            outcome => {
                self.transition(ToolCallState::Done);
                return Ok(ToolRun {
                    outcome,
                    round_trip: None,
                });
            }
        };

        if let Some(declared) = &options.tools {
            if !declared.iter().any(|declaration| declaration.name == name) {
                self.sink
                    .error(TARGET, &format!("Model requested undeclared tool '{}'", name));
                return Err(Error::UnknownTool(name));
            }
        }

        self.transition(ToolCallState::Executing { name: name.clone() });
        self.sink.info(TARGET, &format!("Executing tool '{}'", name));
        let result = executor.execute(&name, &args).await?;

        let round_trip = synthetic_turns(history, name, args, result);
        let resend = resend_envelope(history, new_turn, &round_trip, options);

        self.transition(ToolCallState::AwaitingModelReply { resend: true });
        let outcome = self.sender.send(&resend).await?;

        if let Outcome::FunctionCallRequested { name, .. } = outcome {
            self.sink.error(
                TARGET,
                &format!("Model requested '{}' after receiving a tool response", name),
            );
            return Err(Error::ToolLoopDetected(name));
        }

        self.transition(ToolCallState::Done);
        Ok(ToolRun {
            outcome,
            round_trip: Some(round_trip),
        })
    }

    fn transition(&mut self, next: ToolCallState) {
        self.sink
            .debug(TARGET, &format!("{:?} -> {:?}", self.state, next));
        self.state = next;
    }
}

fn synthetic_turns(history: &[Turn], name: String, args: Map<String, Value>, result: Value) -> ToolRoundTrip {
    let conversation_id = history
        .last()
        .map(|turn| turn.conversation_id.clone())
        .unwrap_or_default();

    let response = json!({"name": name, "content": result});
    ToolRoundTrip {
        call: Turn::model(
            conversation_id.clone(),
            Payload::FunctionCall {
                name: name.clone(),
                args,
            },
        ),
        response: Turn::model(conversation_id, Payload::FunctionResponse { name, response }),
    }
}

/// Original history and new input, then the call (`model`) and its result (`function`).
fn resend_envelope(
    history: &[Turn],
    new_turn: &NewTurn,
    round_trip: &ToolRoundTrip,
    options: &RequestOptions,
) -> RequestEnvelope {
    let mut contents = append_new_user_turn(to_content_blocks(history), new_turn);
    contents.push(ContentBlock::new(
        Role::Model,
        vec![payload_to_part(round_trip.call.content())],
    ));
    contents.push(ContentBlock::new(
        Role::Function,
        vec![payload_to_part(round_trip.response.content())],
    ));

    let resend_options = options
        .clone()
        .tool_invocation_mode(ToolInvocationMode::Disabled);
    compose_contents(contents, &resend_options)
}
