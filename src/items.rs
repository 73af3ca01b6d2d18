//! Items representing messages, tool activity and agent generations
//!
//! This module defines the core data structures exchanged between the runner
//! and the agents it drives.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::handoff::{looks_like_handoff, HandoffInstruction};
use crate::usage::Usage;

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The ordered message log shared by every agent of a run.
///
/// Append-only: there is no way to remove, reorder or edit a message once it
/// has been pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl<'a> IntoIterator for &'a Conversation {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// A tool call made by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// What a tool produced. Handoffs are a distinct variant, so detecting one
/// is a tag check rather than a guess about the payload's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ToolOutput {
    Handoff(HandoffInstruction),
    Plain { output: Value },
}

impl ToolOutput {
    pub fn plain(output: Value) -> Self {
        Self::Plain { output }
    }

    pub fn handoff(instruction: HandoffInstruction) -> Self {
        Self::Handoff(instruction)
    }

    /// Adapter for tools that return untagged JSON: a payload carrying a
    /// string `targetAgentName` is read as a handoff, anything else is plain.
    pub fn from_json(value: Value) -> Self {
        if looks_like_handoff(&value) {
            match serde_json::from_value::<HandoffInstruction>(value.clone()) {
                Ok(instruction) => return Self::Handoff(instruction),
                Err(err) => {
                    tracing::debug!(error = %err, "handoff-shaped payload did not parse; treating as plain");
                }
            }
        }
        Self::Plain { output: value }
    }

    pub fn as_handoff(&self) -> Option<&HandoffInstruction> {
        match self {
            Self::Handoff(instruction) => Some(instruction),
            Self::Plain { .. } => None,
        }
    }

    pub fn is_handoff(&self) -> bool {
        self.as_handoff().is_some()
    }

    /// JSON view of the output as a tool consumer would see it.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Handoff(instruction) => {
                serde_json::to_value(instruction).unwrap_or(Value::Null)
            }
            Self::Plain { output } => output.clone(),
        }
    }
}

/// The result of a tool call, matched to its call by `tool_call_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub output: ToolOutput,
}

impl ToolResult {
    pub fn new(tool_call_id: impl Into<String>, name: impl Into<String>, output: ToolOutput) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            output,
        }
    }
}

/// One reasoning/tool-invocation unit inside a single `generate` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
}

impl Step {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Adds a tool call together with the result it produced.
    pub fn with_tool(mut self, call: ToolCall, output: ToolOutput) -> Self {
        self.tool_results
            .push(ToolResult::new(call.id.clone(), call.name.clone(), output));
        self.tool_calls.push(call);
        self
    }

    pub fn result_for(&self, tool_call_id: &str) -> Option<&ToolResult> {
        self.tool_results
            .iter()
            .find(|r| r.tool_call_id == tool_call_id)
    }

    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// What an agent returns from one `generate` call (one turn)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl Generation {
    /// A single-step generation carrying plain text and no tool calls.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            steps: vec![Step::text(text.clone())],
            text,
            finish_reason: Some("stop".to_string()),
            usage: Usage::default(),
        }
    }

    pub fn from_steps(steps: Vec<Step>) -> Self {
        let text = steps
            .iter()
            .filter_map(|s| s.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        let finish_reason = if steps.iter().any(|s| !s.tool_calls.is_empty()) {
            "tool-calls"
        } else {
            "stop"
        };
        Self {
            text,
            steps,
            finish_reason: Some(finish_reason.to_string()),
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        self.steps.iter().any(|s| !s.tool_calls.is_empty())
    }
}
