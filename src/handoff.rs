//! # Agent Handoffs
//!
//! A handoff transfers control of a run from the current agent to another
//! one. It is signalled through a tool result: when a tool call in a turn
//! produces a [`HandoffInstruction`], the runner switches the active agent
//! and carries the conversation over.
//!
//! ## Signalling a handoff
//!
//! Tool outputs are tagged ([`ToolOutput::Handoff`] vs [`ToolOutput::Plain`]),
//! so detection is a tag check. The dedicated [`HandoffTool`] produces the
//! handoff variant and is built from the target agent itself, so its target
//! name always matches a real agent:
//!
//! ```rust
//! use agent_relay::handoff::HandoffTool;
//! use agent_relay::mock::ScriptedAgent;
//!
//! let analytics = ScriptedAgent::new("analytics");
//! let tool = HandoffTool::to(&analytics, "Forecasts and runway projections");
//!
//! assert_eq!(tool.name(), "transfer_to_analytics");
//! assert_eq!(tool.target(), "analytics");
//! ```
//!
//! Tools that return untagged JSON still work through
//! [`ToolOutput::from_json`], which applies the structural
//! [`looks_like_handoff`] predicate. Any payload with a string
//! `targetAgentName` field is read as a handoff there, so tools that are not
//! meant to hand off must not use that field name.
//!
//! ## One handoff per turn
//!
//! [`scan_turn`] walks the steps of a turn in order and the tool calls of each
//! step in order. The first handoff found wins; tool calls after it are not
//! inspected.

use std::task::{Context, Poll};

use futures::future::{ready, Ready};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::{BoxError, Service};

use crate::agent::Agent;
use crate::items::{Message, Step, ToolCall, ToolOutput, ToolResult};

/// Instruction to hand the run over to another agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffInstruction {
    /// Name of the agent that takes over.
    #[serde(alias = "target_agent_name")]
    pub target_agent_name: String,

    /// Why the current agent is handing off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Anything the next agent should know that is not in the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl HandoffInstruction {
    pub fn new(target_agent_name: impl Into<String>) -> Self {
        Self {
            target_agent_name: target_agent_name.into(),
            reason: None,
            context: None,
        }
    }

    /// Sets the reason for the handoff.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the context passed to the target agent.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// The system message that carries this handoff into the next agent's
    /// view, or `None` when there is neither a reason nor a context to carry.
    pub fn to_system_message(&self, from_agent: &str) -> Option<Message> {
        let reason = self.reason.as_deref().filter(|r| !r.is_empty());
        let context = self.context.as_deref().filter(|c| !c.is_empty());
        if reason.is_none() && context.is_none() {
            return None;
        }

        let mut content = format!(
            "Handoff from {} to {}.",
            from_agent, self.target_agent_name
        );
        if let Some(reason) = reason {
            content.push_str(&format!(" Reason: {}.", reason.trim_end_matches('.')));
        }
        if let Some(context) = context {
            content.push_str(&format!(" Context: {}", context));
        }
        Some(Message::system(content))
    }
}

/// Structural check for untagged tool payloads: true only for a JSON object
/// carrying a string `targetAgentName` (or `target_agent_name`) field.
pub fn looks_like_handoff(payload: &Value) -> bool {
    payload.as_object().is_some_and(|obj| {
        ["targetAgentName", "target_agent_name"]
            .iter()
            .any(|key| obj.get(*key).is_some_and(Value::is_string))
    })
}

/// Tool activity of one turn, up to and including the first handoff.
#[derive(Debug, Default)]
pub struct TurnScan<'a> {
    /// Tool calls in execution order, each with its matching result if any.
    pub inspected: Vec<(&'a ToolCall, Option<&'a ToolResult>)>,
    /// The handoff that ends the turn, if one was found.
    pub handoff: Option<&'a HandoffInstruction>,
}

/// Scans the steps of a turn for the first handoff.
pub fn scan_turn(steps: &[Step]) -> TurnScan<'_> {
    let mut scan = TurnScan::default();
    for step in steps {
        for call in &step.tool_calls {
            let result = step.result_for(&call.id);
            scan.inspected.push((call, result));
            if let Some(instruction) = result.and_then(|r| r.output.as_handoff()) {
                scan.handoff = Some(instruction);
                return scan;
            }
        }
    }
    scan
}

/// The first handoff in a turn, if any.
pub fn find_handoff(steps: &[Step]) -> Option<&HandoffInstruction> {
    scan_turn(steps).handoff
}

/// Arguments accepted by a [`HandoffTool`].
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct HandoffArgs {
    /// Why control is being transferred.
    #[serde(default)]
    pub reason: Option<String>,
    /// Extra context for the receiving agent.
    #[serde(default)]
    pub context: Option<String>,
}

/// A tool whose only effect is to hand the run over to one fixed agent.
///
/// Calling it (as a Tower service) yields a [`ToolResult`] tagged as a
/// handoff. Agents advertise it to their model next to their regular tools.
#[derive(Debug, Clone)]
pub struct HandoffTool {
    name: String,
    description: String,
    target: String,
}

impl HandoffTool {
    /// Creates a handoff tool targeting `agent`, named `transfer_to_<name>`.
    pub fn to(agent: &dyn Agent, description: impl Into<String>) -> Self {
        let target = agent.name().to_string();
        Self {
            name: format!("transfer_to_{}", target),
            description: description.into(),
            target,
        }
    }

    /// Same as [`HandoffTool::to`] with a custom tool name.
    pub fn with_name(agent: &dyn Agent, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            target: agent.name().to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// JSON schema of the tool's arguments.
    pub fn parameters_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(HandoffArgs)).unwrap_or(Value::Null)
    }

    /// Executes the tool for a model-issued call.
    pub fn invoke(&self, call: &ToolCall) -> Result<ToolResult, BoxError> {
        if call.name != self.name {
            return Err(format!(
                "routed to wrong tool: expected={}, got={}",
                self.name, call.name
            )
            .into());
        }
        let args: HandoffArgs = if call.input.is_null() {
            HandoffArgs::default()
        } else {
            serde_json::from_value(call.input.clone())?
        };
        let instruction = HandoffInstruction {
            target_agent_name: self.target.clone(),
            reason: args.reason,
            context: args.context,
        };
        Ok(ToolResult::new(
            call.id.clone(),
            call.name.clone(),
            ToolOutput::Handoff(instruction),
        ))
    }
}

impl Service<ToolCall> for HandoffTool {
    type Response = ToolResult;
    type Error = BoxError;
    type Future = Ready<Result<ToolResult, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: ToolCall) -> Self::Future {
        ready(self.invoke(&call))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedAgent;
    use crate::items::Role;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tower::ServiceExt;

    fn handoff_step(id: &str, target: &str) -> Step {
        Step::default().with_tool(
            ToolCall::new(id, "route", json!({})),
            ToolOutput::handoff(HandoffInstruction::new(target)),
        )
    }

    fn plain_step(id: &str) -> Step {
        Step::default().with_tool(
            ToolCall::new(id, "fetch_balance", json!({})),
            ToolOutput::plain(json!({"balance": 10})),
        )
    }

    #[test]
    fn test_instruction_builder() {
        let instruction = HandoffInstruction::new("analytics")
            .with_reason("forecast requested")
            .with_context("user is on the growth plan");

        assert_eq!(instruction.target_agent_name, "analytics");
        assert_eq!(instruction.reason.as_deref(), Some("forecast requested"));
        assert_eq!(instruction.context.as_deref(), Some("user is on the growth plan"));
    }

    #[test]
    fn test_instruction_serialization() {
        let instruction = HandoffInstruction::new("analytics").with_reason("forecast requested");
        let value = serde_json::to_value(&instruction).unwrap();
        assert_eq!(
            value,
            json!({"targetAgentName": "analytics", "reason": "forecast requested"})
        );

        let snake: HandoffInstruction =
            serde_json::from_value(json!({"target_agent_name": "reports"})).unwrap();
        assert_eq!(snake, HandoffInstruction::new("reports"));
    }

    #[test]
    fn test_system_message_carries_reason_and_context() {
        let msg = HandoffInstruction::new("analytics")
            .with_reason("forecast requested")
            .with_context("runway question")
            .to_system_message("triage")
            .unwrap();
        assert_eq!(msg.role, Role::System);
        assert_eq!(
            msg.content,
            "Handoff from triage to analytics. Reason: forecast requested. Context: runway question"
        );

        assert!(HandoffInstruction::new("analytics")
            .to_system_message("triage")
            .is_none());
    }

    #[test]
    fn test_looks_like_handoff() {
        assert!(looks_like_handoff(&json!({"targetAgentName": "a"})));
        assert!(looks_like_handoff(&json!({"target_agent_name": "a", "reason": "r"})));
        assert!(!looks_like_handoff(&json!({"targetAgentName": null})));
        assert!(!looks_like_handoff(&json!(["targetAgentName"])));
        assert!(!looks_like_handoff(&json!("targetAgentName")));
        assert!(!looks_like_handoff(&json!({"agent": "a"})));
    }

    #[test]
    fn test_scan_stops_at_first_handoff() {
        let steps = vec![
            plain_step("c1"),
            Step::default()
                .with_tool(
                    ToolCall::new("c2", "route", json!({})),
                    ToolOutput::handoff(HandoffInstruction::new("analytics")),
                )
                .with_tool(
                    ToolCall::new("c3", "route", json!({})),
                    ToolOutput::handoff(HandoffInstruction::new("reports")),
                ),
            handoff_step("c4", "billing"),
        ];

        let scan = scan_turn(&steps);
        assert_eq!(scan.handoff.unwrap().target_agent_name, "analytics");
        let ids: Vec<&str> = scan.inspected.iter().map(|(c, _)| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[test]
    fn test_scan_without_handoff_inspects_everything() {
        let steps = vec![plain_step("c1"), Step::text("no tools"), plain_step("c2")];
        let scan = scan_turn(&steps);
        assert!(scan.handoff.is_none());
        assert_eq!(scan.inspected.len(), 2);
        assert!(find_handoff(&steps).is_none());
    }

    #[test]
    fn test_scan_matches_results_by_call_id() {
        // result listed before its call, and a call with no result at all
        let step = Step {
            text: None,
            tool_calls: vec![
                ToolCall::new("a", "fetch", json!({})),
                ToolCall::new("b", "route", json!({})),
            ],
            tool_results: vec![ToolResult::new(
                "b",
                "route",
                ToolOutput::handoff(HandoffInstruction::new("reports")),
            )],
        };
        let steps = [step];
        let scan = scan_turn(&steps);
        assert!(scan.inspected[0].1.is_none());
        assert_eq!(scan.handoff.unwrap().target_agent_name, "reports");
    }

    #[test]
    fn test_handoff_tool_metadata() {
        let analytics = ScriptedAgent::new("analytics");
        let tool = HandoffTool::to(&analytics, "Forecasting specialist");
        assert_eq!(tool.name(), "transfer_to_analytics");
        assert_eq!(tool.description(), "Forecasting specialist");

        let schema = tool.parameters_schema();
        assert!(schema["properties"].get("reason").is_some());
        assert!(schema["properties"].get("context").is_some());

        let custom = HandoffTool::with_name(&analytics, "escalate", "Escalate");
        assert_eq!(custom.name(), "escalate");
        assert_eq!(custom.target(), "analytics");
    }

    #[tokio::test]
    async fn test_handoff_tool_as_service() {
        let analytics = ScriptedAgent::new("analytics");
        let tool = HandoffTool::to(&analytics, "Forecasting specialist");

        let call = ToolCall::new(
            "call_1",
            "transfer_to_analytics",
            json!({"reason": "forecast requested"}),
        );
        let result = tool.clone().oneshot(call).await.unwrap();
        assert_eq!(result.tool_call_id, "call_1");
        assert_eq!(
            result.output,
            ToolOutput::handoff(HandoffInstruction::new("analytics").with_reason("forecast requested"))
        );

        let wrong = ToolCall::new("call_2", "other", json!({}));
        assert!(tool.oneshot(wrong).await.is_err());
    }

    #[test]
    fn test_handoff_tool_rejects_bad_arguments() {
        let analytics = ScriptedAgent::new("analytics");
        let tool = HandoffTool::to(&analytics, "Forecasting specialist");
        let call = ToolCall::new("c", "transfer_to_analytics", json!({"reason": 42}));
        assert!(tool.invoke(&call).is_err());

        let no_args = ToolCall::new("c", "transfer_to_analytics", Value::Null);
        let result = tool.invoke(&no_args).unwrap();
        assert_eq!(
            result.output.as_handoff().unwrap(),
            &HandoffInstruction::new("analytics")
        );
    }
}
