//! Deterministic agents for tests, benchmarks and demos.
//!
//! A [`ScriptedAgent`] answers each turn from a queue of prepared turns
//! instead of calling a model. Once the queue is empty it keeps answering with
//! its fallback turn.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower::BoxError;

use crate::agent::{Agent, AgentRef, AgentStream};
use crate::handoff::HandoffInstruction;
use crate::items::{Conversation, Generation, Step, ToolCall, ToolOutput};
use crate::usage::Usage;

#[derive(Debug, Clone)]
enum ScriptedTurn {
    Respond(Generation),
    Fail(String),
}

/// An agent that replays scripted turns.
pub struct ScriptedAgent {
    name: String,
    handoffs: RwLock<Vec<AgentRef>>,
    script: Mutex<VecDeque<ScriptedTurn>>,
    fallback: ScriptedTurn,
    latency: Option<Duration>,
    seen: Mutex<Vec<Conversation>>,
}

impl ScriptedAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handoffs: RwLock::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            fallback: ScriptedTurn::Respond(Generation::text("Default response")),
            latency: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Declares the agents this one may hand off to.
    pub fn with_handoffs(self, agents: impl IntoIterator<Item = AgentRef>) -> Self {
        self.set_handoffs(agents);
        self
    }

    /// Replaces the declared handoffs after construction, which is how
    /// cyclic graphs are wired.
    pub fn set_handoffs(&self, agents: impl IntoIterator<Item = AgentRef>) {
        let mut handoffs = self.handoffs.write().unwrap_or_else(PoisonError::into_inner);
        *handoffs = agents.into_iter().collect();
    }

    /// Queues a full generation for the next unanswered turn.
    pub fn respond(self, generation: Generation) -> Self {
        self.push(ScriptedTurn::Respond(generation));
        self
    }

    /// Queues a single-step text reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.respond(Generation::text(text))
    }

    /// Queues a turn whose only step calls `transfer_to_<target>` and
    /// returns a handoff to `target`.
    pub fn hand_off(self, instruction: HandoffInstruction) -> Self {
        let generation = Generation::from_steps(vec![handoff_step(&instruction)]);
        self.respond(generation)
    }

    /// Queues a failing turn.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(ScriptedTurn::Fail(message.into()));
        self
    }

    /// Turn used once the script runs out.
    pub fn otherwise(mut self, generation: Generation) -> Self {
        self.fallback = ScriptedTurn::Respond(generation);
        self
    }

    /// Once the script runs out, hand off to `instruction`'s target forever.
    pub fn otherwise_hand_off(self, instruction: HandoffInstruction) -> Self {
        let generation = Generation::from_steps(vec![handoff_step(&instruction)]);
        self.otherwise(generation)
    }

    /// Delay applied before each answer. Cancellation interrupts it.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Conversations this agent was called with, in call order.
    pub fn seen(&self) -> Vec<Conversation> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn push(&self, turn: ScriptedTurn) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(turn);
    }

    async fn next_turn(
        &self,
        conversation: &Conversation,
        cancel: &CancellationToken,
    ) -> Result<Generation, BoxError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conversation.clone());

        if let Some(latency) = self.latency {
            tokio::select! {
                _ = cancel.cancelled() => return Err("cancelled".into()),
                _ = tokio::time::sleep(latency) => {}
            }
        }

        let turn = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match turn {
            ScriptedTurn::Respond(mut generation) => {
                if generation.usage.is_empty() {
                    generation.usage = Usage::new(10, 5);
                }
                Ok(generation)
            }
            ScriptedTurn::Fail(message) => Err(message.into()),
        }
    }
}

fn handoff_step(instruction: &HandoffInstruction) -> Step {
    let tool_name = format!("transfer_to_{}", instruction.target_agent_name);
    let mut input = json!({});
    if let Some(reason) = &instruction.reason {
        input["reason"] = json!(reason);
    }
    if let Some(context) = &instruction.context {
        input["context"] = json!(context);
    }
    Step::default().with_tool(
        ToolCall::new(format!("call_{}", uuid::Uuid::new_v4().simple()), tool_name, input),
        ToolOutput::Handoff(instruction.clone()),
    )
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        conversation: &Conversation,
        cancel: &CancellationToken,
    ) -> Result<Generation, BoxError> {
        self.next_turn(conversation, cancel).await
    }

    /// Streams the scripted text word by word.
    async fn stream(
        &self,
        conversation: &Conversation,
        cancel: &CancellationToken,
    ) -> Result<AgentStream, BoxError> {
        let generation = self.next_turn(conversation, cancel).await?;
        let deltas: Vec<Result<String, BoxError>> = generation
            .text
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(AgentStream::new(
            stream::iter(deltas).boxed(),
            futures::future::ready(Ok(generation)).boxed(),
        ))
    }

    fn handoffs(&self) -> Vec<AgentRef> {
        self.handoffs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for ScriptedAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handoffs: Vec<String> = self.handoffs().iter().map(|a| a.name().to_string()).collect();
        f.debug_struct("ScriptedAgent")
            .field("name", &self.name)
            .field("handoffs", &handoffs)
            .finish()
    }
}
