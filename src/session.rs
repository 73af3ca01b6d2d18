//! Per-run bookkeeping shared by the blocking and streaming loops.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use uuid::Uuid;

use crate::agent::AgentRef;
use crate::error::{OrchestratorError, Result};
use crate::handoff::HandoffInstruction;
use crate::items::{Conversation, Generation, Message};
use crate::registry::AgentRegistry;
use crate::result::{FinalResult, RunMetadata};
use crate::usage::UsageStats;

/// State of one run, from the first turn until it returns or fails.
///
/// `turns_consumed` only grows and `handoff_history` only appends.
pub(crate) struct RunSession {
    run_id: Uuid,
    current: AgentRef,
    max_total_turns: usize,
    turns_consumed: usize,
    iteration: usize,
    conversation: Conversation,
    handoff_history: Vec<HandoffInstruction>,
    usage: UsageStats,
    start_time: DateTime<Utc>,
}

impl RunSession {
    /// Seeds the conversation with `initial_messages`, then the input as one
    /// user message when it is non-empty.
    pub(crate) fn new(
        run_id: Uuid,
        start: AgentRef,
        max_total_turns: usize,
        initial_messages: Vec<Message>,
        input: String,
        start_time: DateTime<Utc>,
    ) -> Self {
        let mut conversation = Conversation::from(initial_messages);
        if !input.is_empty() {
            conversation.push(Message::user(input));
        }
        Self {
            run_id,
            current: start,
            max_total_turns,
            turns_consumed: 0,
            iteration: 0,
            conversation,
            handoff_history: Vec::new(),
            usage: UsageStats::new(),
            start_time,
        }
    }

    pub(crate) fn current(&self) -> AgentRef {
        self.current.clone()
    }

    pub(crate) fn current_name(&self) -> &str {
        self.current.name()
    }

    pub(crate) fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub(crate) fn turns_consumed(&self) -> usize {
        self.turns_consumed
    }

    /// Gate in front of every turn: fails when the caller cancelled or the
    /// step budget is spent, otherwise returns the 1-based turn number.
    pub(crate) fn begin_turn(&mut self, cancel: &CancellationToken) -> Result<usize> {
        if cancel.is_cancelled() {
            return Err(self.cancelled_at(self.iteration + 1));
        }
        if self.turns_consumed >= self.max_total_turns {
            return Err(OrchestratorError::TurnLimitExceeded {
                max_turns: self.max_total_turns,
                consumed: self.turns_consumed,
            });
        }
        self.iteration += 1;
        Ok(self.iteration)
    }

    /// Charges the turn's steps to the budget and appends its assistant text.
    pub(crate) fn record_generation(&mut self, generation: &Generation) {
        self.turns_consumed += generation.steps.len();
        self.usage.record(self.current.name(), generation.usage);

        let mut appended = false;
        for text in generation
            .steps
            .iter()
            .filter_map(|s| s.text.as_deref())
            .filter(|t| !t.is_empty())
        {
            self.conversation.push(Message::assistant(text));
            appended = true;
        }
        if !appended && !generation.text.is_empty() {
            self.conversation.push(Message::assistant(generation.text.clone()));
        }
    }

    /// Switches to the handoff target. Returns the name of the agent that
    /// handed off.
    pub(crate) fn apply_handoff(
        &mut self,
        instruction: HandoffInstruction,
        registry: &AgentRegistry,
    ) -> Result<String> {
        let target = registry.resolve(&instruction.target_agent_name)?;
        let from = self.current.name().to_string();
        if let Some(message) = instruction.to_system_message(&from) {
            self.conversation.push(message);
        }
        self.handoff_history.push(instruction);
        self.current = target;
        Ok(from)
    }

    pub(crate) fn execution_error(&self, source: BoxError) -> OrchestratorError {
        OrchestratorError::AgentExecution {
            agent: self.current.name().to_string(),
            turn: self.iteration,
            source,
        }
    }

    pub(crate) fn cancelled_at(&self, turn: usize) -> OrchestratorError {
        OrchestratorError::Cancelled {
            agent: self.current.name().to_string(),
            turn,
        }
    }

    /// Result of a run whose last turn did not hand off.
    pub(crate) fn finish(self, generation: Generation, text: String) -> FinalResult {
        FinalResult {
            run_id: self.run_id,
            text,
            final_agent_name: self.current.name().to_string(),
            handoff_history: self.handoff_history,
            steps: generation.steps,
            finish_reason: generation.finish_reason,
            usage: self.usage,
            turns_consumed: self.turns_consumed,
            conversation: self.conversation.into_messages(),
            metadata: RunMetadata::finished(self.start_time),
        }
    }

    /// Best-effort result for a run that failed part way.
    pub(crate) fn partial(&self) -> FinalResult {
        FinalResult {
            handoff_history: self.handoff_history.clone(),
            usage: self.usage.clone(),
            turns_consumed: self.turns_consumed,
            conversation: self.conversation.messages().to_vec(),
            ..FinalResult::empty(self.run_id, self.current.name(), self.start_time)
        }
    }
}
