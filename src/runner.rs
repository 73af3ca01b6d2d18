//! # Runner
//!
//! The orchestration engine. A run starts from one agent and an input string,
//! then loops:
//!
//! 1. the current agent takes a turn against the shared conversation,
//! 2. every step of the turn is charged to the turn budget,
//! 3. the turn's tool results are scanned for a handoff,
//! 4. on a handoff the target becomes the current agent and the loop goes on;
//!    otherwise the run is finished.
//!
//! [`Runner::run`] returns the [`FinalResult`] directly. [`Runner::run_stream`]
//! runs the same loop on a spawned task and reports progress as
//! [`StreamChunk`]s, with the result delivered separately.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agent_relay::{AgentRef, HandoffInstruction, RunOptions, Runner, ScriptedAgent};
//!
//! # async fn demo() -> agent_relay::Result<()> {
//! let analytics: AgentRef = Arc::new(ScriptedAgent::new("analytics").reply("About 18 months."));
//! let triage: AgentRef = Arc::new(
//!     ScriptedAgent::new("triage")
//!         .with_handoffs([analytics])
//!         .hand_off(HandoffInstruction::new("analytics").with_reason("forecast requested")),
//! );
//!
//! let runner = Runner::new();
//! let result = runner.run(triage, "What's my runway?", RunOptions::default()).await?;
//! assert_eq!(result.final_agent_name, "analytics");
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::agent::AgentRef;
use crate::config::RunnerConfig;
use crate::error::Result;
use crate::handoff::{find_handoff, scan_turn, HandoffInstruction};
use crate::items::{Generation, Message, Role};
use crate::registry::AgentRegistry;
use crate::result::FinalResult;
use crate::session::RunSession;
use crate::stream::{
    chunk_channel, result_channel, ChunkSink, OrchestrationStatus, StreamChunk, StreamFailure,
    StreamingRun,
};

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => {
            let mut out = s[..cut].to_string();
            out.push('…');
            out
        }
        None => s.to_string(),
    }
}

fn format_messages_for_log(messages: &[Message]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(idx, m)| {
            let label = match m.role {
                Role::System => "SYSTEM",
                Role::User => "USER",
                Role::Assistant => "ASSIST",
            };
            format!("{:02} {:<8} | {}", idx, label, truncate_for_log(&m.content, 160))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Called synchronously every time a handoff is detected.
pub type HandoffCallback = Arc<dyn Fn(&HandoffInstruction) + Send + Sync>;

/// Per-run options
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Overrides [`RunnerConfig::max_total_turns`] for this run.
    pub max_total_turns: Option<usize>,
    pub on_handoff: Option<HandoffCallback>,
    /// Messages placed in the conversation ahead of the input.
    pub initial_messages: Vec<Message>,
    pub cancellation: Option<CancellationToken>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_total_turns(mut self, turns: usize) -> Self {
        self.max_total_turns = Some(turns);
        self
    }

    pub fn on_handoff(mut self, callback: impl Fn(&HandoffInstruction) + Send + Sync + 'static) -> Self {
        self.on_handoff = Some(Arc::new(callback));
        self
    }

    pub fn with_initial_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.initial_messages = messages.into_iter().collect();
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    fn notify_handoff(&self, instruction: &HandoffInstruction) {
        if let Some(callback) = &self.on_handoff {
            callback(instruction);
        }
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("max_total_turns", &self.max_total_turns)
            .field("on_handoff", &self.on_handoff.is_some())
            .field("initial_messages", &self.initial_messages.len())
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

/// Where a run starts: an agent instance (registered on the spot, together
/// with everything it can hand off to) or the name of a registered agent.
#[derive(Clone)]
pub enum AgentTarget {
    Agent(AgentRef),
    Name(String),
}

impl AgentTarget {
    pub fn name(&self) -> &str {
        match self {
            Self::Agent(agent) => agent.name(),
            Self::Name(name) => name,
        }
    }
}

impl From<AgentRef> for AgentTarget {
    fn from(agent: AgentRef) -> Self {
        Self::Agent(agent)
    }
}

impl From<&AgentRef> for AgentTarget {
    fn from(agent: &AgentRef) -> Self {
        Self::Agent(agent.clone())
    }
}

impl From<&str> for AgentTarget {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for AgentTarget {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl fmt::Debug for AgentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent(agent) => f.debug_tuple("Agent").field(&agent.name()).finish(),
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
        }
    }
}

/// Drives agents through handoff-linked turns.
///
/// Cloning is cheap; clones share one registry.
#[derive(Clone, Default)]
pub struct Runner {
    registry: Arc<RwLock<AgentRegistry>>,
    config: RunnerConfig,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            registry: Arc::default(),
            config,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Registers `agent` and every agent reachable through its handoffs.
    pub fn register_agent(&self, agent: AgentRef) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register_reachable(agent);
    }

    pub fn register_agents(&self, agents: impl IntoIterator<Item = AgentRef>) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        for agent in agents {
            registry.register_reachable(agent);
        }
    }

    pub fn agent(&self, name: &str) -> Option<AgentRef> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(name)
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names()
    }

    /// Registers the starting agent's graph and takes the read-only registry
    /// snapshot the loop resolves handoffs against.
    fn prepare(&self, target: AgentTarget) -> Result<(AgentRef, AgentRegistry)> {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let start = match target {
            AgentTarget::Agent(agent) => agent,
            AgentTarget::Name(name) => registry.resolve(&name)?,
        };
        registry.register_reachable(start.clone());
        let snapshot = registry.clone();
        drop(registry);

        if self.config.validate_handoffs {
            snapshot.validate()?;
        }
        Ok((start, snapshot))
    }

    fn max_total_turns(&self, options: &RunOptions) -> usize {
        options
            .max_total_turns
            .unwrap_or(self.config.max_total_turns)
    }

    /// Runs to completion and returns the final result.
    ///
    /// Fails with [`crate::error::OrchestratorError::AgentNotFound`] when the starting
    /// agent or a handoff target is unknown, and with
    /// [`crate::error::OrchestratorError::TurnLimitExceeded`] when the step budget runs out.
    pub async fn run(
        &self,
        target: impl Into<AgentTarget>,
        input: impl Into<String>,
        options: RunOptions,
    ) -> Result<FinalResult> {
        let target = target.into();
        let input = input.into();
        let run_id = Uuid::new_v4();
        let span = info_span!("orchestration_run", %run_id, agent = %target.name());

        let outcome = match span.in_scope(|| self.prepare(target)) {
            Ok((start, registry)) => {
                self.drive(run_id, start, registry, input, options)
                    .instrument(span.clone())
                    .await
            }
            Err(err) => Err(err),
        };

        span.in_scope(|| match &outcome {
            Ok(result) => info!(
                final_agent = %result.final_agent_name,
                handoffs = result.handoff_count(),
                turns = result.turns_consumed,
                duration_ms = result.metadata.duration_ms,
                "run finished"
            ),
            Err(err) => error!(error = %err, "run failed"),
        });
        outcome
    }

    /// Blocking wrapper around [`run`](Self::run) on a fresh current-thread
    /// runtime. Must not be called from inside an async context.
    pub fn run_sync(
        &self,
        target: impl Into<AgentTarget>,
        input: impl Into<String>,
        options: RunOptions,
    ) -> Result<FinalResult> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run(target, input, options))
    }

    async fn drive(
        &self,
        run_id: Uuid,
        start: AgentRef,
        registry: AgentRegistry,
        input: String,
        options: RunOptions,
    ) -> Result<FinalResult> {
        let cancel = options.cancellation.clone().unwrap_or_default();
        let mut session = RunSession::new(
            run_id,
            start,
            self.max_total_turns(&options),
            options.initial_messages.clone(),
            input,
            Utc::now(),
        );
        info!(agents = registry.len(), "run started");

        loop {
            let turn = session.begin_turn(&cancel)?;
            let agent = session.current();
            debug!(agent = %agent.name(), turn, consumed = session.turns_consumed(), "starting turn");
            debug!(
                target: "runner::messages",
                "conversation before turn {}:\n{}",
                turn,
                format_messages_for_log(session.conversation().messages())
            );

            let generation = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(session.cancelled_at(turn)),
                res = agent.generate(session.conversation(), &cancel) => {
                    res.map_err(|source| session.execution_error(source))?
                }
            };
            session.record_generation(&generation);
            debug!(
                agent = %agent.name(),
                steps = generation.steps.len(),
                consumed = session.turns_consumed(),
                "turn complete"
            );

            match find_handoff(&generation.steps).cloned() {
                Some(instruction) => {
                    self.hand_off(&mut session, instruction, &registry, &options)?;
                }
                None => {
                    let text = generation.text.clone();
                    return Ok(session.finish(generation, text));
                }
            }
        }
    }

    fn hand_off(
        &self,
        session: &mut RunSession,
        instruction: HandoffInstruction,
        registry: &AgentRegistry,
        options: &RunOptions,
    ) -> Result<String> {
        options.notify_handoff(&instruction);
        let reason = instruction.reason.clone();
        let to = instruction.target_agent_name.clone();
        let from = session.apply_handoff(instruction, registry)?;
        info!(%from, %to, reason = reason.as_deref().unwrap_or(""), "handoff");
        Ok(from)
    }

    /// Starts a run on a spawned task and returns its event stream together
    /// with a future for the final result.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run_stream(
        &self,
        target: impl Into<AgentTarget>,
        input: impl Into<String>,
        options: RunOptions,
    ) -> StreamingRun {
        let target = target.into();
        let input = input.into();
        let run_id = Uuid::new_v4();
        let start_time = Utc::now();
        let (sink, events) = chunk_channel();
        let (mut slot, result) = result_channel(run_id, target.name(), start_time);
        let span = info_span!("orchestration_run", %run_id, agent = %target.name());

        let runner = self.clone();
        tokio::spawn(
            async move {
                let label = target.name().to_string();
                let (start, registry) = match runner.prepare(target) {
                    Ok(prepared) => prepared,
                    Err(err) => {
                        error!(error = %err, "run failed");
                        sink.emit(StreamChunk::error(label.clone(), err.to_string()));
                        slot.resolve(Err(StreamFailure::new(
                            err,
                            FinalResult::empty(run_id, label, start_time),
                        )));
                        return;
                    }
                };

                let cancel = options.cancellation.clone().unwrap_or_default();
                let mut session = RunSession::new(
                    run_id,
                    start,
                    runner.max_total_turns(&options),
                    options.initial_messages.clone(),
                    input,
                    start_time,
                );
                info!(agents = registry.len(), "streaming run started");

                let turns = runner.stream_turns(&mut session, &registry, &options, &sink, &cancel);
                let caught = AssertUnwindSafe(turns).catch_unwind().await;
                let outcome = match caught {
                    Ok(outcome) => outcome,
                    Err(payload) => {
                        let message = format!("agent panicked: {}", panic_message(&*payload));
                        Err(session.execution_error(message.into()))
                    }
                };

                match outcome {
                    Ok((generation, text)) => {
                        let agent = session.current_name().to_string();
                        let result = session.finish(generation, text);
                        info!(
                            final_agent = %agent,
                            handoffs = result.handoff_count(),
                            turns = result.turns_consumed,
                            "run finished"
                        );
                        sink.emit(StreamChunk::AgentComplete {
                            agent,
                            role: Role::Assistant,
                            final_output: result.text.clone(),
                        });
                        slot.resolve(Ok(result));
                    }
                    Err(err) => {
                        error!(error = %err, "run failed");
                        sink.emit(StreamChunk::error(session.current_name(), err.to_string()));
                        slot.resolve(Err(StreamFailure::new(err, session.partial())));
                    }
                }
            }
            .instrument(span),
        );

        StreamingRun {
            run_id,
            events,
            result,
        }
    }

    /// The streaming turn loop. Returns the terminal turn's generation and
    /// the text streamed for it.
    async fn stream_turns(
        &self,
        session: &mut RunSession,
        registry: &AgentRegistry,
        options: &RunOptions,
        sink: &ChunkSink,
        cancel: &CancellationToken,
    ) -> Result<(Generation, String)> {
        sink.emit(StreamChunk::status(
            session.current_name(),
            OrchestrationStatus::Planning,
        ));

        loop {
            let turn = session.begin_turn(cancel)?;
            let agent = session.current();
            let name = agent.name().to_string();
            debug!(agent = %name, turn, consumed = session.turns_consumed(), "starting streamed turn");
            debug!(
                target: "runner::messages",
                "conversation before turn {}:\n{}",
                turn,
                format_messages_for_log(session.conversation().messages())
            );

            sink.emit(StreamChunk::thinking(name.clone()));
            sink.emit(StreamChunk::status(name.clone(), OrchestrationStatus::Executing));

            let handle = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(session.cancelled_at(turn)),
                res = agent.stream(session.conversation(), cancel) => {
                    res.map_err(|source| session.execution_error(source))?
                }
            };
            let (mut text, completion) = handle.into_parts();

            let mut streamed = String::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(session.cancelled_at(turn)),
                    next = text.next() => next,
                };
                match next {
                    Some(Ok(delta)) => {
                        streamed.push_str(&delta);
                        sink.emit(StreamChunk::text_delta(name.clone(), delta));
                    }
                    Some(Err(source)) => return Err(session.execution_error(source)),
                    None => break,
                }
            }

            let generation = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(session.cancelled_at(turn)),
                res = completion => res.map_err(|source| session.execution_error(source))?,
            };
            session.record_generation(&generation);

            let scan = scan_turn(&generation.steps);
            for (call, result) in &scan.inspected {
                sink.emit(StreamChunk::ToolCall {
                    agent: name.clone(),
                    role: Role::Assistant,
                    call: (*call).clone(),
                });
                if let Some(result) = result {
                    sink.emit(StreamChunk::ToolResult {
                        agent: name.clone(),
                        role: Role::Assistant,
                        result: (*result).clone(),
                    });
                }
            }
            let handoff = scan.handoff.cloned();

            match handoff {
                Some(instruction) => {
                    let reason = instruction.reason.clone();
                    let context = instruction.context.clone();
                    let from = self.hand_off(session, instruction, registry, options)?;
                    let to = session.current_name().to_string();
                    sink.emit(StreamChunk::AgentSwitch {
                        agent: from.clone(),
                        role: Role::System,
                        from_agent: from,
                        to_agent: to.clone(),
                        reason,
                        context,
                    });
                    sink.emit(StreamChunk::status(to, OrchestrationStatus::Routing));
                }
                None => {
                    let text = if streamed.is_empty() {
                        generation.text.clone()
                    } else {
                        streamed
                    };
                    return Ok((generation, text));
                }
            }
        }
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("agents", &self.agent_names())
            .field("config", &self.config)
            .finish()
    }
}

impl From<RunnerConfig> for Runner {
    fn from(config: RunnerConfig) -> Self {
        Self::with_config(config)
    }
}
