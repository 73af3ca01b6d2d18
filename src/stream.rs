//! # Streaming runs
//!
//! A streaming run hands the caller two views of one execution:
//!
//! - `events`: live [`StreamChunk`]s in execution order, ending with exactly
//!   one `agent-complete` or `error` chunk.
//! - `result`: a [`ResultFuture`] that resolves once, after the terminal chunk
//!   has been sent.
//!
//! Either view can be ignored. The run task never waits on the event
//! consumer, and dropping the events stream does not stop the run.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::items::{Role, ToolCall, ToolResult};
use crate::result::FinalResult;

/// Coarse progress marker emitted by the runner itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestrationStatus {
    Planning,
    Executing,
    Routing,
}

/// One event of a streaming run.
///
/// Every chunk names the agent it concerns and the role it speaks as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StreamChunk {
    OrchestrationStatus {
        agent: String,
        role: Role,
        status: OrchestrationStatus,
    },
    AgentThinking {
        agent: String,
        role: Role,
    },
    TextDelta {
        agent: String,
        role: Role,
        text: String,
    },
    ToolCall {
        agent: String,
        role: Role,
        call: ToolCall,
    },
    ToolResult {
        agent: String,
        role: Role,
        result: ToolResult,
    },
    AgentSwitch {
        agent: String,
        role: Role,
        from_agent: String,
        to_agent: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    AgentComplete {
        agent: String,
        role: Role,
        final_output: String,
    },
    Error {
        agent: String,
        role: Role,
        message: String,
    },
}

impl StreamChunk {
    /// The wire tag of the chunk, e.g. `"text-delta"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrchestrationStatus { .. } => "orchestration-status",
            Self::AgentThinking { .. } => "agent-thinking",
            Self::TextDelta { .. } => "text-delta",
            Self::ToolCall { .. } => "tool-call",
            Self::ToolResult { .. } => "tool-result",
            Self::AgentSwitch { .. } => "agent-switch",
            Self::AgentComplete { .. } => "agent-complete",
            Self::Error { .. } => "error",
        }
    }

    pub fn agent(&self) -> &str {
        match self {
            Self::OrchestrationStatus { agent, .. }
            | Self::AgentThinking { agent, .. }
            | Self::TextDelta { agent, .. }
            | Self::ToolCall { agent, .. }
            | Self::ToolResult { agent, .. }
            | Self::AgentSwitch { agent, .. }
            | Self::AgentComplete { agent, .. }
            | Self::Error { agent, .. } => agent,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::OrchestrationStatus { role, .. }
            | Self::AgentThinking { role, .. }
            | Self::TextDelta { role, .. }
            | Self::ToolCall { role, .. }
            | Self::ToolResult { role, .. }
            | Self::AgentSwitch { role, .. }
            | Self::AgentComplete { role, .. }
            | Self::Error { role, .. } => *role,
        }
    }

    /// `agent-complete` and `error` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AgentComplete { .. } | Self::Error { .. })
    }

    pub fn status(agent: impl Into<String>, status: OrchestrationStatus) -> Self {
        Self::OrchestrationStatus {
            agent: agent.into(),
            role: Role::System,
            status,
        }
    }

    pub fn thinking(agent: impl Into<String>) -> Self {
        Self::AgentThinking {
            agent: agent.into(),
            role: Role::Assistant,
        }
    }

    pub fn text_delta(agent: impl Into<String>, text: impl Into<String>) -> Self {
        Self::TextDelta {
            agent: agent.into(),
            role: Role::Assistant,
            text: text.into(),
        }
    }

    pub fn error(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            agent: agent.into(),
            role: Role::System,
            message: message.into(),
        }
    }
}

/// A streaming run that did not reach a terminal turn.
///
/// `partial` holds whatever the run had accumulated when it failed: the
/// handoffs taken, usage so far and the conversation.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct StreamFailure {
    #[source]
    pub error: OrchestratorError,
    pub partial: Box<FinalResult>,
}

impl StreamFailure {
    pub fn new(error: OrchestratorError, partial: FinalResult) -> Self {
        Self {
            error,
            partial: Box::new(partial),
        }
    }
}

pub type RunOutcome = Result<FinalResult, StreamFailure>;

/// Resolves to the outcome of a streaming run.
///
/// Backed by a oneshot channel, so awaiting it never polls on a timer. If the
/// run task goes away without resolving, the future yields
/// [`OrchestratorError::Aborted`].
#[must_use = "futures do nothing unless polled"]
pub struct ResultFuture {
    rx: oneshot::Receiver<RunOutcome>,
    run_id: Uuid,
    agent: String,
    start_time: DateTime<Utc>,
}

impl Future for ResultFuture {
    type Output = RunOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(StreamFailure::new(
                OrchestratorError::Aborted,
                FinalResult::empty(self.run_id, self.agent.clone(), self.start_time),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for ResultFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultFuture")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

/// Write side of a [`ResultFuture`]. The first resolution wins; later ones
/// are ignored.
pub(crate) struct ResultSlot {
    tx: Option<oneshot::Sender<RunOutcome>>,
}

impl ResultSlot {
    pub(crate) fn resolve(&mut self, outcome: RunOutcome) -> bool {
        match self.tx.take() {
            // a dropped ResultFuture just means nobody wants the result
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

pub(crate) fn result_channel(
    run_id: Uuid,
    agent: impl Into<String>,
    start_time: DateTime<Utc>,
) -> (ResultSlot, ResultFuture) {
    let (tx, rx) = oneshot::channel();
    (
        ResultSlot { tx: Some(tx) },
        ResultFuture {
            rx,
            run_id,
            agent: agent.into(),
            start_time,
        },
    )
}

/// Producer side of the event stream.
#[derive(Clone)]
pub(crate) struct ChunkSink {
    tx: mpsc::UnboundedSender<StreamChunk>,
}

impl ChunkSink {
    pub(crate) fn emit(&self, chunk: StreamChunk) {
        // the consumer may have dropped the stream; the run carries on
        let _ = self.tx.send(chunk);
    }
}

pub(crate) fn chunk_channel() -> (ChunkSink, BoxStream<'static, StreamChunk>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChunkSink { tx }, UnboundedReceiverStream::new(rx).boxed())
}

/// Handle to a run started with [`Runner::run_stream`](crate::runner::Runner::run_stream).
pub struct StreamingRun {
    pub run_id: Uuid,
    pub events: BoxStream<'static, StreamChunk>,
    pub result: ResultFuture,
}

impl StreamingRun {
    pub fn into_parts(self) -> (BoxStream<'static, StreamChunk>, ResultFuture) {
        (self.events, self.result)
    }

    /// Drains every event, then awaits the result.
    pub async fn collect(self) -> (Vec<StreamChunk>, RunOutcome) {
        let events: Vec<StreamChunk> = self.events.collect().await;
        let outcome = self.result.await;
        (events, outcome)
    }
}

impl std::fmt::Debug for StreamingRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingRun")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}
