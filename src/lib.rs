//! # agent-relay
//!
//! Turn-bounded orchestration of multiple agents that pass control to each
//! other through explicit handoffs.
//!
//! ## Core Concepts
//!
//! - **Agent**: anything implementing [`Agent`]; it generates against a model
//!   and declares which agents it may hand off to
//! - **Handoff**: a tool result tagged as a [`HandoffInstruction`]; the
//!   runner switches to the named agent and keeps the conversation
//! - **Turn budget**: every step of every turn counts against
//!   `max_total_turns`, so handoff loops always terminate
//! - **Two modes**: [`Runner::run`] returns the [`FinalResult`];
//!   [`Runner::run_stream`] yields [`StreamChunk`]s live and resolves the
//!   result through a separate future
//!
//! ## Getting Started
//!
//! ```rust
//! use std::sync::Arc;
//! use agent_relay::{AgentRef, HandoffInstruction, RunOptions, Runner, ScriptedAgent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> agent_relay::Result<()> {
//! let analytics: AgentRef = Arc::new(ScriptedAgent::new("analytics").reply("About 18 months."));
//! let triage: AgentRef = Arc::new(
//!     ScriptedAgent::new("triage")
//!         .with_handoffs([analytics])
//!         .hand_off(HandoffInstruction::new("analytics").with_reason("forecast requested")),
//! );
//!
//! let runner = Runner::new();
//! let result = runner.run(triage, "What's my runway?", RunOptions::default()).await?;
//!
//! assert_eq!(result.final_agent_name, "analytics");
//! assert_eq!(result.text, "About 18 months.");
//! assert_eq!(result.handoff_history.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod handoff;
pub mod items;
pub mod mock;
pub mod registry;
pub mod result;
pub mod runner;
pub mod service;
pub mod stream;
pub mod usage;

mod session;

pub use agent::{Agent, AgentRef, AgentStream};
pub use config::{ConfigBuilder, RunnerConfig};
pub use error::{OrchestratorError, Result};
pub use handoff::{HandoffInstruction, HandoffTool};
pub use items::{Conversation, Generation, Message, Role, Step, ToolCall, ToolOutput, ToolResult};
pub use mock::ScriptedAgent;
pub use registry::AgentRegistry;
pub use result::{FinalResult, RunMetadata};
pub use runner::{AgentTarget, HandoffCallback, RunOptions, Runner};
pub use service::RunRequest;
pub use stream::{OrchestrationStatus, ResultFuture, StreamChunk, StreamFailure, StreamingRun};
pub use usage::{Usage, UsageStats};

// Re-export what callers need to implement and drive agents
pub use tokio_util::sync::CancellationToken;
pub use tower::{BoxError, Service, ServiceExt};
