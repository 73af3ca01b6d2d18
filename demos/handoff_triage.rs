//! Triage desk: a router hands a runway question to an analytics agent.
//!
//! Runs the same scenario twice, once blocking and once streaming.
//!
//! ```text
//! RUST_LOG=agent_relay=debug cargo run --example handoff_triage
//! ```

use std::sync::Arc;

use agent_relay::{
    AgentRef, HandoffInstruction, Message, RunOptions, Runner, ScriptedAgent, StreamChunk,
};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

fn build_agents() -> AgentRef {
    let analytics: AgentRef = Arc::new(
        ScriptedAgent::new("analytics")
            .reply("At a 40k monthly burn and 720k in the bank, you have about 18 months of runway."),
    );
    let billing: AgentRef =
        Arc::new(ScriptedAgent::new("billing").reply("Your last invoice was paid on the 3rd."));

    Arc::new(
        ScriptedAgent::new("triage")
            .with_handoffs([analytics, billing])
            .hand_off(
                HandoffInstruction::new("analytics")
                    .with_reason("forecast requested")
                    .with_context("customer is on the growth plan"),
            ),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agent_relay=info")),
        )
        .with_target(false)
        .init();

    let options = RunOptions::new()
        .with_initial_messages([Message::system("You are a finance assistant.")])
        .on_handoff(|h| println!("  -> handing off to {}", h.target_agent_name));

    println!("=== Blocking run ===");
    let result = Runner::new()
        .run(build_agents(), "What's my runway?", options.clone())
        .await?;
    println!("{}: {}", result.final_agent_name, result.text);
    println!("path: triage -> {}", result.handoff_path().join(" -> "));
    println!("{}", result.usage.summary());

    println!("=== Streaming run ===");
    // fresh runner: the new agents reuse the same names
    let run = Runner::new().run_stream(build_agents(), "What's my runway?", options);
    let (mut events, result) = run.into_parts();
    while let Some(chunk) = events.next().await {
        match &chunk {
            StreamChunk::TextDelta { text, .. } => print!("{}", text),
            StreamChunk::AgentComplete { .. } => println!(),
            other => println!("[{}] {}", other.agent(), serde_json::to_string(other)?),
        }
    }

    match result.await {
        Ok(result) => println!("final agent: {}", result.final_agent_name),
        Err(failure) => println!("run failed: {} (after {} handoffs)", failure, failure.partial.handoff_count()),
    }
    Ok(())
}
