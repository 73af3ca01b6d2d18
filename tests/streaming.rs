//! Streaming-mode runs: chunk order, terminal events and the result future.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_relay::{
    Agent, AgentRef, AgentStream, BoxError, CancellationToken, Conversation, Generation,
    HandoffInstruction, Message, OrchestrationStatus, OrchestratorError, Role, RunOptions, Runner,
    ScriptedAgent, StreamChunk,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use pretty_assertions::assert_eq;

fn kinds(chunks: &[StreamChunk]) -> Vec<&'static str> {
    chunks.iter().map(StreamChunk::kind).collect()
}

fn two_hop() -> (Arc<ScriptedAgent>, AgentRef) {
    let analytics = Arc::new(ScriptedAgent::new("analytics").reply("About 18 months."));
    let triage: AgentRef = Arc::new(
        ScriptedAgent::new("triage")
            .with_handoffs([analytics.clone() as AgentRef])
            .hand_off(HandoffInstruction::new("analytics").with_reason("forecast requested")),
    );
    (analytics, triage)
}

#[tokio::test]
async fn test_two_hop_run_emits_chunks_in_execution_order() {
    let (_, triage) = two_hop();

    let (chunks, outcome) = Runner::new()
        .run_stream(triage, "What's my runway?", RunOptions::default())
        .collect()
        .await;

    assert_eq!(
        kinds(&chunks),
        vec![
            "orchestration-status",
            "agent-thinking",
            "orchestration-status",
            "tool-call",
            "tool-result",
            "agent-switch",
            "orchestration-status",
            "agent-thinking",
            "orchestration-status",
            "text-delta",
            "text-delta",
            "text-delta",
            "agent-complete",
        ]
    );

    let statuses: Vec<OrchestrationStatus> = chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::OrchestrationStatus { status, .. } => Some(*status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            OrchestrationStatus::Planning,
            OrchestrationStatus::Executing,
            OrchestrationStatus::Routing,
            OrchestrationStatus::Executing,
        ]
    );

    match &chunks[5] {
        StreamChunk::AgentSwitch {
            from_agent,
            to_agent,
            reason,
            ..
        } => {
            assert_eq!(from_agent, "triage");
            assert_eq!(to_agent, "analytics");
            assert_eq!(reason.as_deref(), Some("forecast requested"));
        }
        other => panic!("expected agent-switch, got {other:?}"),
    }

    let deltas: String = chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::TextDelta { agent, text, .. } => {
                assert_eq!(agent, "analytics");
                Some(text.as_str())
            }
            _ => None,
        })
        .collect();
    assert_eq!(deltas, "About 18 months.");

    let result = outcome.unwrap();
    assert_eq!(result.text, "About 18 months.");
    assert_eq!(result.final_agent_name, "analytics");
    assert_eq!(
        result.handoff_history,
        vec![HandoffInstruction::new("analytics").with_reason("forecast requested")]
    );
    match chunks.last() {
        Some(StreamChunk::AgentComplete {
            agent,
            role,
            final_output,
        }) => {
            assert_eq!(agent, "analytics");
            assert_eq!(*role, Role::Assistant);
            assert_eq!(final_output, &result.text);
        }
        other => panic!("expected agent-complete, got {other:?}"),
    }
}

#[tokio::test]
async fn test_streaming_and_blocking_agree() {
    let (_, triage) = two_hop();
    let blocking = Runner::new()
        .run(triage, "What's my runway?", RunOptions::default())
        .await
        .unwrap();

    let (_, triage) = two_hop();
    let streamed = Runner::new()
        .run_stream(triage, "What's my runway?", RunOptions::default())
        .result
        .await
        .unwrap();

    assert_eq!(streamed.text, blocking.text);
    assert_eq!(streamed.final_agent_name, blocking.final_agent_name);
    assert_eq!(streamed.handoff_history, blocking.handoff_history);
    assert_eq!(streamed.conversation, blocking.conversation);
    assert_eq!(streamed.turns_consumed, blocking.turns_consumed);
}

#[tokio::test]
async fn test_unknown_handoff_target_fails_the_stream() {
    let triage: AgentRef =
        Arc::new(ScriptedAgent::new("triage").hand_off(HandoffInstruction::new("ghost")));

    let (chunks, outcome) = Runner::new()
        .run_stream(triage, "hi", RunOptions::default())
        .collect()
        .await;

    assert_eq!(
        kinds(&chunks),
        vec![
            "orchestration-status",
            "agent-thinking",
            "orchestration-status",
            "tool-call",
            "tool-result",
            "error",
        ]
    );
    match chunks.last() {
        Some(StreamChunk::Error { agent, message, .. }) => {
            assert_eq!(agent, "triage");
            assert_eq!(message, "Agent not found: ghost");
        }
        other => panic!("expected error chunk, got {other:?}"),
    }

    assert_eq!(chunks.iter().filter(|c| c.is_terminal()).count(), 1);

    let failure = outcome.unwrap_err();
    assert!(failure.error.is_agent_not_found());
    assert_eq!(failure.partial.final_agent_name, "triage");
    assert_eq!(failure.partial.turns_consumed, 1);
    assert!(failure.partial.handoff_history.is_empty());
    assert_eq!(failure.partial.conversation, vec![Message::user("hi")]);
}

#[tokio::test]
async fn test_unknown_start_agent_still_terminates() {
    let run = Runner::new().run_stream("nobody", "hi", RunOptions::default());
    let (chunks, outcome) = run.collect().await;

    assert_eq!(kinds(&chunks), vec!["error"]);
    assert!(outcome.unwrap_err().error.is_agent_not_found());
}

#[tokio::test]
async fn test_result_only_consumer_does_not_hang() {
    let (_, triage) = two_hop();
    let (events, result) = Runner::new()
        .run_stream(triage, "What's my runway?", RunOptions::default())
        .into_parts();
    drop(events);

    let result = tokio::time::timeout(Duration::from_secs(5), result)
        .await
        .expect("result future resolved")
        .unwrap();
    assert_eq!(result.final_agent_name, "analytics");
}

#[tokio::test]
async fn test_result_only_consumer_sees_failures_too() {
    let looping: AgentRef = Arc::new(
        ScriptedAgent::new("loop").otherwise_hand_off(HandoffInstruction::new("loop")),
    );
    let run = Runner::new().run_stream(looping, "go", RunOptions::new().with_max_total_turns(3));

    let failure = tokio::time::timeout(Duration::from_secs(5), run.result)
        .await
        .expect("result future resolved")
        .unwrap_err();
    assert!(failure.error.is_turn_limit());
    assert_eq!(failure.partial.handoff_history.len(), 3);
}

#[tokio::test]
async fn test_events_only_consumer_sees_the_terminal_chunk() {
    let (_, triage) = two_hop();
    let run = Runner::new().run_stream(triage, "hi", RunOptions::default());
    let (events, result) = run.into_parts();
    drop(result);

    let chunks: Vec<StreamChunk> = events.collect().await;
    assert_eq!(chunks.last().map(StreamChunk::kind), Some("agent-complete"));
}

#[tokio::test]
async fn test_streaming_honours_options() {
    let (analytics, triage) = two_hop();
    let switches = Arc::new(Mutex::new(0usize));
    let counter = switches.clone();
    let options = RunOptions::new()
        .with_initial_messages([Message::system("Be brief.")])
        .on_handoff(move |_| *counter.lock().unwrap() += 1);

    let outcome = Runner::new()
        .run_stream(triage, "What's my runway?", options)
        .result
        .await;

    assert!(outcome.is_ok());
    assert_eq!(*switches.lock().unwrap(), 1);
    let seen = analytics.seen();
    assert_eq!(seen[0].messages()[0], Message::system("Be brief."));
    assert_eq!(seen[0].messages()[1], Message::user("What's my runway?"));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_ends_the_stream_with_an_error() {
    let slow: AgentRef = Arc::new(ScriptedAgent::new("slow").with_latency(Duration::from_secs(60)));
    let token = CancellationToken::new();
    let run = Runner::new().run_stream(slow, "hi", RunOptions::new().with_cancellation(token.clone()));

    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    let (chunks, outcome) = run.collect().await;
    assert_eq!(chunks.last().map(StreamChunk::kind), Some("error"));
    assert!(matches!(
        outcome.unwrap_err().error,
        OrchestratorError::Cancelled { turn: 1, .. }
    ));
}

/// Streams two words, then fails mid-stream.
struct Flaky;

#[async_trait]
impl Agent for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn generate(
        &self,
        _conversation: &Conversation,
        _cancel: &CancellationToken,
    ) -> Result<Generation, BoxError> {
        Err("generate is not used when streaming".into())
    }

    async fn stream(
        &self,
        _conversation: &Conversation,
        _cancel: &CancellationToken,
    ) -> Result<AgentStream, BoxError> {
        let deltas: Vec<Result<String, BoxError>> = vec![
            Ok("About ".to_string()),
            Ok("18 ".to_string()),
            Err("connection reset".into()),
        ];
        Ok(AgentStream::new(
            stream::iter(deltas).boxed(),
            futures::future::ready(Ok(Generation::text("unreachable"))).boxed(),
        ))
    }
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_emitted_deltas() {
    let (chunks, outcome) = Runner::new()
        .run_stream(Arc::new(Flaky) as AgentRef, "hi", RunOptions::default())
        .collect()
        .await;

    assert_eq!(
        kinds(&chunks),
        vec![
            "orchestration-status",
            "agent-thinking",
            "orchestration-status",
            "text-delta",
            "text-delta",
            "error",
        ]
    );
    match outcome.unwrap_err().error {
        OrchestratorError::AgentExecution { agent, turn, source } => {
            assert_eq!(agent, "flaky");
            assert_eq!(turn, 1);
            assert_eq!(source.to_string(), "connection reset");
        }
        other => panic!("expected AgentExecution, got {other}"),
    }
}

/// Panics instead of answering.
struct Boom;

#[async_trait]
impl Agent for Boom {
    fn name(&self) -> &str {
        "boom"
    }

    async fn generate(
        &self,
        _conversation: &Conversation,
        _cancel: &CancellationToken,
    ) -> Result<Generation, BoxError> {
        panic!("model client exploded")
    }
}

#[tokio::test]
async fn test_panicking_agent_ends_the_stream_with_an_error() {
    let (chunks, outcome) = Runner::new()
        .run_stream(Arc::new(Boom) as AgentRef, "hi", RunOptions::default())
        .collect()
        .await;

    assert_eq!(
        kinds(&chunks),
        vec!["orchestration-status", "agent-thinking", "orchestration-status", "error"]
    );
    match chunks.last() {
        Some(StreamChunk::Error { agent, message, .. }) => {
            assert_eq!(agent, "boom");
            assert!(message.contains("agent panicked: model client exploded"));
        }
        other => panic!("expected an error chunk, got {other:?}"),
    }

    let failure = outcome.unwrap_err();
    assert!(matches!(
        failure.error,
        OrchestratorError::AgentExecution { turn: 1, .. }
    ));
    assert_eq!(failure.partial.final_agent_name, "boom");
    assert_eq!(failure.partial.conversation, vec![Message::user("hi")]);
}

#[tokio::test]
async fn test_panicking_handoff_callback_ends_the_stream_with_an_error() {
    let (analytics, triage) = two_hop();
    let options = RunOptions::new().on_handoff(|_| panic!("callback exploded"));

    let (chunks, outcome) = Runner::new()
        .run_stream(triage, "What's my runway?", options)
        .collect()
        .await;

    assert_eq!(chunks.last().map(StreamChunk::kind), Some("error"));
    assert_eq!(chunks.iter().filter(|c| c.is_terminal()).count(), 1);
    let failure = outcome.unwrap_err();
    assert!(failure.error.to_string().contains("agent panicked: callback exploded"));
    assert_eq!(failure.partial.final_agent_name, "triage");
    assert_eq!(analytics.calls(), 0);
}
