//! Result types for orchestration runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handoff::HandoffInstruction;
use crate::items::{Message, Step};
use crate::usage::UsageStats;

/// Timing of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: i64,
}

impl RunMetadata {
    pub fn finished(start_time: DateTime<Utc>) -> Self {
        let end_time = Utc::now();
        Self {
            start_time,
            end_time,
            duration_ms: (end_time - start_time).num_milliseconds(),
        }
    }
}

/// The outcome of a run that reached a turn without a handoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResult {
    pub run_id: Uuid,
    /// Text generated by the final agent on its last turn.
    pub text: String,
    pub final_agent_name: String,
    /// Every handoff of the run, in the order it happened.
    pub handoff_history: Vec<HandoffInstruction>,
    /// Steps of the terminal turn.
    pub steps: Vec<Step>,
    pub finish_reason: Option<String>,
    /// Usage summed over every turn of the run.
    pub usage: UsageStats,
    /// Steps consumed against the turn budget.
    pub turns_consumed: usize,
    pub conversation: Vec<Message>,
    pub metadata: RunMetadata,
}

impl FinalResult {
    /// A result with nothing in it, used when a run died before any bookkeeping.
    pub fn empty(run_id: Uuid, agent: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            run_id,
            text: String::new(),
            final_agent_name: agent.into(),
            handoff_history: Vec::new(),
            steps: Vec::new(),
            finish_reason: None,
            usage: UsageStats::default(),
            turns_consumed: 0,
            conversation: Vec::new(),
            metadata: RunMetadata::finished(start_time),
        }
    }

    pub fn handoff_count(&self) -> usize {
        self.handoff_history.len()
    }

    /// Names of the agents that took over, in order.
    pub fn handoff_path(&self) -> Vec<&str> {
        self.handoff_history
            .iter()
            .map(|h| h.target_agent_name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result() {
        let start = Utc::now();
        let result = FinalResult::empty(Uuid::new_v4(), "triage", start);
        assert_eq!(result.final_agent_name, "triage");
        assert!(result.text.is_empty());
        assert_eq!(result.handoff_count(), 0);
        assert!(result.metadata.end_time >= start);
        assert!(result.metadata.duration_ms >= 0);
    }

    #[test]
    fn test_handoff_path_and_serialization() {
        let mut result = FinalResult::empty(Uuid::new_v4(), "billing", Utc::now());
        result.handoff_history = vec![
            HandoffInstruction::new("analytics"),
            HandoffInstruction::new("billing").with_reason("invoice question"),
        ];
        assert_eq!(result.handoff_path(), vec!["analytics", "billing"]);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["finalAgentName"], "billing");
        assert_eq!(value["handoffHistory"][1]["reason"], "invoice question");
        assert!(value["metadata"]["durationMs"].is_number());
    }
}
