//! # Usage Tracking
//!
//! Agents report token consumption for each `generate`/`stream` call through
//! [`Usage`]. The runner folds every turn of a run into a [`UsageStats`],
//! which keeps a total and a breakdown by agent so a multi-hop run shows
//! where the budget went.
//!
//! ```rust
//! use agent_relay::usage::{Usage, UsageStats};
//!
//! let mut stats = UsageStats::new();
//! stats.record("triage", Usage::new(120, 30));
//! stats.record("analytics", Usage::new(500, 150));
//!
//! assert_eq!(stats.total.total_tokens, 800);
//! assert_eq!(stats.by_agent["analytics"].completion_tokens, 150);
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Tokens spent by one or more model calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    /// Model calls covered by these counts.
    pub request_count: usize,
}

impl Usage {
    /// Usage of a single call.
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            request_count: 1,
        }
    }

    /// True when nothing at all was reported.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.total_tokens += rhs.total_tokens;
        self.request_count += rhs.request_count;
    }
}

/// Usage of a whole run, in total and per agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total: Usage,
    pub by_agent: BTreeMap<String, Usage>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charges `usage` to `agent` and to the total.
    pub fn record(&mut self, agent: &str, usage: Usage) {
        self.total += usage;
        *self.by_agent.entry(agent.to_string()).or_default() += usage;
    }

    /// One line for the total, then one per agent in name order.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "total: {} tokens over {} requests",
            self.total.total_tokens, self.total.request_count
        );
        for (agent, usage) in &self.by_agent {
            let _ = write!(
                out,
                "\n  {}: {} tokens over {} requests",
                agent, usage.total_tokens, usage.request_count
            );
        }
        out
    }
}
