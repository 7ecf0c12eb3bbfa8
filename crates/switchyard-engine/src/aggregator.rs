use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use switchyard_core::graph::ExecutionPlan;
use switchyard_core::types::AgentOutcome;

/// Overall classification of a tolerant-mode run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl std::fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateStatus::Success => write!(f, "success"),
            AggregateStatus::PartialSuccess => write!(f, "partial_success"),
            AggregateStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One agent's outcome in plan position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub outcome: AgentOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub status: AggregateStatus,
    /// Outcomes in flattened plan order.
    pub results: Vec<AgentResult>,
    pub total_agents: usize,
    pub successful_count: usize,
    pub failed_count: usize,
    /// `successful_count / total_agents`, 0.0 for an empty plan.
    pub success_rate: f64,
    pub total_execution_time_ms: u64,
}

impl AggregateResult {
    /// `(agent_id, outcome)` pairs in plan order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AgentOutcome)> {
        self.results.iter().map(|r| (r.agent_id.as_str(), &r.outcome))
    }
}

/// Summarizes tolerant-mode runs, where agents answer independent parts of
/// a question and some may fail without sinking the rest.
pub struct ResultAggregator;

impl ResultAggregator {
    /// Order `outcomes` by `plan` and classify the run.
    ///
    /// A plan node with no outcome counts as an error. Successful means
    /// `success` or `cached`; anything else, `skipped` included, is a failure.
    pub fn aggregate(
        outcomes: &HashMap<String, AgentOutcome>,
        plan: &ExecutionPlan,
    ) -> AggregateResult {
        let results: Vec<AgentResult> = plan
            .flatten()
            .into_iter()
            .map(|id| AgentResult {
                agent_id: id.to_string(),
                outcome: outcomes
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| AgentOutcome::error("agent did not execute")),
            })
            .collect();

        let total_agents = results.len();
        let successful_count = results.iter().filter(|r| r.outcome.is_success()).count();
        let failed_count = total_agents - successful_count;
        let success_rate = if total_agents == 0 {
            0.0
        } else {
            successful_count as f64 / total_agents as f64
        };
        let total_execution_time_ms = results.iter().map(|r| r.outcome.execution_time_ms).sum();

        let status = if successful_count == 0 {
            AggregateStatus::Failed
        } else if failed_count > 0 {
            AggregateStatus::PartialSuccess
        } else {
            AggregateStatus::Success
        };

        debug!(
            %status,
            total_agents,
            successful_count,
            failed_count,
            "Aggregated results"
        );

        AggregateResult {
            status,
            results,
            total_agents,
            successful_count,
            failed_count,
            success_rate,
            total_execution_time_ms,
        }
    }
}
