use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::AgentOutput;

/// Unique job identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal state of one agent within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
    Skipped,
    Cached,
}

impl OutcomeStatus {
    /// Success or cached: the agent has a usable output.
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Success | OutcomeStatus::Cached)
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Error => write!(f, "error"),
            OutcomeStatus::Skipped => write!(f, "skipped"),
            OutcomeStatus::Cached => write!(f, "cached"),
        }
    }
}

/// Result of one agent invocation (or of not invoking it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub status: OutcomeStatus,
    /// Present only on success/cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<AgentOutput>,
    #[serde(default)]
    pub reasoning: String,
    /// 0.0..=1.0
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub execution_time_ms: u64,
    /// Present only on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AgentOutcome {
    pub fn success(output: AgentOutput) -> Self {
        Self {
            status: OutcomeStatus::Success,
            output: Some(output),
            reasoning: String::new(),
            confidence: 1.0,
            execution_time_ms: 0,
            error_message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            output: None,
            reasoning: String::new(),
            confidence: 0.0,
            execution_time_ms: 0,
            error_message: Some(message.into()),
        }
    }

    /// A node that was never invoked; `reason` lands in `reasoning`.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Skipped,
            output: None,
            reasoning: reason.into(),
            confidence: 0.0,
            execution_time_ms: 0,
            error_message: None,
        }
    }

    /// Mark a reused outcome as served from cache.
    pub fn as_cached(&self) -> Self {
        let mut cached = self.clone();
        if cached.status == OutcomeStatus::Success {
            cached.status = OutcomeStatus::Cached;
        }
        cached.execution_time_ms = 0;
        cached
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_error(&self) -> bool {
        self.status == OutcomeStatus::Error
    }
}

/// One append-only execution log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the job's log, assigned at append time.
    pub sequence: u64,
    pub agent_id: String,
    pub agent_name: String,
    pub status: OutcomeStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_agents: usize,
    /// Invocations started, including ones whose result an abort discarded.
    pub executed_agents: usize,
    pub cached_agents: usize,
}

/// One analysis run over a single report or question.
///
/// The cache is scoped to the job and emptied when the engine finishes with it.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: JobId,
    pub tenant_id: String,
    pub domain_id: String,
    pub user_id: Option<String>,
    pub input: String,
    pub cache: HashMap<String, AgentOutcome>,
    pub execution_log: Vec<LogEntry>,
    pub status: JobStatus,
}

impl Job {
    pub fn new(
        tenant_id: impl Into<String>,
        domain_id: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            tenant_id: tenant_id.into(),
            domain_id: domain_id.into(),
            user_id: None,
            input: input.into(),
            cache: HashMap::new(),
            execution_log: Vec::new(),
            status: JobStatus::Running,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Seed the cache with an outcome already computed for this job.
    pub fn with_cached(mut self, agent_id: impl Into<String>, outcome: AgentOutcome) -> Self {
        self.cache.insert(agent_id.into(), outcome);
        self
    }

    /// Append a log entry, stamping its sequence number.
    pub fn append_log(&mut self, mut entry: LogEntry) {
        entry.sequence = self.execution_log.len() as u64;
        self.execution_log.push(entry);
    }
}

/// Terminal result of one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,
    pub execution_log: Vec<LogEntry>,
    pub cache_stats: CacheStats,
    /// Every agent's final outcome, drained from the job cache.
    pub outcomes: HashMap<String, AgentOutcome>,
    pub total_execution_time_ms: u64,
}

impl JobResult {
    pub fn outcome(&self, agent_id: &str) -> Option<&AgentOutcome> {
        self.outcomes.get(agent_id)
    }

    /// Log entries for one agent.
    pub fn entries_for<'a>(&'a self, agent_id: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.execution_log.iter().filter(move |e| e.agent_id == agent_id)
    }

    pub fn count_status(&self, status: OutcomeStatus) -> usize {
        self.execution_log.iter().filter(|e| e.status == status).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

/// A successful outcome after schema validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedOutcome {
    pub agent_id: String,
    pub agent_name: String,
    pub outcome: AgentOutcome,
    pub validation_status: ValidationStatus,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ValidatedOutcome {
    pub fn passed(&self) -> bool {
        self.validation_status == ValidationStatus::Passed
    }
}
