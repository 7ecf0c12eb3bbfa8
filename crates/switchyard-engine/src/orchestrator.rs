//! Per-job execution of a leveled plan.
//!
//! The engine walks levels in order and invokes every unresolved member of a
//! level concurrently, waiting for the whole level to settle before moving
//! on. Results are buffered per level and logged in the plan's id order, so
//! the execution log is reproducible no matter which invocation finishes
//! first.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use switchyard_core::agent::AgentNode;
use switchyard_core::config::EngineConfig;
use switchyard_core::graph::ExecutionPlan;
use switchyard_core::traits::{AgentInvoker, StatusSink};
use switchyard_core::types::{
    AgentOutcome, CacheStats, Job, JobResult, JobStatus, LogEntry, OutcomeStatus,
};

use crate::catalog::AgentCatalog;

const CANCELLED: &str = "job cancelled";

/// Runs jobs against a plan using an [`AgentInvoker`].
///
/// `EngineConfig::fail_fast` selects between strict mode (first error skips
/// every unresolved node) and tolerant mode (errors only skip the failed
/// node's dependents).
pub struct OrchestrationEngine {
    invoker: Arc<dyn AgentInvoker>,
    config: EngineConfig,
    sink: Option<Arc<dyn StatusSink>>,
}

/// Outcome of one level's invocations.
#[derive(Default)]
struct LevelRun {
    outcomes: BTreeMap<String, AgentOutcome>,
    executed: usize,
    abort: Option<String>,
}

enum Settled {
    Cancelled,
    Done(String, AgentOutcome),
}

impl OrchestrationEngine {
    pub fn new(invoker: Arc<dyn AgentInvoker>, config: EngineConfig) -> Self {
        Self {
            invoker,
            config,
            sink: None,
        }
    }

    /// Attach a best-effort progress sink.
    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute `plan` for `job`, resolving agent definitions from `agents`.
    ///
    /// Never returns an error: invocation failures, panics, and plan entries
    /// without a registered agent all become `error` outcomes. The job's
    /// cache is drained into [`JobResult::outcomes`].
    pub async fn execute(
        &self,
        job: &mut Job,
        plan: &ExecutionPlan,
        agents: &AgentCatalog,
    ) -> JobResult {
        self.execute_with_cancellation(job, plan, agents, CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), but stops starting work once `cancel`
    /// fires. Unresolved nodes are then skipped and the job fails.
    pub async fn execute_with_cancellation(
        &self,
        job: &mut Job,
        plan: &ExecutionPlan,
        agents: &AgentCatalog,
        cancel: CancellationToken,
    ) -> JobResult {
        let started = Instant::now();
        let mut stats = CacheStats {
            total_agents: plan.node_count(),
            ..CacheStats::default()
        };
        let mut abort: Option<String> = None;
        let mut had_error = false;

        job.status = JobStatus::Running;
        info!(
            job_id = %job.job_id,
            levels = plan.levels.len(),
            agents = stats.total_agents,
            fail_fast = self.config.fail_fast,
            "Job started"
        );
        self.publish(
            job,
            "running",
            &format!(
                "Executing {} agents in {} levels",
                stats.total_agents,
                plan.levels.len()
            ),
        );

        for (index, level) in plan.levels.iter().enumerate() {
            let level_start = Instant::now();
            if abort.is_none() && cancel.is_cancelled() {
                abort = Some(CANCELLED.to_string());
            }

            let mut resolved: BTreeMap<String, AgentOutcome> = BTreeMap::new();
            let mut runnable: Vec<&AgentNode> = Vec::new();

            for id in level {
                if let Some(hit) = job.cache.get(id).filter(|o| o.is_success()) {
                    debug!(agent_id = %id, "Cache hit");
                    stats.cached_agents += 1;
                    resolved.insert(id.clone(), hit.as_cached());
                    continue;
                }
                if let Some(reason) = &abort {
                    resolved.insert(id.clone(), AgentOutcome::skipped(reason.clone()));
                    continue;
                }
                let Some(agent) = agents.get(id) else {
                    error!(agent_id = %id, "Plan references an unregistered agent");
                    resolved.insert(id.clone(), AgentOutcome::error("agent not registered"));
                    continue;
                };
                if !self.config.fail_fast {
                    if let Some(parent) = unmet_parent(agent, plan, &job.cache) {
                        debug!(
                            agent_id = %id,
                            parent = %parent,
                            "Skipping agent with failed parent"
                        );
                        resolved.insert(
                            id.clone(),
                            AgentOutcome::skipped(format!("parent '{}' did not succeed", parent)),
                        );
                        continue;
                    }
                }
                runnable.push(agent);
            }

            if self.config.fail_fast && abort.is_none() {
                if let Some((id, outcome)) = resolved.iter().find(|(_, o)| o.is_error()) {
                    abort = Some(abort_reason(id, outcome));
                }
            }

            if let Some(reason) = abort.clone() {
                for agent in runnable.drain(..) {
                    resolved.insert(agent.id.clone(), AgentOutcome::skipped(reason.clone()));
                }
            } else if !runnable.is_empty() {
                let run = self.run_level(&job.input, runnable, &job.cache, &cancel).await;
                stats.executed_agents += run.executed;
                abort = run.abort;
                resolved.extend(run.outcomes);
            }

            for id in level {
                let Some(outcome) = resolved.remove(id) else {
                    continue;
                };
                let name = agents.get(id).map_or(id.as_str(), |a| a.name.as_str());
                had_error |= outcome.is_error();
                self.record(job, id, name, &outcome);
                job.cache.insert(id.clone(), outcome);
            }

            info!(
                job_id = %job.job_id,
                level = index,
                size = level.len(),
                elapsed_ms = level_start.elapsed().as_millis() as u64,
                aborted = abort.is_some(),
                "Level settled"
            );
        }

        job.status = if had_error || abort.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };

        let total_execution_time_ms = started.elapsed().as_millis() as u64;
        let message = match &abort {
            Some(reason) => format!("Job {}: {}", job.status, reason),
            None => format!("Job {} in {}ms", job.status, total_execution_time_ms),
        };
        self.publish(job, &job.status.to_string(), &message);
        info!(
            job_id = %job.job_id,
            status = %job.status,
            executed = stats.executed_agents,
            cached = stats.cached_agents,
            elapsed_ms = total_execution_time_ms,
            "Job finished"
        );

        JobResult {
            job_id: job.job_id.clone(),
            status: job.status,
            execution_log: job.execution_log.clone(),
            cache_stats: stats,
            outcomes: job.cache.drain().collect(),
            total_execution_time_ms,
        }
    }

    /// Invoke every member of one level, bounded by `max_concurrency`.
    ///
    /// In fail-fast mode the first error stops new invocations. In-flight
    /// siblings are either awaited and discarded or dropped outright,
    /// depending on `cancel_in_flight`. Either way they end up `skipped`.
    async fn run_level<'a>(
        &'a self,
        input: &'a str,
        runnable: Vec<&'a AgentNode>,
        cache: &HashMap<String, AgentOutcome>,
        cancel: &CancellationToken,
    ) -> LevelRun {
        let limit = match self.config.max_concurrency {
            0 => runnable.len().max(1),
            n => n,
        };
        let mut queue = runnable.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut running: BTreeSet<String> = BTreeSet::new();
        let mut run = LevelRun::default();

        loop {
            if run.abort.is_none() {
                while in_flight.len() < limit {
                    let Some(agent) = queue.next() else { break };
                    debug!(agent_id = %agent.id, "Invoking agent");
                    running.insert(agent.id.clone());
                    run.executed += 1;
                    let parents = gather_parent_outputs(agent, cache);
                    in_flight.push(self.invoke_one(agent, input, parents));
                }
            }

            if in_flight.is_empty() {
                break;
            }

            let settled = tokio::select! {
                biased;
                _ = cancel.cancelled(), if run.abort.is_none() => Settled::Cancelled,
                Some((id, outcome)) = in_flight.next() => Settled::Done(id, outcome),
                else => break,
            };

            match settled {
                Settled::Cancelled => {
                    warn!(in_flight = running.len(), "Job cancelled during level");
                    run.abort = Some(CANCELLED.to_string());
                }
                Settled::Done(id, outcome) => {
                    running.remove(&id);
                    if let Some(reason) = &run.abort {
                        debug!(
                            agent_id = %id,
                            status = %outcome.status,
                            "Discarding result settled after abort"
                        );
                        run.outcomes.insert(id, AgentOutcome::skipped(reason.clone()));
                        continue;
                    }
                    if outcome.is_error() {
                        warn!(
                            agent_id = %id,
                            error = outcome.error_message.as_deref().unwrap_or_default(),
                            "Agent failed"
                        );
                        if self.config.fail_fast {
                            run.abort = Some(abort_reason(&id, &outcome));
                        }
                    }
                    run.outcomes.insert(id, outcome);
                }
            }

            if run.abort.is_some() && self.config.cancel_in_flight {
                break;
            }
        }

        drop(in_flight);
        if let Some(reason) = &run.abort {
            for id in running {
                debug!(agent_id = %id, "Dropping in-flight invocation");
                run.outcomes.insert(id, AgentOutcome::skipped(reason.clone()));
            }
            for agent in queue {
                run.outcomes.insert(agent.id.clone(), AgentOutcome::skipped(reason.clone()));
            }
        }
        run
    }

    /// One guarded invocation. Errors and panics become `error` outcomes and
    /// the measured wall-clock time replaces whatever the invoker reported.
    async fn invoke_one<'a>(
        &'a self,
        agent: &'a AgentNode,
        input: &'a str,
        parent_outputs: HashMap<String, AgentOutcome>,
    ) -> (String, AgentOutcome) {
        let started = Instant::now();
        let result = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.invoker.invoke(agent, input, &parent_outputs)
        })) {
            Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
            Err(panic) => Err(panic),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(Ok(outcome)) => normalize(outcome),
            Ok(Err(e)) => AgentOutcome::error(e.to_string()),
            Err(panic) => {
                AgentOutcome::error(format!("agent panicked: {}", panic_message(&*panic)))
            }
        };
        debug!(agent_id = %agent.id, status = %outcome.status, elapsed_ms, "Agent settled");
        (agent.id.clone(), outcome.with_execution_time(elapsed_ms))
    }

    fn record(&self, job: &mut Job, agent_id: &str, agent_name: &str, outcome: &AgentOutcome) {
        job.append_log(LogEntry {
            sequence: 0,
            agent_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            status: outcome.status,
            timestamp: Utc::now(),
            reasoning: (!outcome.reasoning.is_empty()).then(|| outcome.reasoning.clone()),
            error_message: outcome.error_message.clone(),
            execution_time_ms: outcome.execution_time_ms,
        });
        let message = match &outcome.error_message {
            Some(e) => format!("{}: {}", agent_name, e),
            None => format!("{}: {}", agent_name, outcome.status),
        };
        self.publish(job, &outcome.status.to_string(), &message);
    }

    fn publish(&self, job: &Job, status: &str, message: &str) {
        let Some(sink) = &self.sink else { return };
        if let Err(e) = sink.publish(&job.job_id, job.user_id.as_deref(), status, message) {
            warn!(job_id = %job.job_id, error = %e, "Status publish failed");
        }
    }
}

/// `{parent}_output` for every declared parent already in the cache.
fn gather_parent_outputs(
    agent: &AgentNode,
    cache: &HashMap<String, AgentOutcome>,
) -> HashMap<String, AgentOutcome> {
    agent
        .dependencies
        .iter()
        .filter_map(|parent| {
            cache
                .get(parent)
                .map(|outcome| (format!("{}_output", parent), outcome.clone()))
        })
        .collect()
}

/// First in-plan parent of `agent` that did not succeed.
fn unmet_parent<'a>(
    agent: &'a AgentNode,
    plan: &ExecutionPlan,
    cache: &HashMap<String, AgentOutcome>,
) -> Option<&'a str> {
    agent
        .dependencies
        .iter()
        .find(|parent| {
            plan.contains(parent)
                && !cache
                    .get(parent.as_str())
                    .is_some_and(AgentOutcome::is_success)
        })
        .map(String::as_str)
}

/// Invokers may only report success or error.
fn normalize(mut outcome: AgentOutcome) -> AgentOutcome {
    match outcome.status {
        OutcomeStatus::Success => {
            if outcome.output.is_none() {
                outcome.output = Some(Default::default());
            }
            outcome.error_message = None;
            outcome
        }
        OutcomeStatus::Error => {
            outcome.output = None;
            if outcome.error_message.is_none() {
                outcome.error_message = Some("agent reported an error".to_string());
            }
            outcome
        }
        other => AgentOutcome::error(format!("invoker returned unexpected status '{}'", other)),
    }
}

fn abort_reason(agent_id: &str, outcome: &AgentOutcome) -> String {
    format!(
        "aborted after '{}' failed: {}",
        agent_id,
        outcome.error_message.as_deref().unwrap_or("unknown error")
    )
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ExecutionPlanner;
    use switchyard_core::graph::ExecutionGraph;
    use switchyard_core::schema::AgentOutput;
    use switchyard_test_utils::{fixtures, RecordingSink, Script, ScriptedInvoker};

    fn catalog(agents: Vec<AgentNode>) -> AgentCatalog {
        let mut catalog = AgentCatalog::new();
        for agent in agents {
            catalog.register(agent).unwrap();
        }
        catalog
    }

    fn plan_for(catalog: &AgentCatalog) -> ExecutionPlan {
        let graph = ExecutionGraph::from_agents(catalog.iter());
        ExecutionPlanner::plan(&graph.nodes, &graph.edges).unwrap()
    }

    fn engine(invoker: &Arc<ScriptedInvoker>, config: EngineConfig) -> OrchestrationEngine {
        OrchestrationEngine::new(invoker.clone(), config)
    }

    fn statuses(result: &JobResult) -> Vec<(String, OutcomeStatus)> {
        result
            .execution_log
            .iter()
            .map(|e| (e.agent_id.clone(), e.status))
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_civic_pipeline() {
        let catalog = catalog(fixtures::civic_ingestion());
        let plan = plan_for(&catalog);
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .on("geo", Script::succeed(AgentOutput::new().with("location", "Main St")))
                .on("category", Script::succeed(AgentOutput::new().with("category", "pothole")))
                .on(
                    "temporal",
                    Script::succeed(AgentOutput::new().with("timestamp", "2024-05-01T08:00:00Z")),
                ),
        );

        let mut job = Job::new("t1", "roads", "Huge pothole on Main St since Monday");
        let result = engine(&invoker, EngineConfig::fail_fast())
            .execute(&mut job, &plan, &catalog)
            .await;

        assert_eq!(plan.levels, vec![vec!["geo", "temporal"], vec!["category"]]);
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.execution_log.len(), 3);
        assert_eq!(
            statuses(&result),
            vec![
                ("geo".into(), OutcomeStatus::Success),
                ("temporal".into(), OutcomeStatus::Success),
                ("category".into(), OutcomeStatus::Success),
            ]
        );
        assert_eq!(invoker.parent_keys("category"), Some(vec!["geo_output".to_string()]));
        assert_eq!(
            result.cache_stats,
            CacheStats {
                total_agents: 3,
                executed_agents: 3,
                cached_agents: 0
            }
        );
        assert_eq!(
            result
                .outcome("category")
                .and_then(|o| o.output.as_ref())
                .and_then(|o| o.get_str("category")),
            Some("pothole")
        );
        assert!(job.cache.is_empty());
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_diamond_invokes_shared_parent_once() {
        let catalog = catalog(fixtures::diamond());
        let plan = plan_for(&catalog);
        let invoker = Arc::new(ScriptedInvoker::new());

        let mut job = Job::new("t1", "roads", "input");
        let result = engine(&invoker, EngineConfig::fail_fast())
            .execute(&mut job, &plan, &catalog)
            .await;

        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(invoker.call_count("a"), 1);
        assert_eq!(invoker.call_count("d"), 1);
        assert_eq!(
            invoker.parent_keys("d"),
            Some(vec!["b_output".to_string(), "c_output".to_string()])
        );
    }

    #[tokio::test]
    async fn test_fail_fast_skips_siblings_and_descendants() {
        // Level 0: a, b, c (b fails); level 1: d depends on a.
        let catalog = catalog(vec![
            fixtures::agent("a", &[]),
            fixtures::agent("b", &[]),
            fixtures::agent("c", &[]),
            fixtures::agent("d", &["a"]),
        ]);
        let plan = plan_for(&catalog);
        let invoker = Arc::new(ScriptedInvoker::new().on("b", Script::fail("upstream timeout")));

        let mut job = Job::new("t1", "roads", "input");
        let result = engine(&invoker, EngineConfig::fail_fast().with_max_concurrency(1))
            .execute(&mut job, &plan, &catalog)
            .await;

        assert_eq!(result.status, JobStatus::Failed);
        assert_eq!(
            statuses(&result),
            vec![
                ("a".into(), OutcomeStatus::Success),
                ("b".into(), OutcomeStatus::Error),
                ("c".into(), OutcomeStatus::Skipped),
                ("d".into(), OutcomeStatus::Skipped),
            ]
        );
        assert_eq!(result.count_status(OutcomeStatus::Error), 1);
        assert_eq!(invoker.call_count("c"), 0);
        assert_eq!(invoker.call_count("d"), 0);

        let skipped = result.entries_for("c").next().unwrap();
        assert!(skipped.reasoning.as_deref().unwrap().contains("'b' failed"));
    }

    #[tokio::test]
    async fn test_fail_fast_discards_in_flight_sibling() {
        let catalog = catalog(vec![
            fixtures::agent("fast_fail", &[]),
            fixtures::agent("slow", &[]),
            fixtures::agent("tail", &["slow"]),
        ]);
        let plan = plan_for(&catalog);
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .on("fast_fail", Script::fail("boom"))
                .on("slow", Script::delay(50, Script::succeed(AgentOutput::new()))),
        );

        let mut job = Job::new("t1", "roads", "input");
        let result = engine(&invoker, EngineConfig::fail_fast())
            .execute(&mut job, &plan, &catalog)
            .await;

        assert_eq!(invoker.call_count("slow"), 1);
        assert_eq!(result.outcome("slow").unwrap().status, OutcomeStatus::Skipped);
        assert_eq!(result.outcome("tail").unwrap().status, OutcomeStatus::Skipped);
        assert_eq!(result.count_status(OutcomeStatus::Error), 1);
        // slow was invoked even though its result was thrown away
        assert_eq!(result.cache_stats.executed_agents, 2);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_drops_sibling() {
        let catalog = catalog(vec![fixtures::agent("bad", &[]), fixtures::agent("slow", &[])]);
        let plan = plan_for(&catalog);
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .on("bad", Script::fail("boom"))
                .on("slow", Script::delay(10_000, Script::succeed(AgentOutput::new()))),
        );

        let started = Instant::now();
        let mut job = Job::new("t1", "roads", "input");
        let result = engine(&invoker, EngineConfig::fail_fast().with_cancel_in_flight(true))
            .execute(&mut job, &plan, &catalog)
            .await;

        assert!(started.elapsed().as_millis() < 5_000);
        assert_eq!(result.outcome("slow").unwrap().status, OutcomeStatus::Skipped);
        assert_eq!(result.cache_stats.executed_agents, 2);
        assert_eq!(result.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_panic_becomes_error_outcome() {
        let catalog = catalog(vec![fixtures::agent("a", &[]), fixtures::agent("b", &["a"])]);
        let plan = plan_for(&catalog);
        let invoker = Arc::new(ScriptedInvoker::new().on("a", Script::panic("model went away")));

        let mut job = Job::new("t1", "roads", "input");
        let result = engine(&invoker, EngineConfig::fail_fast())
            .execute(&mut job, &plan, &catalog)
            .await;

        let a = result.outcome("a").unwrap();
        assert_eq!(a.status, OutcomeStatus::Error);
        assert!(a.error_message.as_deref().unwrap().contains("model went away"));
        assert_eq!(result.outcome("b").unwrap().status, OutcomeStatus::Skipped);
        assert_eq!(result.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_tolerant_mode_keeps_independent_agents() {
        let catalog = catalog(vec![
            fixtures::query_agent("who", &[]),
            fixtures::query_agent("when", &[]),
            fixtures::query_agent("why", &["who"]),
        ]);
        let plan = plan_for(&catalog);
        let invoker = Arc::new(ScriptedInvoker::new().on("who", Script::fail("no entities")));

        let mut job = Job::new("t1", "roads", "Who reported the flooding and when?");
        let result = engine(&invoker, EngineConfig::tolerant())
            .execute(&mut job, &plan, &catalog)
            .await;

        assert_eq!(result.outcome("when").unwrap().status, OutcomeStatus::Success);
        assert_eq!(result.outcome("who").unwrap().status, OutcomeStatus::Error);
        let why = result.outcome("why").unwrap();
        assert_eq!(why.status, OutcomeStatus::Skipped);
        assert!(why.reasoning.contains("'who'"));
        assert_eq!(invoker.call_count("why"), 0);
        assert_eq!(result.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_log_order_ignores_completion_order() {
        let catalog = catalog(vec![
            fixtures::agent("alpha", &[]),
            fixtures::agent("beta", &[]),
            fixtures::agent("gamma", &[]),
        ]);
        let plan = plan_for(&catalog);
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .on("alpha", Script::delay(60, Script::succeed(AgentOutput::new())))
                .on("beta", Script::delay(30, Script::succeed(AgentOutput::new()))),
        );

        let mut job = Job::new("t1", "roads", "input");
        let result = engine(&invoker, EngineConfig::fail_fast())
            .execute(&mut job, &plan, &catalog)
            .await;

        let ids: Vec<&str> = result.execution_log.iter().map(|e| e.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta", "gamma"]);
        let sequences: Vec<u64> = result.execution_log.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert!(result.outcome("alpha").unwrap().execution_time_ms >= 50);
    }

    #[tokio::test]
    async fn test_cache_hit_is_not_reinvoked() {
        let catalog = catalog(fixtures::diamond());
        let plan = plan_for(&catalog);
        let invoker = Arc::new(ScriptedInvoker::new());

        let mut job = Job::new("t1", "roads", "input").with_cached(
            "a",
            AgentOutcome::success(AgentOutput::new().with("seed", true)).with_execution_time(40),
        );
        let result = engine(&invoker, EngineConfig::fail_fast())
            .execute(&mut job, &plan, &catalog)
            .await;

        assert_eq!(invoker.call_count("a"), 0);
        let entry = result.entries_for("a").next().unwrap();
        assert_eq!(entry.status, OutcomeStatus::Cached);
        assert_eq!(entry.execution_time_ms, 0);
        assert_eq!(
            result.cache_stats,
            CacheStats { total_agents: 4, executed_agents: 3, cached_agents: 1 }
        );
        assert_eq!(result.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_unregistered_plan_entry_is_error() {
        let catalog = catalog(vec![fixtures::agent("a", &[])]);
        let plan = ExecutionPlan::new(vec![vec!["a".into(), "ghost".into()]]);
        let invoker = Arc::new(ScriptedInvoker::new());

        let mut job = Job::new("t1", "roads", "input");
        let result = engine(&invoker, EngineConfig::fail_fast())
            .execute(&mut job, &plan, &catalog)
            .await;

        assert_eq!(result.outcome("ghost").unwrap().status, OutcomeStatus::Error);
        assert_eq!(result.outcome("a").unwrap().status, OutcomeStatus::Skipped);
        assert_eq!(invoker.call_count("a"), 0);
    }

    #[tokio::test]
    async fn test_invoker_cannot_report_skipped() {
        let catalog = catalog(vec![fixtures::agent("a", &[])]);
        let plan = plan_for(&catalog);
        let invoker = Arc::new(
            ScriptedInvoker::new().on("a", Script::Reply(AgentOutcome::skipped("not me"))),
        );

        let mut job = Job::new("t1", "roads", "input");
        let result = engine(&invoker, EngineConfig::fail_fast())
            .execute(&mut job, &plan, &catalog)
            .await;
        assert_eq!(result.outcome("a").unwrap().status, OutcomeStatus::Error);
    }

    #[tokio::test]
    async fn test_external_cancellation() {
        let catalog = catalog(vec![fixtures::agent("a", &[]), fixtures::agent("b", &["a"])]);
        let plan = plan_for(&catalog);
        let invoker = Arc::new(ScriptedInvoker::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut job = Job::new("t1", "roads", "input");
        let result = engine(&invoker, EngineConfig::fail_fast())
            .execute_with_cancellation(&mut job, &plan, &catalog, cancel)
            .await;

        assert_eq!(invoker.total_calls(), 0);
        assert_eq!(result.count_status(OutcomeStatus::Skipped), 2);
        assert_eq!(result.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_status_sink_receives_progress_and_failures_are_ignored() {
        let catalog = catalog(vec![fixtures::agent("a", &[])]);
        let plan = plan_for(&catalog);
        let invoker = Arc::new(ScriptedInvoker::new());
        let sink = Arc::new(RecordingSink::new());

        let mut job = Job::new("t1", "roads", "input").with_user("u1");
        engine(&invoker, EngineConfig::fail_fast())
            .with_sink(sink.clone())
            .execute(&mut job, &plan, &catalog)
            .await;
        let statuses: Vec<String> = sink.updates().into_iter().map(|u| u.status).collect();
        assert_eq!(statuses, vec!["running", "success", "completed"]);
        assert!(sink.updates().iter().all(|u| u.user_id.as_deref() == Some("u1")));

        let mut job = Job::new("t1", "roads", "input");
        let result = engine(&invoker, EngineConfig::fail_fast())
            .with_sink(Arc::new(RecordingSink::failing()))
            .execute(&mut job, &plan, &catalog)
            .await;
        assert_eq!(result.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_empty_plan_completes() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let mut job = Job::new("t1", "roads", "input");
        let result = engine(&invoker, EngineConfig::fail_fast())
            .execute(&mut job, &ExecutionPlan::default(), &AgentCatalog::new())
            .await;
        assert_eq!(result.status, JobStatus::Completed);
        assert!(result.execution_log.is_empty());
    }
}
