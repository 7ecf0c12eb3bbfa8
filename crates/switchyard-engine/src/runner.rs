use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use switchyard_core::agent::AgentClass;
use switchyard_core::config::{EngineConfig, SwitchyardConfig};
use switchyard_core::error::Result;
use switchyard_core::graph::ExecutionPlan;
use switchyard_core::traits::{AgentInvoker, ConfigStore, StatusSink};
use switchyard_core::types::{Job, JobResult};

use crate::aggregator::{AggregateResult, ResultAggregator};
use crate::catalog::AgentCatalog;
use crate::graph::ExecutionPlanner;
use crate::orchestrator::OrchestrationEngine;
use crate::output_validator::{OutputValidator, ValidationReport};
use crate::synthesizer::{SynthesizedDocument, Synthesizer};

/// Everything a query run produces, downstream of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub job: JobResult,
    pub aggregate: AggregateResult,
    pub validation: ValidationReport,
    pub document: SynthesizedDocument,
}

/// Loads a playbook from a [`ConfigStore`], plans it, and runs a job through
/// it.
///
/// Ingestion playbooks run fail-fast; query playbooks run tolerant and then
/// go through aggregation, validation and synthesis.
pub struct PlaybookRunner {
    store: Arc<dyn ConfigStore>,
    invoker: Arc<dyn AgentInvoker>,
    config: SwitchyardConfig,
    sink: Option<Arc<dyn StatusSink>>,
}

impl PlaybookRunner {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        invoker: Arc<dyn AgentInvoker>,
        config: SwitchyardConfig,
    ) -> Self {
        Self {
            store,
            invoker,
            config,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Resolve the playbook's agents and build a fresh plan.
    pub async fn prepare(
        &self,
        tenant_id: &str,
        domain_id: &str,
        class: AgentClass,
    ) -> Result<(AgentCatalog, ExecutionPlan)> {
        let playbook = self.store.load_playbook(tenant_id, domain_id, class).await?;
        let mut agents = AgentCatalog::new();
        for id in &playbook.graph.nodes {
            let agent = self.store.load_agent(tenant_id, id).await?;
            agents.insert_unchecked(agent);
        }
        let plan = ExecutionPlanner::plan_playbook(&playbook.graph, class, &agents)?;
        info!(
            tenant_id,
            domain_id,
            %class,
            playbook = %playbook.name,
            levels = plan.levels.len(),
            "Playbook prepared"
        );
        Ok((agents, plan))
    }

    /// Run the job's ingestion playbook in fail-fast mode.
    pub async fn run_ingestion(&self, job: &mut Job) -> Result<JobResult> {
        let (agents, plan) = self
            .prepare(&job.tenant_id, &job.domain_id, AgentClass::Ingestion)
            .await?;
        let engine = self.engine(EngineConfig {
            fail_fast: true,
            ..self.config.engine.clone()
        });
        Ok(engine.execute(job, &plan, &agents).await)
    }

    /// Run the job's query playbook in tolerant mode, then aggregate,
    /// validate and synthesize the outcomes.
    pub async fn run_query(&self, job: &mut Job) -> Result<QueryReport> {
        let (agents, plan) = self
            .prepare(&job.tenant_id, &job.domain_id, AgentClass::Query)
            .await?;
        let engine = self.engine(EngineConfig {
            fail_fast: false,
            ..self.config.engine.clone()
        });
        let result = engine.execute(job, &plan, &agents).await;

        let aggregate = ResultAggregator::aggregate(&result.outcomes, &plan);
        let validation = OutputValidator::new(self.config.validation.clone())
            .validate_all(aggregate.iter(), &agents);
        let document = Synthesizer::new(&self.config.synthesis).synthesize(&validation.outcomes);

        info!(
            job_id = %result.job_id,
            status = %aggregate.status,
            passed = validation.passed().count(),
            warnings = validation.warnings.len(),
            "Query report ready"
        );

        Ok(QueryReport {
            job: result,
            aggregate,
            validation,
            document,
        })
    }

    /// Run any playbook class with the configured engine mode.
    pub async fn run(&self, job: &mut Job, class: AgentClass) -> Result<JobResult> {
        let (agents, plan) = self.prepare(&job.tenant_id, &job.domain_id, class).await?;
        let engine = self.engine(self.config.engine.clone());
        Ok(engine.execute(job, &plan, &agents).await)
    }

    fn engine(&self, config: EngineConfig) -> OrchestrationEngine {
        let engine = OrchestrationEngine::new(self.invoker.clone(), config);
        match &self.sink {
            Some(sink) => engine.with_sink(sink.clone()),
            None => engine,
        }
    }
}
