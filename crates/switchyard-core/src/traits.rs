use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::agent::{AgentClass, AgentNode};
use crate::error::Result;
use crate::graph::Playbook;
use crate::types::{AgentOutcome, JobId};

/// Agent invoker — runs one analysis step against an external service.
///
/// `parent_outputs` is keyed `"{parent_id}_output"`. Failures should come back
/// as `Err` or as an outcome with `status = error`; the engine also converts
/// panics, but implementations must not rely on that.
pub trait AgentInvoker: Send + Sync + 'static {
    fn invoke<'a>(
        &'a self,
        agent: &'a AgentNode,
        input: &'a str,
        parent_outputs: &'a HashMap<String, AgentOutcome>,
    ) -> BoxFuture<'a, Result<AgentOutcome>>;
}

/// Text agent — a backend that answers in raw text, typically a language
/// model. Pair it with the engine's text invoker to get structured outcomes.
pub trait TextAgent: Send + Sync + 'static {
    fn complete<'a>(
        &'a self,
        agent: &'a AgentNode,
        input: &'a str,
        parent_outputs: &'a HashMap<String, AgentOutcome>,
    ) -> BoxFuture<'a, Result<String>>;
}

/// Config store — read-only source of agent and playbook definitions.
pub trait ConfigStore: Send + Sync + 'static {
    fn load_agent(&self, tenant_id: &str, agent_id: &str) -> BoxFuture<'_, Result<AgentNode>>;

    fn load_playbook(
        &self,
        tenant_id: &str,
        domain_id: &str,
        class: AgentClass,
    ) -> BoxFuture<'_, Result<Playbook>>;
}

/// Status sink — best-effort live progress. Must not block.
pub trait StatusSink: Send + Sync + 'static {
    fn publish(
        &self,
        job_id: &JobId,
        user_id: Option<&str>,
        status: &str,
        message: &str,
    ) -> Result<()>;
}
