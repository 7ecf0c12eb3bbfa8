//! Shared mocks and fixtures for Switchyard tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;

use switchyard_core::agent::AgentNode;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::event::StatusUpdate;
use switchyard_core::schema::AgentOutput;
use switchyard_core::traits::{AgentInvoker, StatusSink, TextAgent};
use switchyard_core::types::{AgentOutcome, JobId};

/// What a scripted agent does when invoked.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed(AgentOutput),
    Fail(String),
    Panic(String),
    /// Return this outcome verbatim.
    Reply(AgentOutcome),
    Delay(u64, Box<Script>),
}

impl Script {
    pub fn succeed(output: AgentOutput) -> Self {
        Script::Succeed(output)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Script::Fail(message.into())
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Script::Panic(message.into())
    }

    pub fn delay(ms: u64, then: Script) -> Self {
        Script::Delay(ms, Box::new(then))
    }
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub agent_id: String,
    pub input: String,
    /// Sorted `{parent}_output` keys passed in.
    pub parent_keys: Vec<String>,
}

/// An [`AgentInvoker`] driven by per-agent scripts.
///
/// Agents without a script succeed with `{"agent": <id>}`.
#[derive(Default)]
pub struct ScriptedInvoker {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, agent_id: impl Into<String>, script: Script) -> Self {
        self.scripts.insert(agent_id.into(), script);
        self
    }

    /// Calls in the order they were started.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_order(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.agent_id).collect()
    }

    pub fn call_count(&self, agent_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.agent_id == agent_id)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Parent keys seen by the most recent call to `agent_id`.
    pub fn parent_keys(&self, agent_id: &str) -> Option<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.agent_id == agent_id)
            .map(|c| c.parent_keys.clone())
    }
}

impl AgentInvoker for ScriptedInvoker {
    fn invoke<'a>(
        &'a self,
        agent: &'a AgentNode,
        input: &'a str,
        parent_outputs: &'a HashMap<String, AgentOutcome>,
    ) -> BoxFuture<'a, Result<AgentOutcome>> {
        let mut parent_keys: Vec<String> = parent_outputs.keys().cloned().collect();
        parent_keys.sort();
        self.calls.lock().unwrap().push(Call {
            agent_id: agent.id.clone(),
            input: input.to_string(),
            parent_keys,
        });

        let mut script = self
            .scripts
            .get(&agent.id)
            .cloned()
            .unwrap_or_else(|| Script::Succeed(AgentOutput::new().with("agent", agent.id.clone())));
        let mut delay_ms = 0;
        while let Script::Delay(ms, then) = script {
            delay_ms += ms;
            script = *then;
        }

        Box::pin(async move {
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            match script {
                Script::Succeed(output) => Ok(AgentOutcome::success(output)
                    .with_reasoning(format!("{} answered", agent.name))),
                Script::Fail(message) => Err(SwitchyardError::AgentInvocation {
                    agent: agent.id.clone(),
                    message,
                }),
                Script::Panic(message) => panic!("{}", message),
                Script::Reply(outcome) => Ok(outcome),
                Script::Delay(..) => unreachable!("delays are unwrapped above"),
            }
        })
    }
}

/// A [`TextAgent`] answering each agent with canned raw text.
#[derive(Default)]
pub struct TextReplies {
    replies: HashMap<String, String>,
}

impl TextReplies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, agent_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.replies.insert(agent_id.into(), text.into());
        self
    }
}

impl TextAgent for TextReplies {
    fn complete<'a>(
        &'a self,
        agent: &'a AgentNode,
        _input: &'a str,
        _parent_outputs: &'a HashMap<String, AgentOutcome>,
    ) -> BoxFuture<'a, Result<String>> {
        let reply = self
            .replies
            .get(&agent.id)
            .cloned()
            .ok_or_else(|| SwitchyardError::AgentInvocation {
                agent: agent.id.clone(),
                message: "no reply scripted".into(),
            });
        Box::pin(async move { reply })
    }
}

/// A [`StatusSink`] that keeps every update, or rejects them all.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<StatusUpdate>>,
    failing: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every publish fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingSink {
    fn publish(
        &self,
        job_id: &JobId,
        user_id: Option<&str>,
        status: &str,
        message: &str,
    ) -> Result<()> {
        if self.failing {
            return Err(SwitchyardError::Config("status sink unavailable".into()));
        }
        self.updates.lock().unwrap().push(StatusUpdate {
            job_id: job_id.clone(),
            user_id: user_id.map(str::to_string),
            status: status.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

pub mod fixtures {
    //! Agent sets in dependency order, ready for `AgentCatalog::register`.

    use switchyard_core::agent::{AgentClass, AgentNode};
    use switchyard_core::schema::{FieldType, OutputSchema};

    pub fn agent(id: &str, deps: &[&str]) -> AgentNode {
        AgentNode::new(id, display_name(id), AgentClass::Ingestion)
            .with_dependencies(deps.iter().copied())
    }

    pub fn query_agent(id: &str, deps: &[&str]) -> AgentNode {
        AgentNode::new(id, display_name(id), AgentClass::Query)
            .with_dependencies(deps.iter().copied())
    }

    /// `a -> b`, `a -> c`, `b -> d`, `c -> d`.
    pub fn diamond() -> Vec<AgentNode> {
        vec![
            agent("a", &[]),
            agent("b", &["a"]),
            agent("c", &["a"]),
            agent("d", &["b", "c"]),
        ]
    }

    /// Civic-report ingestion: `geo -> category`, `temporal` independent.
    pub fn civic_ingestion() -> Vec<AgentNode> {
        vec![
            agent("geo", &[]).with_schema(
                OutputSchema::new()
                    .field("location", FieldType::String, true)
                    .field("lat", FieldType::Number, false)
                    .field("lng", FieldType::Number, false),
            ),
            agent("temporal", &[]).with_schema(
                OutputSchema::new().field("timestamp", FieldType::String, true),
            ),
            agent("category", &["geo"]).with_schema(
                OutputSchema::new()
                    .field("category", FieldType::String, true)
                    .field("severity", FieldType::Integer, false),
            ),
        ]
    }

    /// Independent interrogative agents for a query playbook.
    pub fn civic_query() -> Vec<AgentNode> {
        vec![
            query_agent("query_location", &[]).with_schema(
                OutputSchema::new()
                    .field("location", FieldType::String, true)
                    .field("lat", FieldType::Number, false)
                    .field("lng", FieldType::Number, false),
            ),
            query_agent("query_time", &[]).with_schema(
                OutputSchema::new().field("date", FieldType::String, true),
            ),
            query_agent("query_entities", &[]).with_schema(
                OutputSchema::new()
                    .field("entities", FieldType::Array, true)
                    .field("sentiment", FieldType::String, false),
            ),
        ]
    }

    fn display_name(id: &str) -> String {
        id.split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }
}
