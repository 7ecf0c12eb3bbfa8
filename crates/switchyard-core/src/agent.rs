use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchyardError};
use crate::schema::{OutputSchema, MAX_OUTPUT_KEYS};

/// Playbook family an agent belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentClass {
    Ingestion,
    Query,
    Management,
}

impl std::fmt::Display for AgentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentClass::Ingestion => write!(f, "ingestion"),
            AgentClass::Query => write!(f, "query"),
            AgentClass::Management => write!(f, "management"),
        }
    }
}

impl std::str::FromStr for AgentClass {
    type Err = SwitchyardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ingestion" => Ok(AgentClass::Ingestion),
            "query" => Ok(AgentClass::Query),
            "management" => Ok(AgentClass::Management),
            other => Err(SwitchyardError::Config(format!(
                "unknown agent class '{}'",
                other
            ))),
        }
    }
}

/// A registered analysis agent.
///
/// Each agent is an opaque call to an external reasoning service. The node
/// carries what the engine needs to schedule it (`dependencies`) and what the
/// invoker needs to run it (`system_prompt`, `tools`, `output_schema`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentNode {
    /// Unique identifier for this agent.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    pub class: AgentClass,
    /// Parent agent ids whose outputs this agent consumes.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    #[serde(default)]
    pub output_schema: Option<OutputSchema>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Tool names available to the invocation (empty = invoker default).
    #[serde(default)]
    pub tools: Vec<String>,
    /// User-defined agents are held to the single-parent policy.
    #[serde(default)]
    pub custom: bool,
    /// Bumped on every explicit update.
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    1
}

impl AgentNode {
    /// Create a new agent with minimal configuration.
    pub fn new(id: impl Into<String>, name: impl Into<String>, class: AgentClass) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            class,
            dependencies: BTreeSet::new(),
            output_schema: None,
            system_prompt: None,
            tools: vec![],
            custom: false,
            version: default_version(),
        }
    }

    /// Add a single parent dependency.
    pub fn depends_on(mut self, parent: impl Into<String>) -> Self {
        self.dependencies.insert(parent.into());
        self
    }

    /// Replace the dependency set.
    pub fn with_dependencies<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Mark as a user-defined agent.
    pub fn custom(mut self) -> Self {
        self.custom = true;
        self
    }

    /// Reject declared schemas larger than the output ceiling.
    pub fn check_schema(&self) -> Result<()> {
        if let Some(schema) = &self.output_schema {
            if schema.len() > MAX_OUTPUT_KEYS {
                return Err(SwitchyardError::SchemaTooLarge {
                    agent: self.id.clone(),
                    keys: schema.len(),
                    max: MAX_OUTPUT_KEYS,
                });
            }
        }
        Ok(())
    }
}
