use thiserror::Error;

use crate::agent::AgentClass;

#[derive(Debug, Error)]
pub enum SwitchyardError {
    // Graph errors
    #[error("Cycle detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("Unknown node '{node}' referenced by '{referenced_by}'")]
    UnknownNode { node: String, referenced_by: String },

    #[error("Agent '{node}' has class {actual}, playbook expects {expected}")]
    ClassMismatch {
        node: String,
        expected: AgentClass,
        actual: AgentClass,
    },

    #[error("Node '{node}' would have more than one parent: {}", .parents.join(", "))]
    MultipleParents { node: String, parents: Vec<String> },

    #[error("Agent '{child}' depends on '{parent}' but edge {parent} -> {child} is missing")]
    MissingEdge { parent: String, child: String },

    // Planner errors
    #[error("Execution plan has unresolved cycle among: {}", .stuck.join(", "))]
    PlannerCycle { stuck: Vec<String> },

    // Agent errors
    #[error("Agent invocation failed: {agent}: {message}")]
    AgentInvocation { agent: String, message: String },

    #[error("Malformed agent output: {0}")]
    MalformedOutput(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Agent '{agent}' is referenced by playbook '{playbook}': {reason}")]
    AgentInUse {
        agent: String,
        playbook: String,
        reason: String,
    },

    // Validation errors
    #[error("Output schema for '{agent}' declares {keys} keys (max {max})")]
    SchemaTooLarge { agent: String, keys: usize, max: usize },

    #[error("Output validation failed for {agent}: {}", .errors.join("; "))]
    Validation { agent: String, errors: Vec<String> },

    // Store errors
    #[error("Playbook not found: tenant={tenant} domain={domain} class={class}")]
    PlaybookNotFound {
        tenant: String,
        domain: String,
        class: AgentClass,
    },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwitchyardError {
    /// Whether this error belongs to the graph/planner family that must be
    /// surfaced at validate-or-plan time.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            SwitchyardError::CycleDetected { .. }
                | SwitchyardError::UnknownNode { .. }
                | SwitchyardError::ClassMismatch { .. }
                | SwitchyardError::MultipleParents { .. }
                | SwitchyardError::MissingEdge { .. }
                | SwitchyardError::PlannerCycle { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SwitchyardError>;
