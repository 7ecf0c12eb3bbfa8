pub mod agent;
pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod schema;
pub mod traits;
pub mod types;

pub use agent::{AgentClass, AgentNode};
pub use config::SwitchyardConfig;
pub use error::{Result, SwitchyardError};
pub use event::EventBus;
pub use graph::{Edge, ExecutionGraph, ExecutionPlan, Playbook};
pub use schema::{AgentOutput, FieldType, OutputSchema, SchemaField, MAX_OUTPUT_KEYS};
pub use types::*;
