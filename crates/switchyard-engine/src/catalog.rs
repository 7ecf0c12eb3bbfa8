use std::collections::BTreeMap;

use tracing::info;

use switchyard_core::agent::{AgentClass, AgentNode};
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::graph::Edge;

use crate::graph::GraphValidator;

/// Registry of agent definitions for one tenant.
///
/// Every agent admitted through [`register`](Self::register) or
/// [`update`](Self::update) has known dependencies, a schema within the
/// output ceiling, and no dependency cycle. The catalog is a plain value
/// passed to the planner and engine; nothing reads it from global state.
#[derive(Debug, Clone, Default)]
pub struct AgentCatalog {
    agents: BTreeMap<String, AgentNode>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent.
    pub fn register(&mut self, node: AgentNode) -> Result<()> {
        if self.agents.contains_key(&node.id) {
            return Err(SwitchyardError::DuplicateAgent(node.id));
        }
        self.check(&node)?;
        info!(agent_id = %node.id, class = %node.class, "Agent registered");
        self.agents.insert(node.id.clone(), node);
        Ok(())
    }

    /// Replace an existing agent's definition, bumping its version.
    ///
    /// The graph is re-validated with the new dependency set. Returns the new
    /// version number.
    pub fn update(&mut self, mut node: AgentNode) -> Result<u32> {
        let current = self
            .agents
            .get(&node.id)
            .ok_or_else(|| SwitchyardError::AgentNotFound(node.id.clone()))?;
        node.version = current.version + 1;
        self.check(&node)?;

        let version = node.version;
        info!(agent_id = %node.id, version, "Agent updated");
        self.agents.insert(node.id.clone(), node);
        Ok(version)
    }

    fn check(&self, node: &AgentNode) -> Result<()> {
        node.check_schema()?;
        GraphValidator::validate(&node.id, &node.dependencies, self)?;
        if node.custom {
            let edges: Vec<Edge> = node
                .dependencies
                .iter()
                .map(|parent| Edge::new(parent.clone(), node.id.clone()))
                .collect();
            GraphValidator::validate_single_parent(&edges)?;
        }
        Ok(())
    }

    /// Insert without any checks. Test and in-crate use only.
    pub(crate) fn insert_unchecked(&mut self, node: AgentNode) {
        self.agents.insert(node.id.clone(), node);
    }

    pub fn get(&self, id: &str) -> Option<&AgentNode> {
        self.agents.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Agents in id order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentNode> {
        self.agents.values()
    }

    /// Agents of one class, in id order.
    pub fn of_class(&self, class: AgentClass) -> impl Iterator<Item = &AgentNode> {
        self.agents.values().filter(move |a| a.class == class)
    }

    /// Agents that declare `id` as a dependency.
    pub fn dependents_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a AgentNode> + 'a {
        self.agents
            .values()
            .filter(move |a| a.dependencies.contains(id))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
