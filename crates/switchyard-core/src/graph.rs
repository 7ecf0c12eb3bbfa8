use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentClass, AgentNode};

/// A dependency edge: `from` is the parent, `to` the dependent child.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// The agent set of one playbook and the dependency edges between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionGraph {
    pub nodes: BTreeSet<String>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl ExecutionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, id: impl Into<String>) -> Self {
        self.nodes.insert(id.into());
        self
    }

    pub fn with_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(Edge::new(from, to));
        self
    }

    /// Derive a graph from agents' declared dependencies.
    ///
    /// Edges come out sorted by child then parent. Dependencies on agents
    /// outside the slice are kept so the planner can report them.
    pub fn from_agents<'a, I>(agents: I) -> Self
    where
        I: IntoIterator<Item = &'a AgentNode>,
    {
        let mut graph = Self::new();
        let mut edges = BTreeSet::new();
        for agent in agents {
            graph.nodes.insert(agent.id.clone());
            for parent in &agent.dependencies {
                edges.insert((agent.id.clone(), parent.clone()));
            }
        }
        graph.edges = edges
            .into_iter()
            .map(|(child, parent)| Edge::new(parent, child))
            .collect();
        graph
    }

    /// Parents of a node, in edge order.
    pub fn parents_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.to == id)
            .map(|e| e.from.as_str())
    }

    /// Children of a node, in edge order.
    pub fn children_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.from == id)
            .map(|e| e.to.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A named, domain-scoped execution graph for one purpose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    pub domain_id: String,
    pub class: AgentClass,
    pub graph: ExecutionGraph,
}

impl Playbook {
    pub fn new(
        name: impl Into<String>,
        domain_id: impl Into<String>,
        class: AgentClass,
        graph: ExecutionGraph,
    ) -> Self {
        Self {
            name: name.into(),
            domain_id: domain_id.into(),
            class,
            graph,
        }
    }
}

/// Ordered execution levels. Members of a level have no edges between them
/// and are sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub levels: Vec<Vec<String>>,
}

impl ExecutionPlan {
    pub fn new(levels: Vec<Vec<String>>) -> Self {
        Self { levels }
    }

    /// All node ids in level order.
    pub fn flatten(&self) -> Vec<&str> {
        self.levels
            .iter()
            .flat_map(|level| level.iter().map(String::as_str))
            .collect()
    }

    /// Index of the level containing `id`.
    pub fn level_of(&self, id: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|n| n == id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.level_of(id).is_some()
    }

    pub fn node_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl std::fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, level) in self.levels.iter().enumerate() {
            writeln!(f, "level {}: [{}]", i, level.join(", "))?;
        }
        Ok(())
    }
}
