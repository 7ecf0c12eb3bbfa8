//! Dependency graph checks and execution planning.
//!
//! A playbook is a directed acyclic graph of agents: an edge `from -> to`
//! means `to` consumes `from`'s output. `validator` guards the graph when
//! agents and playbooks are saved; `planner` turns a valid graph into
//! execution levels whose members can run in parallel.

pub mod planner;
pub mod validator;

pub use planner::ExecutionPlanner;
pub use validator::{GraphValidator, VisualizationEdge, VisualizationGraph, VisualizationNode};
