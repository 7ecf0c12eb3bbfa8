pub mod aggregator;
pub mod catalog;
pub mod graph;
pub mod orchestrator;
pub mod output_validator;
pub mod runner;
pub mod store;
pub mod synthesizer;
pub mod text_invoker;

pub use aggregator::{AgentResult, AggregateResult, AggregateStatus, ResultAggregator};
pub use catalog::AgentCatalog;
pub use graph::{ExecutionPlanner, GraphValidator, VisualizationGraph};
pub use orchestrator::OrchestrationEngine;
pub use output_validator::{OutputCleaner, OutputValidator, ValidationReport};
pub use runner::{PlaybookRunner, QueryReport};
pub use store::{CatalogFile, MemoryConfigStore};
pub use synthesizer::{SynthesizedDocument, Synthesizer};
pub use text_invoker::TextInvoker;
