use std::sync::Arc;

use serde_json::json;

use switchyard_core::agent::AgentClass;
use switchyard_core::config::SwitchyardConfig;
use switchyard_core::error::SwitchyardError;
use switchyard_core::event::EventBus;
use switchyard_core::schema::AgentOutput;
use switchyard_core::types::{AgentOutcome, Job, JobStatus, OutcomeStatus};
use switchyard_engine::{AggregateStatus, MemoryConfigStore, PlaybookRunner};
use switchyard_test_utils::{Script, ScriptedInvoker};

const CATALOG: &str = r#"
[[agents]]
id = "category"
name = "Category Classifier"
class = "ingestion"
dependencies = ["geo", "temporal"]
output_schema = [{ key = "category", type = "string", required = true }]

[[agents]]
id = "geo"
name = "Geo Locator"
class = "ingestion"
output_schema = [
    { key = "location", type = "string", required = true },
    { key = "lat", type = "number" },
    { key = "lng", type = "number" },
]

[[agents]]
id = "temporal"
name = "Temporal Parser"
class = "ingestion"
output_schema = [{ key = "timestamp", type = "string", required = true }]

[[agents]]
id = "query_location"
name = "Query Location"
class = "query"
output_schema = [{ key = "location", type = "string", required = true }]

[[agents]]
id = "query_time"
name = "Query Time"
class = "query"
output_schema = [{ key = "date", type = "string", required = true }]

[[agents]]
id = "query_entities"
name = "Query Entities"
class = "query"
output_schema = [
    { key = "entities", type = "array", required = true },
    { key = "sentiment", type = "string" },
]

[[playbooks]]
name = "civic-intake"
domain_id = "roads"
class = "ingestion"
agents = ["geo", "temporal", "category"]

[[playbooks]]
name = "civic-ask"
domain_id = "roads"
class = "query"
agents = ["query_location", "query_time", "query_entities"]
"#;

fn store() -> Arc<MemoryConfigStore> {
    Arc::new(MemoryConfigStore::from_catalog_str(CATALOG).expect("catalog loads"))
}

fn output(value: serde_json::Value) -> AgentOutput {
    AgentOutput::from_value(value).expect("object output")
}

#[tokio::test]
async fn test_ingestion_pipeline_end_to_end() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .on("geo", Script::succeed(output(json!({"location": "Main St", "lat": 40.7}))))
            .on(
                "temporal",
                Script::delay(
                    20,
                    Script::succeed(output(json!({"timestamp": "2024-05-01T08:00:00Z"}))),
                ),
            )
            .on("category", Script::succeed(output(json!({"category": "pothole"})))),
    );
    let bus = Arc::new(EventBus::new(64));
    let mut updates = bus.subscribe();
    let runner = PlaybookRunner::new(store(), invoker.clone(), SwitchyardConfig::default())
        .with_sink(bus.clone());

    let mut job =
        Job::new("default", "roads", "Deep pothole on Main St since Monday").with_user("u-7");
    let result = runner.run_ingestion(&mut job).await.expect("run");

    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.cache_stats.executed_agents, 3);
    let logged: Vec<&str> = result.execution_log.iter().map(|e| e.agent_id.as_str()).collect();
    assert_eq!(logged, vec!["geo", "temporal", "category"]);
    assert_eq!(
        invoker.parent_keys("category"),
        Some(vec!["geo_output".to_string(), "temporal_output".to_string()])
    );

    let mut statuses = Vec::new();
    while let Ok(update) = updates.try_recv() {
        assert_eq!(update.user_id.as_deref(), Some("u-7"));
        statuses.push(update.status);
    }
    assert_eq!(statuses.first().map(String::as_str), Some("running"));
    assert_eq!(statuses.last().map(String::as_str), Some("completed"));
    assert_eq!(statuses.iter().filter(|s| *s == "success").count(), 3);
}

#[tokio::test]
async fn test_ingestion_failure_skips_dependents() {
    let invoker = Arc::new(ScriptedInvoker::new().on("temporal", Script::fail("no timestamp")));
    let runner = PlaybookRunner::new(store(), invoker.clone(), SwitchyardConfig::default());

    let mut job = Job::new("default", "roads", "Something broke somewhere");
    let result = runner.run_ingestion(&mut job).await.expect("run");

    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.outcome("temporal").map(|o| o.status), Some(OutcomeStatus::Error));
    assert_eq!(result.outcome("category").map(|o| o.status), Some(OutcomeStatus::Skipped));
    assert_eq!(invoker.call_count("category"), 0);
}

#[tokio::test]
async fn test_query_pipeline_with_cached_outcome() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .on("query_location", Script::succeed(output(json!({"location": 12}))))
            .on(
                "query_entities",
                Script::succeed(output(json!({
                    "entities": ["City Hall", "city hall", "Main St"],
                    "sentiment": "negative"
                }))),
            ),
    );
    let runner = PlaybookRunner::new(store(), invoker.clone(), SwitchyardConfig::default());

    let cached = AgentOutcome::success(output(json!({"date": "2024-05-01"})));
    let mut job = Job::new("default", "roads", "Complaints about City Hall last week?")
        .with_cached("query_time", cached);
    let report = runner.run_query(&mut job).await.expect("run");

    assert_eq!(invoker.call_count("query_time"), 0);
    assert_eq!(report.job.cache_stats.cached_agents, 1);
    assert_eq!(report.aggregate.status, AggregateStatus::Success);

    // location has the wrong type, so it is dropped before synthesis
    assert_eq!(report.validation.passed().count(), 2);
    assert!(report.validation.errors.iter().any(|e| e.starts_with("query_location:")));

    let doc = &report.document;
    assert!(doc.location.is_none());
    assert!(doc.processing_summary.has_temporal);
    assert_eq!(doc.entities, vec![json!("City Hall"), json!("Main St")]);
    assert_eq!(doc.sentiment, Some(json!("negative")));
}

#[tokio::test]
async fn test_unknown_playbook() {
    let runner = PlaybookRunner::new(
        store(),
        Arc::new(ScriptedInvoker::new()),
        SwitchyardConfig::default(),
    );
    let mut job = Job::new("default", "parks", "Broken swing");
    assert!(matches!(
        runner.run_ingestion(&mut job).await,
        Err(SwitchyardError::PlaybookNotFound { class: AgentClass::Ingestion, .. })
    ));
}
