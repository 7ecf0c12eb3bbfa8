use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use switchyard_core::agent::{AgentClass, AgentNode};
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::graph::{Edge, ExecutionGraph, ExecutionPlan, Playbook};
use switchyard_core::traits::ConfigStore;

use crate::catalog::AgentCatalog;
use crate::graph::ExecutionPlanner;

pub const DEFAULT_TENANT: &str = "default";

#[derive(Debug, Clone, Default)]
struct TenantConfig {
    catalog: AgentCatalog,
    playbooks: BTreeMap<(String, AgentClass), Playbook>,
}

impl TenantConfig {
    fn save_agent(&mut self, node: AgentNode) -> Result<u32> {
        if !self.catalog.contains(&node.id) {
            self.catalog.register(node)?;
            return Ok(1);
        }

        let agent_id = node.id.clone();
        let mut candidate = self.catalog.clone();
        let version = candidate.update(node)?;
        for playbook in self.playbooks.values() {
            if !playbook.graph.nodes.contains(&agent_id) {
                continue;
            }
            ExecutionPlanner::validate_playbook(&playbook.graph, playbook.class, &candidate)
                .map_err(|e| SwitchyardError::AgentInUse {
                    agent: agent_id.clone(),
                    playbook: playbook.name.clone(),
                    reason: e.to_string(),
                })?;
        }
        self.catalog = candidate;
        Ok(version)
    }

    fn save_playbook(&mut self, playbook: Playbook) -> Result<ExecutionPlan> {
        let plan = ExecutionPlanner::plan_playbook(&playbook.graph, playbook.class, &self.catalog)?;
        self.playbooks
            .insert((playbook.domain_id.clone(), playbook.class), playbook);
        Ok(plan)
    }
}

/// In-memory [`ConfigStore`] holding one catalog and playbook set per tenant.
///
/// Agents and playbooks are validated when saved, so everything the store
/// hands out has already passed graph validation and planning.
#[derive(Default)]
pub struct MemoryConfigStore {
    tenants: RwLock<HashMap<String, TenantConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update an agent. Returns its version.
    ///
    /// An update must keep every saved playbook that contains the agent
    /// valid, or it is rejected with `AgentInUse`.
    pub async fn save_agent(&self, tenant_id: &str, node: AgentNode) -> Result<u32> {
        let mut tenants = self.tenants.write().await;
        let agent_id = node.id.clone();
        let version = tenants
            .entry(tenant_id.to_string())
            .or_default()
            .save_agent(node)?;
        info!(tenant_id, agent_id = %agent_id, version, "Agent saved");
        Ok(version)
    }

    /// Validate and store a playbook, replacing any playbook with the same
    /// domain and class. Returns the plan it will run with.
    pub async fn save_playbook(
        &self,
        tenant_id: &str,
        playbook: Playbook,
    ) -> Result<ExecutionPlan> {
        let mut tenants = self.tenants.write().await;
        let tenant = tenants.entry(tenant_id.to_string()).or_default();
        let name = playbook.name.clone();
        let plan = tenant.save_playbook(playbook)?;
        info!(tenant_id, playbook = %name, levels = plan.levels.len(), "Playbook saved");
        Ok(plan)
    }

    /// Snapshot of a tenant's agent catalog.
    pub async fn catalog(&self, tenant_id: &str) -> Option<AgentCatalog> {
        self.tenants
            .read()
            .await
            .get(tenant_id)
            .map(|t| t.catalog.clone())
    }

    /// Every saved playbook, as `(tenant_id, playbook)`, sorted.
    pub async fn playbooks(&self) -> Vec<(String, Playbook)> {
        let tenants = self.tenants.read().await;
        let mut all: Vec<(String, Playbook)> = tenants
            .iter()
            .flat_map(|(tenant, config)| {
                config
                    .playbooks
                    .values()
                    .map(move |p| (tenant.clone(), p.clone()))
            })
            .collect();
        all.sort_by(|a, b| {
            (&a.0, &a.1.domain_id, a.1.class).cmp(&(&b.0, &b.1.domain_id, b.1.class))
        });
        all
    }

    /// Build a store from a TOML catalog file.
    pub fn from_catalog_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwitchyardError::ConfigNotFound(path.display().to_string()))?;
        Self::from_catalog_str(&content)
    }

    /// Build a store from TOML catalog text.
    ///
    /// Agents may appear in any order; they are registered parents first.
    pub fn from_catalog_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(&switchyard_core::config::expand_env_vars(content))
            .map_err(|e| SwitchyardError::Config(e.to_string()))?;

        let mut by_tenant: BTreeMap<String, Vec<AgentNode>> = BTreeMap::new();
        for entry in file.agents {
            by_tenant.entry(entry.tenant_id).or_default().push(entry.agent);
        }

        let mut tenants: HashMap<String, TenantConfig> = HashMap::new();
        for (tenant_id, agents) in by_tenant {
            let tenant = tenants.entry(tenant_id.clone()).or_default();
            for agent in registration_order(agents)? {
                tenant.save_agent(agent)?;
            }
            debug!(tenant_id = %tenant_id, agents = tenant.catalog.len(), "Catalog loaded");
        }

        for entry in file.playbooks {
            let tenant = tenants.entry(entry.tenant_id.clone()).or_default();
            let playbook = entry.into_playbook(&tenant.catalog);
            tenant.save_playbook(playbook)?;
        }

        Ok(Self {
            tenants: RwLock::new(tenants),
        })
    }
}

/// Order agents so every dependency is registered before its dependents.
fn registration_order(agents: Vec<AgentNode>) -> Result<Vec<AgentNode>> {
    let graph = ExecutionGraph::from_agents(agents.iter());
    let plan = ExecutionPlanner::plan(&graph.nodes, &graph.edges)?;
    let mut by_id: HashMap<String, AgentNode> =
        agents.into_iter().map(|a| (a.id.clone(), a)).collect();
    Ok(plan
        .flatten()
        .into_iter()
        .filter_map(|id| by_id.remove(id))
        .collect())
}

impl ConfigStore for MemoryConfigStore {
    fn load_agent(&self, tenant_id: &str, agent_id: &str) -> BoxFuture<'_, Result<AgentNode>> {
        let tenant_id = tenant_id.to_string();
        let agent_id = agent_id.to_string();

        Box::pin(async move {
            let tenants = self.tenants.read().await;
            tenants
                .get(&tenant_id)
                .and_then(|t| t.catalog.get(&agent_id))
                .cloned()
                .ok_or(SwitchyardError::AgentNotFound(agent_id))
        })
    }

    fn load_playbook(
        &self,
        tenant_id: &str,
        domain_id: &str,
        class: AgentClass,
    ) -> BoxFuture<'_, Result<Playbook>> {
        let tenant_id = tenant_id.to_string();
        let domain_id = domain_id.to_string();

        Box::pin(async move {
            let tenants = self.tenants.read().await;
            tenants
                .get(&tenant_id)
                .and_then(|t| t.playbooks.get(&(domain_id.clone(), class)))
                .cloned()
                .ok_or(SwitchyardError::PlaybookNotFound {
                    tenant: tenant_id,
                    domain: domain_id,
                    class,
                })
        })
    }
}

/// On-disk catalog: agents and playbooks for any number of tenants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
    #[serde(default)]
    pub playbooks: Vec<PlaybookEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    #[serde(flatten)]
    pub agent: AgentNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookEntry {
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    pub name: String,
    pub domain_id: String,
    pub class: AgentClass,
    /// Member agent ids.
    pub agents: Vec<String>,
    /// Explicit edges. When absent, edges come from the members' declared
    /// dependencies.
    #[serde(default)]
    pub edges: Option<Vec<Edge>>,
}

impl PlaybookEntry {
    fn into_playbook(self, catalog: &AgentCatalog) -> Playbook {
        let graph = match self.edges {
            Some(edges) => ExecutionGraph {
                nodes: self.agents.into_iter().collect(),
                edges,
            },
            None => {
                let members = self.agents.iter().filter_map(|id| catalog.get(id));
                let mut graph = ExecutionGraph::from_agents(members);
                // Unknown members stay in the graph so validation names them.
                graph.nodes.extend(self.agents);
                graph
            }
        };
        Playbook::new(self.name, self.domain_id, self.class, graph)
    }
}

fn default_tenant() -> String {
    DEFAULT_TENANT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::schema::FieldType;
    use switchyard_test_utils::fixtures;

    const CATALOG: &str = r#"
[[agents]]
id = "category"
name = "Category Classifier"
class = "ingestion"
dependencies = ["geo"]
output_schema = [{ key = "category", type = "string", required = true }]

[[agents]]
id = "geo"
name = "Geo Locator"
class = "ingestion"
output_schema = [
    { key = "location", type = "string", required = true },
    { key = "lat", type = "number" },
]

[[agents]]
id = "temporal"
name = "Temporal Parser"
class = "ingestion"

[[agents]]
tenant_id = "acme"
id = "who"
name = "Who"
class = "query"

[[playbooks]]
name = "civic-intake"
domain_id = "roads"
class = "ingestion"
agents = ["geo", "temporal", "category"]

[[playbooks]]
tenant_id = "acme"
name = "ask"
domain_id = "roads"
class = "query"
agents = ["who"]
"#;

    fn playbook(name: &str, class: AgentClass, graph: ExecutionGraph) -> Playbook {
        Playbook::new(name, "roads", class, graph)
    }

    #[tokio::test]
    async fn test_catalog_file_loads_out_of_order_agents() {
        let store = MemoryConfigStore::from_catalog_str(CATALOG).unwrap();

        let geo = store.load_agent("default", "geo").await.unwrap();
        assert_eq!(geo.name, "Geo Locator");
        let schema = geo.output_schema.unwrap();
        assert_eq!(schema.get("lat").unwrap().field_type, Some(FieldType::Number));
        assert!(!schema.get("lat").unwrap().required);

        let intake = store
            .load_playbook("default", "roads", AgentClass::Ingestion)
            .await
            .unwrap();
        assert_eq!(intake.graph.edges, vec![Edge::new("geo", "category")]);

        assert!(store.load_agent("acme", "who").await.is_ok());
        assert!(matches!(
            store.load_agent("acme", "geo").await,
            Err(SwitchyardError::AgentNotFound(_))
        ));
        assert!(matches!(
            store.load_playbook("default", "parks", AgentClass::Ingestion).await,
            Err(SwitchyardError::PlaybookNotFound { .. })
        ));
        assert_eq!(store.playbooks().await.len(), 2);
    }

    #[test]
    fn test_catalog_with_cycle_rejected() {
        let text = r#"
[[agents]]
id = "a"
name = "A"
class = "ingestion"
dependencies = ["b"]

[[agents]]
id = "b"
name = "B"
class = "ingestion"
dependencies = ["a"]
"#;
        assert!(matches!(
            MemoryConfigStore::from_catalog_str(text),
            Err(SwitchyardError::PlannerCycle { .. })
        ));
    }

    #[test]
    fn test_catalog_playbook_class_mismatch_rejected() {
        let text = r#"
[[agents]]
id = "who"
name = "Who"
class = "query"

[[playbooks]]
name = "intake"
domain_id = "roads"
class = "ingestion"
agents = ["who"]
"#;
        assert!(matches!(
            MemoryConfigStore::from_catalog_str(text),
            Err(SwitchyardError::ClassMismatch { .. })
        ));
    }

    #[test]
    fn test_catalog_explicit_edges_must_cover_dependencies() {
        let text = r#"
[[agents]]
id = "a"
name = "A"
class = "query"

[[agents]]
id = "b"
name = "B"
class = "query"
dependencies = ["a"]

[[playbooks]]
name = "ask"
domain_id = "roads"
class = "query"
agents = ["a", "b"]
edges = []
"#;
        assert!(matches!(
            MemoryConfigStore::from_catalog_str(text),
            Err(SwitchyardError::MissingEdge { ref parent, ref child })
                if parent == "a" && child == "b"
        ));

        let with_edge = text.replace("edges = []", r#"edges = [{ from = "a", to = "b" }]"#);
        assert!(MemoryConfigStore::from_catalog_str(&with_edge).is_ok());
    }

    #[test]
    fn test_catalog_parse_error() {
        assert!(matches!(
            MemoryConfigStore::from_catalog_str("[[agents]\nid = "),
            Err(SwitchyardError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_save_playbook_returns_plan() {
        let store = MemoryConfigStore::new();
        for agent in fixtures::civic_ingestion() {
            store.save_agent("t1", agent).await.unwrap();
        }
        let catalog = store.catalog("t1").await.unwrap();
        let graph = ExecutionGraph::from_agents(catalog.iter());
        let plan = store
            .save_playbook("t1", playbook("intake", AgentClass::Ingestion, graph))
            .await
            .unwrap();
        assert_eq!(plan.levels, vec![vec!["geo", "temporal"], vec!["category"]]);
    }

    #[tokio::test]
    async fn test_update_referenced_agent_must_keep_playbook_valid() {
        let store = MemoryConfigStore::new();
        for agent in fixtures::civic_ingestion() {
            store.save_agent("t1", agent).await.unwrap();
        }
        let graph = ExecutionGraph::new()
            .with_node("geo")
            .with_node("category")
            .with_edge("geo", "category");
        store
            .save_playbook("t1", playbook("intake", AgentClass::Ingestion, graph))
            .await
            .unwrap();

        // Moving geo into the query class would break the ingestion playbook.
        let moved = AgentNode::new("geo", "Geo", AgentClass::Query);
        let err = store.save_agent("t1", moved).await.unwrap_err();
        assert!(matches!(
            err,
            SwitchyardError::AgentInUse { ref agent, ref playbook, .. }
                if agent == "geo" && playbook == "intake"
        ));
        let geo = store.load_agent("t1", "geo").await.unwrap();
        assert_eq!(geo.class, AgentClass::Ingestion);
        assert_eq!(geo.version, 1);

        // Depending on temporal needs an edge the saved playbook lacks.
        let rewired = fixtures::agent("category", &["geo", "temporal"]);
        let graph = ExecutionGraph::new()
            .with_node("geo")
            .with_node("temporal")
            .with_node("category")
            .with_edge("geo", "category");
        let mut guarded = playbook("guarded", AgentClass::Ingestion, graph);
        guarded.domain_id = "parks".into();
        store.save_playbook("t1", guarded).await.unwrap();
        assert!(matches!(
            store.save_agent("t1", rewired).await,
            Err(SwitchyardError::AgentInUse { ref playbook, .. }) if playbook == "guarded"
        ));

        // A compatible update goes through with a version bump.
        let renamed = fixtures::agent("geo", &[]);
        assert_eq!(store.save_agent("t1", renamed).await.unwrap(), 2);
    }
}
