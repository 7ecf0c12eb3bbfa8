use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use switchyard_core::agent::AgentClass;
use switchyard_core::config::SwitchyardConfig;
use switchyard_core::traits::ConfigStore;
use switchyard_engine::store::DEFAULT_TENANT;
use switchyard_engine::{ExecutionPlanner, GraphValidator, MemoryConfigStore};

#[derive(Parser)]
#[command(name = "switchyard", version, about = "Dependency-ordered agent orchestration")]
struct Cli {
    /// Path to engine config file
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a catalog file and check every agent and playbook in it
    Validate {
        /// Catalog TOML with [[agents]] and [[playbooks]]
        catalog: PathBuf,
    },
    /// Print the execution plan of one playbook
    Plan {
        catalog: PathBuf,
        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,
        #[arg(long)]
        domain: String,
        /// ingestion or query
        #[arg(long)]
        class: AgentClass,
    },
    /// Print an agent and its ancestry as JSON
    Graph {
        catalog: PathBuf,
        #[arg(long, default_value = DEFAULT_TENANT)]
        tenant: String,
        agent: String,
    },
    /// Show the effective engine configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Validate { catalog } => {
            let store = load_catalog(&catalog)?;
            let playbooks = store.playbooks().await;
            for (tenant, playbook) in &playbooks {
                let agents = store
                    .catalog(tenant)
                    .await
                    .with_context(|| format!("tenant '{tenant}' has no agents"))?;
                let plan =
                    ExecutionPlanner::plan_playbook(&playbook.graph, playbook.class, &agents)?;
                println!(
                    "ok  {tenant}/{}/{} ({}): {plan}",
                    playbook.domain_id, playbook.class, playbook.name
                );
            }
            info!(playbooks = playbooks.len(), "Catalog valid");
        }
        Commands::Plan {
            catalog,
            tenant,
            domain,
            class,
        } => {
            let store = load_catalog(&catalog)?;
            let playbook = store.load_playbook(&tenant, &domain, class).await?;
            let agents = store
                .catalog(&tenant)
                .await
                .with_context(|| format!("tenant '{tenant}' has no agents"))?;
            let plan = ExecutionPlanner::plan_playbook(&playbook.graph, class, &agents)?;
            for (index, level) in plan.levels.iter().enumerate() {
                println!("level {index}: {}", level.join(", "));
            }
        }
        Commands::Graph {
            catalog,
            tenant,
            agent,
        } => {
            let store = load_catalog(&catalog)?;
            let agents = store
                .catalog(&tenant)
                .await
                .with_context(|| format!("tenant '{tenant}' has no agents"))?;
            let graph = GraphValidator::build_visualization_graph(&agent, &agents)?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
        Commands::Config => {
            println!("{config:#?}");
        }
    }

    Ok(())
}

/// A missing default config file falls back to built-in defaults.
fn load_config(path: &Path) -> anyhow::Result<SwitchyardConfig> {
    if path.exists() {
        SwitchyardConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))
    } else {
        Ok(SwitchyardConfig::default())
    }
}

fn load_catalog(path: &Path) -> anyhow::Result<MemoryConfigStore> {
    MemoryConfigStore::from_catalog_file(path).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Catalog rejected");
        anyhow::Error::new(e).context(format!("invalid catalog {}", path.display()))
    })
}
