//! riskwrapped: command-line client for the RiskWrapped API
//!
//! Browses the organization hierarchy and prints node-scoped risk,
//! incident, action and insight views.

mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use riskwrapped::dashboard;
use riskwrapped::{
    AggregatorConfig, DashboardConfig, DashboardError, HttpBackend, OrgTree, RiskBackend,
    ScopeMode, ScopedDataAggregator, SelectionController, SelectionState, Session,
};

#[derive(Parser)]
#[command(name = "riskwrapped")]
#[command(about = "Org-hierarchy risk dashboard client")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "riskwrapped.toml")]
    config: String,

    /// API base URL (overrides config file)
    #[arg(long, env = "RISKWRAPPED_API_URL")]
    api_url: Option<String>,

    /// Token file (overrides config file)
    #[arg(long, env = "RISKWRAPPED_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and store the access token
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "RISKWRAPPED_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored access token
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Print the organization hierarchy
    Tree,

    /// Show the aggregated view for one node
    Node {
        /// Node id
        id: i64,
        /// Include every node below it
        #[arg(long)]
        rollup: bool,
    },

    /// Show the signed-in user's dashboard
    Dashboard,

    /// Show one risk
    Risk {
        /// Risk id
        id: i64,
    },

    /// Check backend health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("riskwrapped=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = DashboardConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config))?;

    // Apply CLI overrides
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    if let Some(token_file) = cli.token_file {
        config.token_file = Some(token_file);
    }
    config.validate()?;

    let session = match &config.token_file {
        Some(path) => Session::file_backed(path.clone())?,
        None => Session::new(),
    };
    let backend = Arc::new(HttpBackend::new(&config, session.clone())?);
    let aggregator = ScopedDataAggregator::with_config(
        backend.clone(),
        AggregatorConfig {
            risk_scoping: config.risk_scoping,
        },
    );

    let result = run(cli.command, cli.json, &session, aggregator).await;

    if let Err(e) = &result {
        if let Some(err) = e.downcast_ref::<DashboardError>() {
            if dashboard::needs_login(err) {
                eprintln!("Not logged in or session expired; run `riskwrapped login`");
            }
            if let DashboardError::PartialLoad(partial) = err {
                eprint!("{}", render::partial_load(partial));
            }
        }
    }
    result
}

async fn run(
    command: Command,
    json: bool,
    session: &Session,
    aggregator: ScopedDataAggregator<HttpBackend>,
) -> anyhow::Result<()> {
    let backend = aggregator.backend().clone();

    match command {
        Command::Login { username, password } => {
            dashboard::login(backend.as_ref(), session, &username, &password).await?;
            if session.store_path().is_none() {
                warn!("No token_file configured; the token lasts only for this process");
            }
            println!("Logged in as {}", username);
        }

        Command::Logout => {
            dashboard::logout(session).await?;
            println!("Logged out");
        }

        Command::Whoami => {
            let user = backend.current_user().await.map_err(DashboardError::from)?;
            emit(json, &user, render::user)?;
        }

        Command::Tree => {
            let tree = OrgTree::load(backend.as_ref()).await?;
            if json {
                let nodes: Vec<_> = tree.preorder().map(|(_, node)| node).collect();
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                print!("{}", render::tree(&tree));
            }
        }

        Command::Node { id, rollup } => {
            let mode = if rollup {
                ScopeMode::SelfAndDescendants
            } else {
                ScopeMode::SelfOnly
            };

            let controller = SelectionController::new(aggregator);
            let tree = match controller.load_tree().await {
                Ok(tree) => tree,
                Err(e) => {
                    drop(controller);
                    return Err(unshare(e));
                }
            };
            controller.select(id, mode).await;
            let state = controller.state();
            drop(controller);

            match state {
                SelectionState::Ready { view, .. } => {
                    let name = tree.find_by_id(id)?.name.clone();
                    info!(node = id, ?mode, "Rendering node view");
                    emit(json, view.as_ref(), |v| render::view(&name, v))?;
                }
                SelectionState::Error { error, .. } => return Err(unshare(error)),
                other => anyhow::bail!("unexpected state {:?}", other),
            }
        }

        Command::Dashboard => {
            let tree = OrgTree::load(backend.as_ref()).await?;
            let dashboard = dashboard::load_user_dashboard(&aggregator, &tree).await?;
            emit(json, &dashboard, render::user_dashboard)?;
        }

        Command::Risk { id } => {
            let risk = aggregator.fetch_risk(id).await?;
            emit(json, &risk, render::risk)?;
        }

        Command::Health => {
            let health = backend.health().await.map_err(DashboardError::from)?;
            emit(json, &health, render::health)?;
        }
    }

    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl Fn(&T) -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text(value));
    }
    Ok(())
}

// Keeps the concrete error (for downcasting) once the controller is gone.
fn unshare(error: Arc<DashboardError>) -> anyhow::Error {
    match Arc::try_unwrap(error) {
        Ok(error) => error.into(),
        Err(shared) => anyhow::anyhow!("{}", shared),
    }
}
