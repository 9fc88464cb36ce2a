//! chi-agent Server
//!
//! Runs the agent as a local daemon (REST + WebSocket API), as a
//! line-oriented REPL on the terminal, or as an MCP tool server on stdio.
//! The daemon and the REPL share one [`JobController`], so every turn is
//! serialized no matter where it came from.

mod handlers;
mod mcp;
mod repl;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use clap::{Parser, ValueEnum};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chi_core::{Agent, HistoryStore, JobController, LlmProvider, ServiceConfig, SessionStore, ToolRegistry};
use chi_runtime::OllamaProvider;
use chi_tools::ToolsConfig;

use crate::handlers::{
    ask, ask_async, clear_data, clear_history, collected_data, delete_conversation, events_handler,
    health_check, history, status, status_indicator,
};
use crate::state::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Prompt on stdin, answers on stdout
    Interactive,
    /// Serve the HTTP/WebSocket API
    Daemon,
    /// Expose the tools to an MCP client over stdio
    Mcp,
}

#[derive(Debug, Parser)]
#[command(name = "chi-server", version, about = "chi-agent AI orchestration service")]
struct Cli {
    /// Run mode
    #[arg(long, value_enum, default_value_t = Mode::Interactive)]
    mode: Mode,

    /// Model id, overrides CHI_MODEL
    #[arg(long)]
    model: Option<String>,

    /// Daemon listen address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:7411")]
    bind: String,

    /// History file, overrides CHI_HISTORY_PATH
    #[arg(long)]
    history: Option<PathBuf>,

    /// Keep history in memory only
    #[arg(long, conflicts_with = "history")]
    memory_history: bool,
}

/// The HTTP API
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Agent API
        .route("/api/ask", post(ask))
        .route("/api/ask/async", post(ask_async))
        .route("/api/status", get(status))
        .route("/api/status/indicator", get(status_indicator))
        .route("/api/events", get(events_handler))
        // History
        .route("/api/history", get(history).delete(clear_history))
        .route("/api/history/{id}", delete(delete_conversation))
        .route("/api/data", get(collected_data).delete(clear_data))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn open_store(cli: &Cli, config: &ServiceConfig) -> Arc<dyn HistoryStore> {
    if cli.memory_history {
        tracing::info!("History kept in memory only");
        return Arc::new(SessionStore::in_memory(config.history.clone()));
    }

    match SessionStore::open(config.history_path.clone(), config.history.clone()) {
        Ok(store) => {
            tracing::info!(path = %config.history_path.display(), "History loaded");
            Arc::new(store)
        }
        Err(e) => {
            tracing::error!(path = %config.history_path.display(), error = %e, "Could not open history; keeping it in memory");
            Arc::new(SessionStore::in_memory(config.history.clone()))
        }
    }
}

/// Connect the model backend and open history
async fn start_agent(
    cli: &Cli,
    config: &ServiceConfig,
    tools: Arc<ToolRegistry>,
) -> anyhow::Result<(JobController, Arc<dyn LlmProvider>)> {
    let ollama = Arc::new(OllamaProvider::from_env()?);
    match ollama.ensure_model(&config.agent.generation.model).await {
        Ok(true) => tracing::info!("Pulled fallback model"),
        Ok(false) => tracing::info!(model = %config.agent.generation.model, "Model backend ready"),
        Err(e) => {
            tracing::warn!(error = %e, "Model backend not ready; turns will fail until it is");
            tracing::warn!("  Make sure Ollama is running: ollama serve");
        }
    }
    let provider: Arc<dyn LlmProvider> = ollama;

    let store = open_store(cli, config);
    let agent = Agent::new(provider.clone(), tools, config.agent.clone()).with_tool_log(store.clone());
    Ok((JobController::new(agent, store), provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing; stdout belongs to the REPL and the MCP client
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = ServiceConfig::from_env();
    if let Some(model) = cli.model.clone() {
        config.agent.generation.model = model;
    }
    if let Some(path) = cli.history.clone() {
        config.history_path = path;
    }

    // Initialize tools
    let tools = Arc::new(chi_tools::default_registry(&ToolsConfig::from_env())?);
    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    match cli.mode {
        // MCP clients call tools directly; no model or history involved
        Mode::Mcp => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            mcp::serve(&tools, stdin, tokio::io::stdout()).await?;
        }
        Mode::Interactive => {
            let (controller, _) = start_agent(&cli, &config, tools).await?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            repl::run(&controller, stdin, tokio::io::stdout()).await?;
        }
        Mode::Daemon => {
            let (controller, provider) = start_agent(&cli, &config, tools).await?;
            let app = app(AppState::new(controller, provider));
            let listener = tokio::net::TcpListener::bind(&cli.bind).await?;

            tracing::info!("chi-agent listening on http://{}", cli.bind);
            tracing::info!("Endpoints:");
            tracing::info!("  POST   /api/ask            - Ask and wait for the answer");
            tracing::info!("  POST   /api/ask/async      - Ask, answer arrives on /api/events");
            tracing::info!("  GET    /api/status         - ready | thinking | error");
            tracing::info!("  GET    /api/events         - WebSocket event feed");
            tracing::info!("  GET    /api/history        - Recent conversations");
            tracing::info!("  GET    /api/data           - Recent tool outputs");

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    tokio::signal::ctrl_c().await.ok();
                    tracing::info!("Shutting down");
                })
                .await?;
        }
    }

    Ok(())
}
