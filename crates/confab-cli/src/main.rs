//! Confab CLI — entry point.
//!
//! # Commands
//!
//! - `confab chat [-m MESSAGE] [-s SESSION]` — chat (single-shot or REPL)
//! - `confab models` — sync every engine's model list and print it
//! - `confab status` — configuration and per-engine connectivity
//! - `confab sessions list|rm` — stored conversations
//! - `confab init` — write a default config file

mod helpers;
mod init;
mod models;
mod repl;
mod sessions;
mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use confab_agent::{CommandToolServer, DispatchConfig, Dispatcher};
use confab_core::config::{load_config, Config};
use confab_core::session::SessionManager;
use confab_core::types::SessionConfig;
use confab_providers::EngineRegistry;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Confab — one conversation model over many LLM providers
#[derive(Parser)]
#[command(name = "confab", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with a model (single-shot or interactive REPL)
    Chat {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Session identifier
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Canonical model id for a new session (e.g. "openai:gpt-4o")
        #[arg(long)]
        model: Option<String>,

        /// Engine id for a new session
        #[arg(long)]
        engine: Option<String>,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Sync and list the models each engine serves
    Models {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show configuration and engine connectivity
    Status,

    /// Manage stored sessions
    Sessions {
        #[command(subcommand)]
        action: sessions::SessionsCommands,
    },

    /// Write a default configuration file
    Init,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            message,
            session,
            model,
            engine,
            logs,
        } => {
            init_logging(logs);
            run_chat(message, session, model, engine).await
        }
        Commands::Models { logs } => {
            init_logging(logs);
            models::run().await
        }
        Commands::Status => {
            init_logging(false);
            status::run().await
        }
        Commands::Sessions { action } => sessions::dispatch(action),
        Commands::Init => init::run(),
    }
}

// ─────────────────────────────────────────────
// Chat command
// ─────────────────────────────────────────────

async fn run_chat(
    message: Option<String>,
    session_id: String,
    model: Option<String>,
    engine: Option<String>,
) -> Result<()> {
    let config = load_config(None);
    let store = Arc::new(SessionManager::new(None).context("failed to open session store")?);

    let session_config = new_session_config(&config, model, engine);
    let session = store
        .get_or_create(&session_id, session_config)
        .with_context(|| format!("failed to open session '{session_id}'"))?;
    info!(
        session = %session.id,
        model = %session.config.model,
        engine = %session.config.engine_id,
        "session ready"
    );

    let dispatcher = build_dispatcher(&config, store);

    match message {
        Some(text) => {
            let reply = dispatcher
                .send(&session.id, &text)
                .await
                .context("dispatch failed")?;
            helpers::print_reply(&reply);
        }
        None => repl::run(&dispatcher, &session).await?,
    }

    Ok(())
}

/// Config for a new session: the configured defaults plus flag overrides.
fn new_session_config(
    config: &Config,
    model: Option<String>,
    engine: Option<String>,
) -> SessionConfig {
    let mut session_config = config.defaults.session_config();
    if let Some(model) = model {
        session_config.model = model;
    }
    if let Some(engine) = engine {
        session_config.engine_id = engine;
    }
    session_config
}

/// Build a `Dispatcher` from the loaded configuration.
///
/// Models are not synced here: the dispatcher asks the engine directly
/// for a model missing from its list.
pub fn build_dispatcher(config: &Config, store: Arc<SessionManager>) -> Dispatcher {
    let registry = EngineRegistry::from_config(config);
    let tools = CommandToolServer::new(helpers::resolve_tool_servers(&config.tool_servers));

    Dispatcher::new(
        Arc::new(registry),
        Arc::new(tools),
        store,
        DispatchConfig::from(&config.dispatch),
    )
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("confab=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
