//! Tessera CLI - manage the tools and cards of a realm.
//!
//! Each invocation opens the realm, runs one operation and shuts the realm
//! down again, unloading whatever it loaded.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::Mutex;

use tessera_config::Config;
use tessera_runtime::{Orchestrator, RuntimeError};

mod commands;
mod config_bridge;
mod theme;

use commands::{cards, tools};
use theme::Theme;

/// Tessera - card workspace tool manager
#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Realm directory (defaults to `[realm] path`, then the working directory)
    #[arg(long, global = true, env = "TESSERA_REALM")]
    realm: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Load tools that were not installed from the registry
    #[arg(long, global = true)]
    load_unsigned: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every card
    List,

    /// List installed tools
    Tools,

    /// Install or update a tool from the registry
    Install {
        /// Tool name, as written in its manifest
        name: String,
        /// Repository, e.g. `owner/tool`
        repo: String,
        /// Replace an installed tool; takes effect after a restart
        #[arg(long)]
        update: bool,
    },

    /// Remove a tool with all its cards
    Uninstall {
        /// Tool name
        name: String,
    },

    /// Create a card
    Add {
        /// Tool name
        tool: String,
        /// Card name, unique within the tool
        name: String,
        /// Card emoji
        emoji: String,
    },

    /// Delete cards
    Remove {
        /// Tool name
        tool: String,
        /// Card ids
        #[arg(required = true)]
        ids: Vec<String>,
        /// Also delete the card directory (single card only)
        #[arg(long)]
        clean: bool,
    },

    /// Place or unplace a card
    Toggle {
        /// Tool name
        tool: String,
        /// Card id
        id: String,
    },

    /// Run a card's load hook
    Load {
        /// Tool name
        tool: String,
        /// Card id
        id: String,
    },

    /// Change a card's emoji
    Emoji {
        /// Tool name
        tool: String,
        /// Card id
        id: String,
        /// New emoji
        emoji: String,
    },

    /// Star or unstar a card
    Favourite {
        /// Tool name
        tool: String,
        /// Card id
        id: String,
    },

    /// Rename a card and move its directory
    Rename {
        /// Tool name
        tool: String,
        /// Card id
        id: String,
        /// New name
        name: String,
    },
}

async fn run(command: Commands, orchestrator: &Mutex<Orchestrator>) -> Result<()> {
    match command {
        Commands::List => cards::list_cards(orchestrator).await,
        Commands::Tools => tools::list_tools(orchestrator).await,
        Commands::Install { name, repo, update } => {
            tools::install(orchestrator, &name, &repo, update).await
        },
        Commands::Uninstall { name } => tools::uninstall(orchestrator, &name).await,
        Commands::Add { tool, name, emoji } => cards::add(orchestrator, &tool, &name, &emoji).await,
        Commands::Remove { tool, ids, clean } => cards::remove(orchestrator, &tool, &ids, clean).await,
        Commands::Toggle { tool, id } => cards::toggle(orchestrator, &tool, &id).await,
        Commands::Load { tool, id } => cards::load(orchestrator, &tool, &id).await,
        Commands::Emoji { tool, id, emoji } => cards::emoji(orchestrator, &tool, &id, &emoji).await,
        Commands::Favourite { tool, id } => cards::favourite(orchestrator, &tool, &id).await,
        Commands::Rename { tool, id, name } => cards::rename(orchestrator, &tool, &id, &name).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.realm.as_deref())?;

    match config_bridge::to_log_config(&config, cli.log_level.as_deref()) {
        Ok(log_config) => {
            if let Err(e) = tessera_telemetry::setup_logging(&log_config) {
                eprintln!("Failed to initialize logging: {e}");
            }
        },
        Err(e) => eprintln!("Invalid logging configuration: {e}"),
    }

    let root = config_bridge::realm_root(cli.realm.as_deref(), &config);
    tracing::debug!(realm = %root.display(), "Opening realm");
    let orchestrator = Orchestrator::builder(root)
        .registry(Arc::new(config_bridge::to_registry_client(&config)?))
        .script_limits(config_bridge::to_script_limits(&config))
        .load_unsigned(cli.load_unsigned || config.realm.load_unsigned)
        .start()
        .await?;
    let orchestrator = Mutex::new(orchestrator);

    let result = run(cli.command, &orchestrator).await;
    orchestrator.into_inner().shutdown().await?;

    if let Err(e) = result {
        if let Some(runtime) = e.downcast_ref::<RuntimeError>()
            && runtime.is_user_visible()
        {
            tracing::debug!(error = %runtime, "Command rejected");
            eprintln!("{}", Theme::error(&runtime.to_string()));
            std::process::exit(1);
        }
        return Err(e);
    }
    Ok(())
}
