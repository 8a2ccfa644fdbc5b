mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use parley::config::ParleyConfig;

#[derive(Parser)]
#[command(name = "parley", version, about = "Retrieval-augmented chat server for local models")]
struct Cli {
    /// Config file (defaults to ~/.parley/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Run one chat turn and print the streamed reply
    Ask {
        message: String,
        /// Model to use (defaults to inference.default_model)
        #[arg(long)]
        model: Option<String>,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
        /// Title for a new conversation; disables auto-titling
        #[arg(long)]
        title: Option<String>,
        /// Print only the answer, without reasoning spans
        #[arg(long)]
        hide_thoughts: bool,
    },
    /// Manage stored conversations
    Conversations {
        #[command(subcommand)]
        action: ConversationAction,
    },
    /// Find stored messages similar to a query
    Search {
        query: String,
        /// Boost matches from this conversation
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Show store statistics
    Stats,
    /// Embed messages that have no embedding
    Backfill {
        /// Re-embed every message with the configured model
        #[arg(long)]
        all: bool,
    },
    /// Check database health
    Doctor,
    /// Delete every conversation
    Reset,
}

#[derive(Subcommand)]
enum ConversationAction {
    /// List recent conversations
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print a conversation with its messages
    Show { id: String },
    /// Set a conversation's title
    Rename { id: String, title: String },
    /// Delete a conversation and its messages
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ParleyConfig::load_from(path)?,
        None => ParleyConfig::load()?,
    };

    // Logs go to stderr so stdout stays clean for command output.
    let filter =
        EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => parley::server::serve(config).await?,
        Command::Ask {
            message,
            model,
            conversation,
            title,
            hide_thoughts,
        } => {
            cli::ask::ask(
                &config,
                cli::ask::AskArgs {
                    message,
                    model,
                    conversation,
                    title,
                    hide_thoughts,
                },
            )
            .await?
        }
        Command::Conversations { action } => match action {
            ConversationAction::List { limit } => cli::conversations::list(&config, limit).await?,
            ConversationAction::Show { id } => cli::conversations::show(&config, &id).await?,
            ConversationAction::Rename { id, title } => {
                cli::conversations::rename(&config, &id, &title).await?
            }
            ConversationAction::Delete { id } => cli::conversations::delete(&config, &id).await?,
        },
        Command::Search {
            query,
            conversation,
        } => cli::search::search(&config, &query, conversation.as_deref()).await?,
        Command::Stats => cli::stats::stats(&config).await?,
        Command::Backfill { all } => cli::backfill::backfill(&config, all).await?,
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Reset => cli::reset::reset(&config).await?,
    }

    Ok(())
}
