mod commands;
mod config;
mod display;

use clap::{Parser, Subcommand};
use lawmate_core::ConversationId;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, ConfigArgs, DomainChoice};

#[derive(Parser)]
#[command(name = "lawmate", version, about = "Lawmate: first-orientation legal assistant for Czech law")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question and print the answer
    Ask {
        /// Legal area: auto, criminal, civil or general
        #[arg(long, default_value = "auto")]
        domain: DomainChoice,
        /// Continue an existing conversation instead of starting one
        #[arg(long)]
        conversation: Option<ConversationId>,
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Interactive session
    Chat {
        #[arg(long, default_value = "auto")]
        domain: DomainChoice,
        #[arg(long)]
        conversation: Option<ConversationId>,
    },
    /// Stored conversations
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Make sure local backends are running and have their model
    Setup,
    /// Print the Czech Bar Association lawyer search link
    Lawyer,
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List conversations, most recent first
    List,
    /// Print a conversation with all answers
    Show { id: ConversationId },
    /// Delete a conversation and its answers
    Delete { id: ConversationId },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!("lawmate v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Lawyer = cli.command {
        commands::lawyer();
        return Ok(());
    }

    let config = AppConfig::from_args(&cli.config)?;
    match cli.command {
        Commands::Ask {
            domain,
            conversation,
            question,
        } => commands::ask(&config, &question.join(" "), domain.0, conversation).await,
        Commands::Chat {
            domain,
            conversation,
        } => commands::chat(&config, domain.0, conversation).await,
        Commands::History { command } => match command {
            HistoryCommands::List => commands::history_list(&config).await,
            HistoryCommands::Show { id } => commands::history_show(&config, id).await,
            HistoryCommands::Delete { id } => commands::history_delete(&config, id).await,
        },
        Commands::Setup => commands::setup(&config).await,
        Commands::Lawyer => Ok(()),
    }
}
