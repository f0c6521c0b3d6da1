use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "saldo", about = "Bank statement ingestion and reconciliation.")]
pub struct Cli {
    /// Engine configuration file
    #[arg(long, global = true, default_value = "saldo.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a statement file (.csv, .txt, .ofx, .qfx, .pdf) into an account.
    Import {
        file: PathBuf,
        /// Account id to import into
        #[arg(long)]
        account: i64,
        /// Override the format implied by the file extension
        /// (delimited-text, ofx-tags, external-extraction)
        #[arg(long)]
        format: Option<String>,
    },
    /// Pull balance and transactions for a linked account from the aggregator.
    Sync {
        #[arg(long)]
        account: i64,
    },
    /// Process an aggregator webhook payload (`{"event": .., "itemId": ..}`).
    Webhook {
        /// JSON payload file
        payload: PathBuf,
    },
    /// Settle a batch of transactions and DDA instruments.
    Settle {
        #[arg(long)]
        user: i64,
        /// JSON settlement batch file
        batch: PathBuf,
    },
    /// Re-run categorization on uncategorized transactions.
    Categorize {
        #[arg(long)]
        user: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("saldo=info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    let ctx = commands::Context::load(&cli.config).await?;
    match cli.command {
        Commands::Import { file, account, format } => {
            commands::import(&ctx, &file, account, format.as_deref()).await
        }
        Commands::Sync { account } => commands::sync(&ctx, account).await,
        Commands::Webhook { payload } => commands::webhook(&ctx, &payload).await,
        Commands::Settle { user, batch } => commands::settle(&ctx, user, &batch).await,
        Commands::Categorize { user } => commands::categorize(&ctx, user).await,
    }
}
