use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use stockpicks::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for stockpicks::AppCommand {
    fn from(cmd: Commands) -> stockpicks::AppCommand {
        match cmd {
            Commands::Update => stockpicks::AppCommand::Update,
            Commands::Standings => stockpicks::AppCommand::Standings,
            Commands::History {
                participant,
                from,
                to,
            } => stockpicks::AppCommand::History {
                participant,
                from,
                to,
            },
            Commands::Prices { ticker, from, to } => {
                stockpicks::AppCommand::Prices { ticker, from, to }
            }
            Commands::Alloc => stockpicks::AppCommand::Alloc,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch missing daily closes and exchange rates into the database
    Update,
    /// Rank participants by total return
    Standings,
    /// Show a participant's daily portfolio value
    History {
        participant: String,
        /// First date to show (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last date to show (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Show stored closes for a provider symbol, e.g. 0700.HK
    Prices {
        ticker: String,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Show each participant's current allocation
    Alloc,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; it only supplies STOCKPICKS_DATABASE
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => stockpicks::cli::setup::setup(),
        Some(cmd) => stockpicks::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
