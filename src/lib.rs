pub mod cli;
pub mod core;
pub mod providers;
pub mod store;
pub mod update;

use crate::cli::MarketData;
use crate::core::config::AppConfig;
use crate::providers::yahoo_finance::YahooFinanceProvider;
use crate::store::PriceStore;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info};

pub enum AppCommand {
    Update,
    Standings,
    History {
        participant: String,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    Prices {
        ticker: String,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    Alloc,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    run_command_on(command, config_path, chrono::Utc::now().date_naive()).await
}

/// Runs `command` as if today were `today`.
pub async fn run_command_on(
    command: AppCommand,
    config_path: Option<&str>,
    today: NaiveDate,
) -> Result<()> {
    info!("stockpicks starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let db_path = config.database_path()?;
    let mut store = PriceStore::open(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    debug!("Using database at {}", db_path.display());

    match command {
        AppCommand::Update => {
            let provider = YahooFinanceProvider::new(config.yahoo_base_url());
            let summary = cli::update::run(&config, &mut store, &provider, &provider, today).await?;
            if !summary.failures.is_empty() {
                info!("{} series will be retried next run", summary.failures.len());
            }
            Ok(())
        }
        AppCommand::Standings => {
            let data = MarketData::load(&config, &store, today)?;
            cli::standings::run(&data, &config.currency);
            Ok(())
        }
        AppCommand::History {
            participant,
            from,
            to,
        } => {
            let data = MarketData::load(&config, &store, today)?;
            cli::history::run(&data, &participant, from, to, &config.currency)
        }
        AppCommand::Prices { ticker, from, to } => cli::prices::run(
            &store,
            &ticker,
            from.unwrap_or(config.competition.start_date),
            to.unwrap_or(today),
        ),
        AppCommand::Alloc => {
            let data = MarketData::load(&config, &store, today)?;
            cli::alloc::run(&data, &config.currency)
        }
    }
}
