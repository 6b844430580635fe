use super::exchange::Exchange;
use super::portfolio::Position;
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::{fs, path::PathBuf};
use tracing::debug;

/// Environment variable that overrides the database location.
pub const DATABASE_ENV_VAR: &str = "STOCKPICKS_DATABASE";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PositionConfig {
    pub ticker: String,
    pub exchange: Option<Exchange>,
    pub quantity: Option<f64>,
    pub weight: Option<f64>,
    pub entry_date: Option<NaiveDate>,
}

impl PositionConfig {
    /// Symbol the market-data provider knows this position by.
    pub fn provider_symbol(&self) -> String {
        match &self.exchange {
            Some(exchange) => exchange.provider_symbol(&self.ticker),
            None => self.ticker.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Participant {
    pub name: String,
    pub positions: Vec<PositionConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CompetitionConfig {
    pub start_date: NaiveDate,
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
}

fn default_initial_capital() -> f64 {
    100_000.0
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DatabaseConfig {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(YahooProviderConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub participants: Vec<Participant>,
    pub competition: CompetitionConfig,
    pub currency: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "stockpicks", "stockpicks")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    /// Resolves the SQLite file: environment first, then config, then the
    /// platform data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            if !path.is_empty() {
                debug!("Using database from {DATABASE_ENV_VAR}");
                return Ok(PathBuf::from(path));
            }
        }
        if let Some(custom_path) = &self.database.path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "stockpicks", "stockpicks")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().join("stockpicks.db"))
    }

    pub fn yahoo_base_url(&self) -> &str {
        self.providers
            .yahoo
            .as_ref()
            .map_or("https://query1.finance.yahoo.com", |p| &p.base_url)
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.currency.trim().is_empty() {
            bail!("Reporting currency must not be empty");
        }
        if self.competition.initial_capital <= 0.0 {
            bail!("Initial capital must be positive");
        }

        let mut names = HashSet::new();
        for participant in &self.participants {
            if !names.insert(participant.name.as_str()) {
                bail!("Duplicate participant: {}", participant.name);
            }

            let mut symbols = HashSet::new();
            for position in &participant.positions {
                let symbol = position.provider_symbol();
                if !symbols.insert(symbol.clone()) {
                    bail!("{} holds {} more than once", participant.name, symbol);
                }
                match (position.quantity, position.weight) {
                    (Some(q), None) if q > 0.0 => {}
                    (None, Some(w)) if w > 0.0 => {}
                    (Some(_), Some(_)) => bail!(
                        "{}/{}: set either quantity or weight, not both",
                        participant.name,
                        symbol
                    ),
                    (None, None) => bail!(
                        "{}/{}: one of quantity or weight is required",
                        participant.name,
                        symbol
                    ),
                    _ => bail!(
                        "{}/{}: quantity and weight must be positive",
                        participant.name,
                        symbol
                    ),
                }
            }
        }
        Ok(())
    }

    /// Flattens participants into positions, defaulting entry dates to the
    /// competition start.
    pub fn positions(&self) -> Vec<Position> {
        self.participants
            .iter()
            .flat_map(|participant| {
                participant.positions.iter().map(|p| Position {
                    participant: participant.name.clone(),
                    ticker: p.provider_symbol(),
                    exchange: p.exchange,
                    quantity: p.quantity,
                    weight: p.weight,
                    entry_date: p.entry_date.unwrap_or(self.competition.start_date),
                })
            })
            .collect()
    }

    /// Distinct provider symbols across all participants, sorted.
    pub fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self
            .participants
            .iter()
            .flat_map(|p| p.positions.iter().map(PositionConfig::provider_symbol))
            .collect();
        tickers.sort();
        tickers.dedup();
        tickers
    }
}
