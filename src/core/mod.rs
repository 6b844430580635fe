//! Core business logic abstractions

pub mod config;
pub mod currency;
pub mod error;
pub mod exchange;
pub mod log;
pub mod portfolio;
pub mod price;
pub mod valuation;
pub mod window;

// Re-export main types for cleaner imports
pub use currency::{CurrencyNormalizer, CurrencyPair, FxRate, FxRateProvider};
pub use error::{FetchError, MissingFxRate, ReconciliationConflict, StoreError};
pub use price::{PriceHistoryProvider, PriceObservation};
pub use window::{DateWindow, fetch_window};
