use std::time::Duration;
use thiserror::Error;

pub mod config;
pub mod dedupe;
pub mod export;
pub mod extractor;
pub mod fetcher;
pub mod filter;
pub mod harvest;
pub mod rate;
pub mod scraper;
pub mod search;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::HarvestConfig;
pub use harvest::{Harvester, StopSignal};
pub use types::{AcceptedContact, HarvestReport, Query, Termination};

/// The `HarvestError` enum represents the failures the harvesting pipeline can run into.
///
/// Only configuration and export errors are ever returned from a run; the pipeline
/// variants are recovered locally and show up as a smaller `HarvestReport`.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// A target answered with an explicit rate-limit signal.
    #[error("Rate limited by {target}")]
    Throttled { target: String },
    /// Timeout, DNS failure, connection reset or an unexpected status.
    #[error("Transport failed: {0}")]
    Transport(String),
    /// A discovery query returned no candidate links.
    #[error("No links discovered for query '{query}'")]
    EmptyDiscovery { query: String },
    /// Every query and link was consumed before the quota was met.
    #[error("Sources exhausted with {found} of {quota} contacts found")]
    ExhaustedSources { found: usize, quota: usize },
    /// Represents an error raised while building or using the HTTP client.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Represents an error raised while loading layered configuration.
    #[error("Configuration could not be loaded: {0}")]
    Config(#[from] ::config::ConfigError),
    /// Configuration loaded but violates a constraint.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
}

/// A type alias for `Result` with the `HarvestError` error type.
pub type Result<T> = std::result::Result<T, HarvestError>;

// Constants

/// The default timeout duration for a single HTTP request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// The default number of page hosts drained at the same time.
pub const DEFAULT_CONCURRENT_HOSTS: usize = 1;
/// The default number of consecutive throttles before a target is abandoned.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
/// The default number of contacts a run tries to collect.
pub const DEFAULT_QUOTA: usize = 10;
