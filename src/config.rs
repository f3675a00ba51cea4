//! Configuration module

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::producer::StreamOptions;
use crate::relay::DispatchMode;
use crate::watcher::WatcherConfig;

/// Which components this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Event relay only
    Relay,
    /// Directory watcher forwarding over HTTP
    Watch,
    /// Batch producer only
    Produce,
    /// Producer, watcher and relay in one process
    Pipeline,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relay" => Ok(Mode::Relay),
            "watch" => Ok(Mode::Watch),
            "produce" => Ok(Mode::Produce),
            "pipeline" => Ok(Mode::Pipeline),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,

    /// Relay port
    pub port: u16,

    /// Producer source dataset
    pub source_path: PathBuf,

    /// Producer output / watcher input
    pub watch_dir: PathBuf,

    /// Processed batch archive
    pub archive_dir: PathBuf,

    pub rows_per_batch: usize,
    pub batch_interval: Duration,
    pub include_extra: bool,

    pub poll_interval: Duration,

    /// Classifier artifact; unset disables scoring
    pub model_path: Option<PathBuf>,

    /// Append-only predictions table
    pub results_path: PathBuf,

    /// Relay ingest endpoint used in watch mode
    pub relay_url: String,
    pub forward_timeout: Duration,

    pub dispatch_mode: DispatchMode,

    /// Per-queue high-water mark; unset means unbounded
    pub queue_high_water: Option<usize>,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let watch_dir = PathBuf::from(lookup("WATCH_DIR").unwrap_or_else(|| "stream_in".to_string()));

        Self {
            mode: lookup("MODE")
                .and_then(|m| m.parse().ok())
                .unwrap_or(Mode::Pipeline),

            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),

            source_path: PathBuf::from(
                lookup("SOURCE_PATH").unwrap_or_else(|| "data/flows.csv".to_string()),
            ),

            archive_dir: lookup("ARCHIVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| watch_dir.join("processed")),

            watch_dir,

            rows_per_batch: parsed("ROWS_PER_BATCH").map(|n| n as usize).unwrap_or(200),

            batch_interval: Duration::from_millis(parsed("BATCH_INTERVAL_MS").unwrap_or(1000)),

            include_extra: lookup("INCLUDE_EXTRA")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),

            poll_interval: Duration::from_millis(parsed("POLL_INTERVAL_MS").unwrap_or(500)),

            model_path: lookup("MODEL_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),

            results_path: PathBuf::from(
                lookup("RESULTS_PATH").unwrap_or_else(|| "predictions.csv".to_string()),
            ),

            relay_url: lookup("RELAY_URL")
                .unwrap_or_else(|| "http://localhost:8000/ingest".to_string()),

            forward_timeout: Duration::from_millis(parsed("FORWARD_TIMEOUT_MS").unwrap_or(1500)),

            dispatch_mode: lookup("DISPATCH_MODE")
                .and_then(|m| m.parse().ok())
                .unwrap_or_default(),

            queue_high_water: parsed("QUEUE_HIGH_WATER").map(|n| n as usize),

            environment: lookup("ENVIRONMENT")
                .unwrap_or_else(|| "development".to_string()),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            rows_per_batch: self.rows_per_batch,
            interval: self.batch_interval,
            include_extra: self.include_extra,
        }
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            watch_dir: self.watch_dir.clone(),
            archive_dir: self.archive_dir.clone(),
            poll_interval: self.poll_interval,
            results_path: self.results_path.clone(),
        }
    }
}
