//! Configuration settings for StockPull
//!
//! Defines all configuration options, CLI arguments, and defaults
//! for a collection run.

use crate::error::{IoResultExt, Result, StockPullError};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default Yahoo Finance screener: NYSE/NASDAQ, avg volume > 1M, price > $10
pub const DEFAULT_SCREENER_ID: &str = "e571efd8-2e40-41be-8401-0aef2dcd52b3";

/// StockPull - collect daily price histories for liquid U.S. stocks
#[derive(Parser, Debug, Clone)]
#[command(name = "stockpull")]
#[command(author = "StockPull Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Collect daily price histories for liquid U.S. stocks")]
#[command(long_about = r#"
StockPull maintains a local dataset of daily price histories for liquid
U.S. equities, routed through a pool of HTTP proxies.

Examples:
  stockpull pull                               # Screen + refresh stale tickers
  stockpull --proxies proxies.txt update       # Refresh stale tickers only
  stockpull download AAPL MSFT                 # Fetch specific tickers
  stockpull clean                              # Build monthly return panel
  stockpull job script --profile long          # Print the sbatch script
"#)]
pub struct CliArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// JSON config file (CLI flags override its values)
    #[arg(long, global = true, value_name = "PATH", env = "STOCKPULL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root of the data directory
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Proxy list in webshare format (host:port:user:pass per line)
    #[arg(long, global = true, value_name = "PATH")]
    pub proxies: Option<PathBuf>,

    /// Number of concurrent downloads
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub jobs: Option<usize>,

    /// Minimum gap between history requests (e.g. 100ms, 1s)
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_duration)]
    pub sleep: Option<Duration>,

    /// Consecutive failures before giving up on a ticker or the screener
    #[arg(long, global = true, value_name = "NUM")]
    pub failure_limit: Option<u32>,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (no progress bars)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Full run: create folders, prune proxies, screen, refresh stale data
    #[command(name = "pull")]
    Pull,

    /// Page through the screener and save today's ticker list
    #[command(name = "screen")]
    Screen {
        /// Rows requested per screener page
        #[arg(long, value_name = "NUM", value_parser = clap::value_parser!(u32).range(1..))]
        page_size: Option<u32>,
    },

    /// Download tickers from the latest list whose data is missing or stale
    #[command(name = "update")]
    Update {
        /// Refresh data older than this many days
        #[arg(long, value_name = "DAYS")]
        max_days: Option<i64>,
    },

    /// Download the full history of the given tickers
    #[command(name = "download")]
    Download {
        /// Ticker symbols
        #[arg(required = true)]
        symbols: Vec<String>,
    },

    /// Consolidate raw histories into a monthly log-return panel
    #[command(name = "clean")]
    Clean,

    /// Fetch the 1-year Treasury yield (FRED DGS1) as a risk-free rate
    #[command(name = "risk-free")]
    RiskFree {
        /// FRED API key
        #[arg(long, env = "FRED_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Output CSV path (default: <data-dir>/risk_free_rate.csv)
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Proxy pool maintenance
    #[command(name = "proxies", subcommand)]
    Proxies(ProxyCommand),

    /// Slurm job helpers
    #[command(name = "job", subcommand)]
    Job(JobCommand),
}

/// Proxy subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ProxyCommand {
    /// Test every proxy and report how many respond
    Check,
    /// Print the public IP seen through the first few proxies
    Verify {
        /// Number of proxies to query
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },
}

/// Job subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum JobCommand {
    /// Print the sbatch script for a profile
    Script(JobArgs),
    /// Submit the script to sbatch
    Submit(JobArgs),
    /// Show Slurm allocation of the current job
    Info,
}

/// Options that shape a job script
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Resource profile
    #[arg(long, value_enum, default_value = "standard")]
    pub profile: ProfileKind,
    /// Partition to submit to
    #[arg(long)]
    pub partition: Option<String>,
    /// Address for job notifications
    #[arg(long, env = "STOCKPULL_MAIL_USER")]
    pub mail_user: Option<String>,
    /// Environment to activate before running (conda env name)
    #[arg(long, default_value = "stockpull")]
    pub env_name: String,
    /// Memory override (e.g. 32g)
    #[arg(long)]
    pub mem: Option<String>,
    /// Wall-clock override (e.g. 1-12:00:00)
    #[arg(long)]
    pub time: Option<String>,
}

/// Built-in job resource profiles
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileKind {
    /// 64g for 12 hours
    #[default]
    Standard,
    /// 16g for 2 days
    Long,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON lines
    Json,
}

/// Runtime configuration derived from defaults, config file and CLI args
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    /// Data directory root
    pub data_dir: PathBuf,
    /// Proxy list path
    pub proxy_list: PathBuf,
    /// Screener identifier
    pub screener_id: String,
    /// Rows per screener page
    pub page_size: u32,
    /// Gap between screener requests
    #[serde(with = "humantime_serde_compat")]
    pub screen_sleep: Duration,
    /// Gap between history requests
    #[serde(with = "humantime_serde_compat")]
    pub download_sleep: Duration,
    /// Gap between proxy health checks
    #[serde(with = "humantime_serde_compat")]
    pub proxy_check_sleep: Duration,
    /// Consecutive failures before giving up
    pub failure_limit: u32,
    /// Refresh raw files older than this many days
    pub max_days_since_update: i64,
    /// Concurrent downloads
    pub jobs: usize,
    /// Per-request timeout
    #[serde(with = "humantime_serde_compat")]
    pub request_timeout: Duration,
    /// FRED API key
    pub fred_api_key: Option<String>,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            proxy_list: PathBuf::from("proxies/proxy_list.txt"),
            screener_id: DEFAULT_SCREENER_ID.to_string(),
            page_size: 250,
            screen_sleep: Duration::from_millis(250),
            download_sleep: Duration::from_millis(100),
            proxy_check_sleep: Duration::from_millis(100),
            failure_limit: 5,
            max_days_since_update: 7,
            jobs: 1,
            request_timeout: Duration::from_secs(30),
            fred_api_key: None,
        }
    }
}

impl PullConfig {
    /// Load a JSON config file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        serde_json::from_str(&content)
            .map_err(|e| StockPullError::config(format!("{}: {}", path.display(), e)))
    }

    /// Build the effective config: defaults, then config file, then CLI flags
    pub fn from_cli(args: &GlobalArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(dir) = &args.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(path) = &args.proxies {
            config.proxy_list = path.clone();
        }
        if let Some(jobs) = args.jobs {
            config.jobs = jobs;
        }
        if let Some(sleep) = args.sleep {
            config.download_sleep = sleep;
        }
        if let Some(limit) = args.failure_limit {
            config.failure_limit = limit;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or spin the collectors
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(StockPullError::config("jobs must be at least 1"));
        }
        if self.failure_limit == 0 {
            return Err(StockPullError::config("failure_limit must be at least 1"));
        }
        if self.page_size == 0 {
            return Err(StockPullError::config("page_size must be at least 1"));
        }
        if self.max_days_since_update < 0 {
            return Err(StockPullError::config(
                "max_days_since_update cannot be negative",
            ));
        }
        Ok(())
    }
}

/// Parse a humantime duration string ("250ms", "2s", "1m")
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(s.trim()).map_err(|e| format!("Invalid duration '{}': {}", s, e))
}

/// Serde adapter storing durations as humantime strings
mod humantime_serde_compat {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
