use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use window_api::DEFAULT_SHARD_ID;
use window_engine::{Criteria, RetryPolicy, WalkLimits};

use crate::error::ReaderError;

#[derive(Parser)]
#[command(name = "window-reader", about = "Чтение недавнего окна записей из stream'а")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Прочитать окно записей stream'а и вывести JSON
    Read(ReadArgs),
    /// Декодировать одну raw запись (base64)
    Decode(DecodeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ReadArgs {
    /// Stream name
    pub stream: String,

    /// Путь к TOML конфиг файлу
    #[arg(long, env = "WINDOW_READER_CONFIG")]
    pub config: Option<String>,

    /// Captured GetRecords dump to load into the stream
    #[arg(long)]
    pub dump: Option<String>,

    /// Window length in minutes (default 10, max 960)
    #[arg(long)]
    pub minutes: Option<u32>,

    /// Read the whole retained shard instead of a window
    #[arg(long)]
    pub from_start: bool,

    #[arg(long)]
    pub contact_id: Option<i64>,

    #[arg(long)]
    pub agent_id: Option<i64>,

    #[arg(long)]
    pub agent_shift_id: Option<i64>,

    #[arg(long)]
    pub tenant_id: Option<i64>,

    #[arg(long)]
    pub server_name: Option<String>,

    /// Accept aggregated records with a bad MD5 trailer
    #[arg(long)]
    pub no_verify_checksums: bool,

    #[arg(long)]
    pub pretty: bool,
}

impl ReadArgs {
    pub fn criteria(&self) -> Criteria {
        Criteria {
            contact_id: self.contact_id,
            agent_id: self.agent_id,
            server_name: self.server_name.clone(),
            tenant_id: self.tenant_id,
            agent_shift_id: self.agent_shift_id,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct DecodeArgs {
    /// Record data, base64
    pub data: String,

    #[arg(long, default_value = "")]
    pub partition_key: String,

    #[arg(long, default_value = "0")]
    pub sequence_number: String,

    #[arg(long)]
    pub no_verify_checksums: bool,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ReaderConfig {
    #[serde(default = "default_shard_id")]
    pub shard_id: String,
    #[serde(default = "default_verify_checksums")]
    pub verify_checksums: bool,
    #[serde(default)]
    pub walk: WalkConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Captured dumps loaded before reading.
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
}

#[derive(Debug, Deserialize)]
pub struct WalkConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,
    #[serde(default = "default_empty_page_backoff_ms")]
    pub empty_page_backoff_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    pub dump: String,
}

fn default_shard_id() -> String {
    DEFAULT_SHARD_ID.to_string()
}
fn default_verify_checksums() -> bool {
    true
}
fn default_page_size() -> usize {
    100
}
fn default_max_pages() -> usize {
    1000
}
fn default_max_records() -> usize {
    100_000
}
fn default_max_elapsed_ms() -> u64 {
    30_000
}
fn default_empty_page_backoff_ms() -> u64 {
    200
}
fn default_max_retries() -> usize {
    3
}
fn default_initial_backoff_ms() -> u64 {
    100
}
fn default_max_backoff_ms() -> u64 {
    5_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            shard_id: default_shard_id(),
            verify_checksums: default_verify_checksums(),
            walk: WalkConfig::default(),
            retry: RetryConfig::default(),
            streams: Vec::new(),
        }
    }
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            max_records: default_max_records(),
            max_elapsed_ms: default_max_elapsed_ms(),
            empty_page_backoff_ms: default_empty_page_backoff_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl ReaderConfig {
    pub fn load(path: &str) -> Result<Self, ReaderError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReaderError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ReaderError::Config { context: "parse", detail: format!("'{path}': {e}") })?;
        config.validate()?;
        Ok(config)
    }

    /// Config file if given, built-in defaults otherwise.
    pub fn load_or_default(path: Option<&str>) -> Result<Self, ReaderError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ReaderError> {
        let invalid = |detail: &str| ReaderError::Config { context: "validate", detail: detail.to_string() };
        if self.walk.page_size == 0 {
            return Err(invalid("walk.page_size must be positive"));
        }
        if self.walk.max_pages == 0 {
            return Err(invalid("walk.max_pages must be positive"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier must be >= 1.0"));
        }
        if let Some(s) = self.streams.iter().find(|s| s.name.trim().is_empty()) {
            return Err(ReaderError::Config {
                context: "validate",
                detail: format!("[[streams]] entry with dump '{}' has no name", s.dump),
            });
        }
        Ok(())
    }

    pub fn walk_limits(&self) -> WalkLimits {
        WalkLimits {
            page_size: self.walk.page_size,
            max_pages: self.walk.max_pages,
            max_records: self.walk.max_records,
            max_elapsed: Duration::from_millis(self.walk.max_elapsed_ms),
            empty_page_backoff: Duration::from_millis(self.walk.empty_page_backoff_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
        }
    }
}
