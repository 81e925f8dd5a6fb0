use clap::Parser;
use std::path::PathBuf;

use crate::metrics::MetricType;

/// rag-metrics: scores generated answers against ground truth.
#[derive(Parser, Debug, Clone)]
#[command(name = "rag-metrics")]
pub struct CliArgs {
    /// HTTP bind address
    #[arg(long = "host", default_value = DEFAULT_HOST)]
    pub host: String,

    /// HTTP port
    #[arg(long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Path to the settings JSON file
    #[arg(short = 's', long = "settings")]
    pub settings: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Score a request JSON file once, print the result and exit
    #[arg(short = 'c', long = "calculate")]
    pub calculate: Option<PathBuf>,

    /// Metric types to compute when the request does not name any
    #[arg(short = 'm', long = "metrics", value_delimiter = ',')]
    pub metrics: Vec<String>,

    /// Write the effective settings (defaults filled in) to the settings
    /// file and exit
    #[arg(long = "write-settings")]
    pub write_settings: bool,
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub settings_path: PathBuf,
    pub log_file: Option<PathBuf>,
    pub calculate: Option<PathBuf>,
    pub write_settings: bool,
    pub default_metrics: Vec<MetricType>,
}

// Server constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const API_PREFIX: &str = "/api/v1";
pub const CORS_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:3000",
    "http://127.0.0.1:5173",
    "http://127.0.0.1:3000",
];

// Dataset limits
pub const MAX_ROWS: usize = 10_000;
pub const MAX_FIELD_CHARS: usize = 10_000;
pub const MAX_REPORTED_ERRORS: usize = 100;
pub const PREVIEW_ROWS: usize = 10;
/// Request body cap: a full-size dataset (three text fields per row at the
/// field limit) plus room for metadata columns and JSON framing.
pub const MAX_BODY_BYTES: usize = MAX_ROWS * 3 * MAX_FIELD_CHARS + 16 * 1024 * 1024;

// Scoring defaults
pub const DEFAULT_BLEU_MAX_ORDER: usize = 4;
pub const MAX_BLEU_ORDER: usize = 8;
pub const DEFAULT_BLEU_EPSILON: f64 = 0.1;
pub const DEFAULT_MIN_TOKENS: usize = 3;
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.5;

// Encoder defaults
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 256;
pub const MAX_EMBEDDING_DIMENSION: usize = 8192;
pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_ENCODER_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ENCODER_CONCURRENCY: usize = 4;

pub const SETTINGS_FILE_NAME: &str = "settings.json";

impl ServerConfig {
    pub fn from_args(args: CliArgs) -> Self {
        let settings_path = args.settings.unwrap_or_else(default_settings_path);

        // Unknown names are dropped here; requests still get validated in full.
        let default_metrics = args
            .metrics
            .iter()
            .filter_map(|name| name.parse::<MetricType>().ok())
            .collect();

        ServerConfig {
            host: args.host,
            port: args.port,
            settings_path,
            log_file: args.log_file,
            calculate: args.calculate,
            write_settings: args.write_settings,
            default_metrics,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `<config dir>/rag-metrics/settings.json`, or `./settings.json` when the
/// platform has no config directory.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("rag-metrics"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SETTINGS_FILE_NAME)
}

/// Worker count for per-row scoring when settings leave it unset.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
