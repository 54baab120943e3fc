use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub fetcher: FetcherConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
}

/// Scraping-API client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token for the scraping API. Usually supplied via
    /// FIRECRAWL_API_KEY rather than the config file.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How long the API should wait for the page to render before capturing.
    #[serde(default = "default_wait_for_ms")]
    pub wait_for_ms: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Parallel source refreshes during refresh-all.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_read_limit")]
    pub read_limit: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_api_url() -> String {
    "https://api.firecrawl.dev".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_wait_for_ms() -> u64 {
    3000
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/listings.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_concurrency() -> usize {
    3
}
fn default_read_limit() -> usize {
    50
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("CARHARVEST").separator("__"))
            .build()?;

        let mut app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());

        // FIRECRAWL_API_KEY wins over anything in the config file.
        if let Ok(key) = std::env::var("FIRECRAWL_API_KEY") {
            if !key.trim().is_empty() {
                app_cfg.fetcher.api_key = Some(key);
            }
        }

        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fetcher: FetcherConfig {
                api_url: default_api_url(),
                api_key: None,
                timeout_secs: default_timeout_secs(),
                wait_for_ms: default_wait_for_ms(),
            },
            storage: StorageConfig {
                db_path: default_db_path(),
                run_migrations: true,
            },
            pipeline: PipelineConfig {
                concurrency: default_concurrency(),
                read_limit: default_read_limit(),
            },
        }
    }
}
