//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The static secret key is loaded from DREAMINA_SECRET_KEY or secret_key_file,
//! never stored in the TOML directly to avoid leaking secrets. Account
//! passwords do live in the TOML and are wrapped in `Secret` on load.

use common::Secret;
use dreamina_pool::AccountCredentials;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub jimeng: JimengConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Admin API listener; the admin API is off when unset
    #[serde(default)]
    pub admin_addr: Option<SocketAddr>,
    /// Timeout applied to every upstream HTTP call (login, credit, generation)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Upstream account pool and generation settings
#[derive(Debug, Deserialize)]
pub struct JimengConfig {
    /// Log in with `accounts`; when false every draw uses the static secret key
    #[serde(default = "default_use_account")]
    pub use_account: bool,
    #[serde(default)]
    pub accounts: Vec<AccountCredentials>,
    pub open_api_url: String,
    #[serde(skip)]
    pub secret_key: Option<Secret<String>>,
    /// Path to a file containing the secret key (alternative to DREAMINA_SECRET_KEY)
    #[serde(default)]
    pub secret_key_file: Option<PathBuf>,
    #[serde(default)]
    pub secret_key_prefix: String,
    pub model: String,
    #[serde(default = "default_model_cost")]
    pub model_cost: i64,
    pub resolution: String,
    #[serde(default, alias = "radio")]
    pub ratio: Option<String>,
    #[serde(default = "default_max_concurrent_tasks_per_user")]
    pub max_concurrent_tasks_per_user: usize,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    /// Re-run session initialization this often; 0 disables it
    #[serde(default)]
    pub refresh_interval_secs: u64,
}

fn default_timeout() -> u64 {
    300
}

fn default_max_connections() -> usize {
    1000
}

fn default_use_account() -> bool {
    true
}

fn default_model_cost() -> i64 {
    9
}

fn default_max_concurrent_tasks_per_user() -> usize {
    1
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("cache.json")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret key resolution order:
    /// 1. DREAMINA_SECRET_KEY env var
    /// 2. secret_key_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(key) = std::env::var("DREAMINA_SECRET_KEY") {
            config.jimeng.secret_key = Some(Secret::new(key));
        } else if let Some(ref key_file) = config.jimeng.secret_key_file {
            let key = std::fs::read_to_string(key_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read secret_key_file {}: {e}",
                    key_file.display()
                ))
            })?;
            let key = key.trim().to_owned();
            if !key.is_empty() {
                config.jimeng.secret_key = Some(Secret::new(key));
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let jimeng = &self.jimeng;

        if !jimeng.open_api_url.starts_with("http://") && !jimeng.open_api_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "open_api_url must start with http:// or https://, got: {}",
                jimeng.open_api_url
            )));
        }

        if self.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if jimeng.max_concurrent_tasks_per_user == 0 {
            return Err(common::Error::Config(
                "max_concurrent_tasks_per_user must be greater than 0".into(),
            ));
        }

        if jimeng.model_cost < 0 {
            return Err(common::Error::Config(format!(
                "model_cost must not be negative, got: {}",
                jimeng.model_cost
            )));
        }

        if jimeng.use_account && jimeng.accounts.is_empty() {
            return Err(common::Error::Config(
                "use_account = true requires at least one [[jimeng.accounts]] entry".into(),
            ));
        }

        if !jimeng.use_account && jimeng.secret_key.is_none() {
            return Err(common::Error::Config(
                "use_account = false requires DREAMINA_SECRET_KEY or secret_key_file".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("dreamina-gateway.toml")
    }
}
