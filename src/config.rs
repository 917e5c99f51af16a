// ⚙️ Configuration - defaults → resolver.toml → RESOLVER_* environment

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default config file, read from the working directory if present
pub const CONFIG_FILE: &str = "resolver.toml";

/// Prefix of environment overrides (RESOLVER_DATABASE_PATH, ...)
pub const ENV_PREFIX: &str = "RESOLVER_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite catalog file
    pub database_path: PathBuf,

    /// HTTP listen address (server binary)
    pub bind_address: String,

    /// tracing-subscriber filter directive
    pub log_filter: String,

    /// Server sessions idle longer than this are dropped
    pub session_idle_secs: u64,

    /// Upper bound on tracked server sessions
    pub max_sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("neighborhoods.db"),
            bind_address: "0.0.0.0:3000".to_string(),
            log_filter: "info".to_string(),
            session_idle_secs: 900,
            max_sessions: 10_000,
        }
    }
}

impl Config {
    /// Load from the default file and the environment
    pub fn load() -> Result<Self> {
        Self::figment(CONFIG_FILE)
            .extract()
            .context("Invalid resolver configuration")
    }

    /// Layered provider chain, exposed for tests
    pub fn figment(config_file: &str) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX))
    }
}

/// Install the global tracing subscriber (binaries only)
pub fn init_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .try_init();
}
