//! Configuration management for Tempo
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags (--working-dir, etc.)
//! 2. Environment variables (TEMPO_WORKING_DIR, etc.), including a `.env` file
//! 3. Config file (tempo.toml in the current directory or ~/.config/tempo/config.toml)
//! 4. Built-in defaults
//!
//! # Example Config File (tempo.toml)
//!
//! ```toml
//! working_dir = "/srv/processes"
//! checkpoint_dir = "/var/lib/tempo/checkpoints"
//! log_filter = "tempo_core=debug,info"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

const ENV_PREFIX: &str = "TEMPO";
const CONFIG_PATH_VAR: &str = "TEMPO_CONFIG_PATH";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory tasks run in
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Directory holding process checkpoints
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from(".tempo/checkpoints")
}
fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            checkpoint_dir: default_checkpoint_dir(),
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration with the full priority chain
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for constructing Config with optional overrides
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    working_dir: Option<PathBuf>,
    checkpoint_dir: Option<PathBuf>,
    log_filter: Option<String>,
    skip_env: bool,
}

impl ConfigBuilder {
    /// Override the config file path
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn checkpoint_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.checkpoint_dir = dir;
        self
    }

    pub fn log_filter(mut self, filter: Option<String>) -> Self {
        self.log_filter = filter;
        self
    }

    /// Ignore environment variables and `.env`
    pub fn skip_env(mut self, skip: bool) -> Self {
        self.skip_env = skip;
        self
    }

    /// Build the final config by applying the priority chain
    pub fn build(self) -> Result<Config> {
        if !self.skip_env {
            // A missing .env file is fine
            let _ = dotenvy::dotenv();
        }

        let defaults = Config::default();
        let mut layers = ::config::Config::builder()
            .set_default("working_dir", defaults.working_dir.to_string_lossy().to_string())?
            .set_default("checkpoint_dir", defaults.checkpoint_dir.to_string_lossy().to_string())?
            .set_default("log_filter", defaults.log_filter)?;

        if let Some(path) = self.resolve_config_path()? {
            layers = layers.add_source(
                ::config::File::from(path.as_path()).format(::config::FileFormat::Toml),
            );
        }
        if !self.skip_env {
            layers = layers.add_source(::config::Environment::with_prefix(ENV_PREFIX));
        }

        let mut config: Config = layers
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        self.apply_overrides(&mut config);
        Ok(config)
    }

    /// Explicit path, then TEMPO_CONFIG_PATH, then the default locations
    fn resolve_config_path(&self) -> Result<Option<PathBuf>> {
        let explicit = match &self.config_path {
            Some(path) => Some(path.clone()),
            None if !self.skip_env => env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from),
            None => None,
        };

        match explicit {
            Some(path) if !path.exists() => anyhow::bail!("Config file not found: {:?}", path),
            Some(path) => Ok(Some(path)),
            None => Ok(self.find_config_file()),
        }
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        // 1. Project root: ./tempo.toml
        let project_config = PathBuf::from("tempo.toml");
        if project_config.exists() {
            return Some(project_config);
        }

        // 2. User config: ~/.config/tempo/config.toml
        if let Some(home) = env::var_os("HOME") {
            let user_config = PathBuf::from(home)
                .join(".config")
                .join("tempo")
                .join("config.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.working_dir {
            config.working_dir = dir.clone();
        }
        if let Some(dir) = &self.checkpoint_dir {
            config.checkpoint_dir = dir.clone();
        }
        if let Some(filter) = &self.log_filter {
            config.log_filter = filter.clone();
        }
    }
}
