//! Configuration for snippetbox.
//!
//! Sources, later ones winning: built-in defaults, `config/default.toml`,
//! `config/local.toml` (or the file given with `--config`), `SNIPPETBOX_`
//! environment variables with `__` separating sections, and command-line
//! flags.

use crate::middleware::SessionConfig;
use crate::password::PasswordConfig;
use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or did not match the schema
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value was read but is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Command-line flags
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "snippetbox", version, about = "Share snippets of text")]
pub struct Cli {
    /// Extra configuration file, merged after the defaults
    #[arg(long, env = "SNIPPETBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address, `host:port`
    #[arg(long)]
    pub addr: Option<String>,

    /// Database URL
    #[arg(long)]
    pub dsn: Option<String>,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Database settings
    pub database: DatabaseConfig,
    /// Session settings
    pub session: SessionConfig,
    /// Password hashing cost
    pub password: PasswordConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Directory served under `/static`
    pub static_dir: PathBuf,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            static_dir: PathBuf::from("ui/static"),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Database settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL
    pub url: String,
    /// Maximum connections in the pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://snippetbox.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Values set on the command line, merged last
#[derive(Debug, Default, Serialize)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<ServerOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<DatabaseOverrides>,
}

#[derive(Debug, Serialize)]
struct ServerOverrides {
    host: String,
    port: u16,
}

#[derive(Debug, Serialize)]
struct DatabaseOverrides {
    url: String,
}

impl Overrides {
    fn from_cli(cli: &Cli) -> Self {
        let server = cli.addr.as_deref().and_then(|addr| {
            let (host, port) = addr.rsplit_once(':')?;
            Some(ServerOverrides {
                host: host.to_string(),
                port: port.parse().ok()?,
            })
        });
        if server.is_none() && cli.addr.is_some() {
            tracing::warn!(addr = ?cli.addr, "ignoring malformed --addr, expected host:port");
        }

        Self {
            server,
            database: cli.dsn.clone().map(|url| DatabaseOverrides { url }),
        }
    }
}

impl Config {
    /// Load configuration from all sources
    ///
    /// # Errors
    ///
    /// Returns error if configuration cannot be loaded or parsed, or a session
    /// setting is out of range.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(cli)
            .extract()
            .map_err(Box::new)
            .map_err(ConfigError::from)?;
        config.session.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    fn figment(cli: &Cli) -> Figment {
        let mut figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Toml::file("config/local.toml"));
        if let Some(path) = &cli.config {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("SNIPPETBOX_").split("__"))
            .merge(Serialized::defaults(Overrides::from_cli(cli)))
    }
}
