//! Server configuration.
//!
//! Settings are read from an optional `freebusy.toml` in the working
//! directory. Every key has a default, so the file may be absent:
//!
//! ```toml
//! bind = "0.0.0.0:3000"
//! static_dir = "public"
//!
//! [log]
//! level = "info"
//! format = "compact"
//! # filter = "freebusy_google=debug,info"
//!
//! [google]
//! credentials_path = "credentials.json"
//! token_path = "token.json"
//! timeout_secs = 30
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Level;

use freebusy_core::{LogConfig, LogFormat};
use freebusy_google::GoogleConfig;

use crate::error::{ServerError, ServerResult};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "freebusy.toml";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server listens on.
    pub bind: SocketAddr,

    /// Directory served for paths other than `/`.
    pub static_dir: PathBuf,

    /// Logging settings.
    pub log: LogSettings,

    /// Google settings.
    pub google: GoogleSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            static_dir: PathBuf::from("public"),
            log: LogSettings::default(),
            google: GoogleSettings::default(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Level for freebusy crates when `RUST_LOG` is unset.
    pub level: String,
    /// `compact`, `pretty` or `json`.
    pub format: String,
    /// Full filter directive, e.g. `freebusy_google=debug,info`. Replaces `level`.
    pub filter: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            filter: None,
        }
    }
}

/// Google settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// Application credentials downloaded from the Cloud Console.
    pub credentials_path: PathBuf,

    /// Where the authorized-user token is stored.
    pub token_path: PathBuf,

    /// Timeout for each request to Google, in seconds.
    pub timeout_secs: u64,

    /// How long to wait for the consent callback, in seconds.
    pub consent_timeout_secs: u64,

    /// First port tried for the consent callback listener.
    pub loopback_port_start: u16,

    /// Last port tried for the consent callback listener.
    pub loopback_port_end: u16,

    /// OAuth scopes requested during consent.
    pub scopes: Vec<String>,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            timeout_secs: GoogleConfig::DEFAULT_TIMEOUT_SECS,
            consent_timeout_secs: GoogleConfig::DEFAULT_CONSENT_TIMEOUT_SECS,
            loopback_port_start: 8080,
            loopback_port_end: 8090,
            scopes: vec![GoogleConfig::DEFAULT_SCOPE.to_string()],
        }
    }
}

impl GoogleSettings {
    /// Converts to the Google integration configuration.
    pub fn to_google_config(&self) -> GoogleConfig {
        GoogleConfig::new(&self.credentials_path, &self.token_path)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_consent_timeout(Duration::from_secs(self.consent_timeout_secs))
            .with_loopback_port_range(self.loopback_port_start, self.loopback_port_end)
            .with_scopes(self.scopes.clone())
    }
}

impl ServerConfig {
    /// Loads `freebusy.toml` from the working directory, or defaults if absent.
    pub fn load() -> ServerResult<Self> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::config(format!("failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&content).map_err(|e| {
            ServerError::config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> ServerResult<Self> {
        toml::from_str(content)
            .map_err(|e| ServerError::config(format!("failed to parse config: {}", e)))
    }

    /// Builds the logging configuration.
    pub fn log_config(&self) -> ServerResult<LogConfig> {
        let level = Level::from_str(&self.log.level)
            .map_err(|_| ServerError::config(format!("unknown log level '{}'", self.log.level)))?;
        let format = LogFormat::from_name(&self.log.format).ok_or_else(|| {
            ServerError::config(format!("unknown log format '{}'", self.log.format))
        })?;
        let config = LogConfig::default().with_level(level).with_format(format);
        Ok(match &self.log.filter {
            Some(filter) => config.with_filter(filter.clone()),
            None => config,
        })
    }
}
