//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::ServerConfig;
use crate::error::ServerResult;

/// freebusy - show the busy intervals of a Google Calendar
#[derive(Debug, Parser)]
#[command(name = "freebusy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (default: ./freebusy.toml if present)
    #[arg(long, short, env = "FREEBUSY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(long, short, env = "FREEBUSY_BIND")]
    pub bind: Option<SocketAddr>,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    pub debug: bool,
}

impl Cli {
    /// Loads the configuration and applies command-line overrides.
    pub fn resolve_config(&self) -> ServerResult<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load_from(path)?,
            None => ServerConfig::load()?,
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if self.debug {
            config.log.level = "debug".to_string();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("freebusy.toml");
        std::fs::write(&path, "bind = \"127.0.0.1:4000\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "freebusy",
            "--config",
            path.to_str().unwrap(),
            "--bind",
            "127.0.0.1:5000",
            "-v",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.bind.port(), 5000);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn config_file_without_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "static_dir = \"assets\"\n").unwrap();

        let cli = Cli::try_parse_from(["freebusy", "-c", path.to_str().unwrap()]).unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.static_dir, PathBuf::from("assets"));
        assert_eq!(config.bind.port(), 3000);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn rejects_bad_bind() {
        assert!(Cli::try_parse_from(["freebusy", "--bind", "not-an-addr"]).is_err());
    }
}
