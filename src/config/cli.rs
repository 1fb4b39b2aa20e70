//! Command-line flags.
//!
//! Flags override values from the config file; the merged result is
//! validated once.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::ProxyConfig;
use crate::config::validation::validate_config;

#[derive(Debug, Parser)]
#[command(name = "pxy")]
#[command(about = "Forward HTTP/HTTPS proxy", long_about = None, version)]
pub struct Cli {
    /// Listen address
    #[arg(long, value_name = "ADDR")]
    pub addr: Option<String>,

    /// Proxy credential, eg: susan:hello-kitty
    #[arg(long, value_name = "USER:PASS")]
    pub auth: Option<String>,

    /// TOML config file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Load the config file (or defaults), apply flag overrides, validate.
    pub fn load(self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(addr) = self.addr {
            config.listener.bind_address = addr;
        }
        if let Some(auth) = self.auth {
            config.auth.credential = Some(auth);
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}
