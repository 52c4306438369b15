//! Configuration for socksd
//!
//! Loads and validates the TOML server configuration.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 1080
//! dial_timeout_ms = 3000
//! auth_methods = ["no_required", "username_password"]
//!
//! [[credentials]]
//! username = "si.li"
//! password = "1234"
//! ```

use crate::error::ProxyError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Authentication method names accepted in `auth_methods`
const KNOWN_AUTH_METHODS: [&str; 3] = ["no_required", "gss_api", "username_password"];

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Address to listen on
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Outbound dial timeout in milliseconds, zero means no timeout
    #[serde(default)]
    pub dial_timeout_ms: u64,

    /// Enabled authentication methods in preference order
    #[serde(default = "default_auth_methods")]
    pub auth_methods: Vec<String>,

    /// Accounts for username/password authentication
    #[serde(default)]
    pub credentials: Vec<Account>,
}

/// A username/password account
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Account {
    /// Account name, must be non-empty
    pub username: String,
    /// Account password
    pub password: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1080
}

fn default_auth_methods() -> Vec<String> {
    vec!["no_required".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: default_host(),
            port: default_port(),
            dial_timeout_ms: 0,
            auth_methods: default_auth_methods(),
            credentials: Vec::new(),
        }
    }
}

impl Config {
    /// The `host:port` string the listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The outbound dial timeout; `None` when unset or zero
    pub fn dial_timeout(&self) -> Option<Duration> {
        if self.dial_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.dial_timeout_ms))
        }
    }

    /// Enabled method names, de-duplicated in first-occurrence order with
    /// unknown names silently dropped
    pub fn enabled_auth_methods(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for name in &self.auth_methods {
            let name = name.as_str();
            if KNOWN_AUTH_METHODS.contains(&name) && !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }

    /// Validate the configuration.
    ///
    /// Enabling `username_password` requires a non-empty credentials table
    /// and every username must be non-empty.
    pub fn validate(&self) -> Result<(), ProxyError> {
        let methods = self.enabled_auth_methods();

        if methods.contains(&"username_password") {
            if self.credentials.is_empty() {
                return Err(ProxyError::Config(
                    "username_password is enabled but no credentials are configured".to_string(),
                ));
            }
            for account in &self.credentials {
                if account.username.is_empty() {
                    return Err(ProxyError::Config(
                        "account username can not be empty".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}
