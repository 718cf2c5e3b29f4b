//! Layered CLI configuration.
//!
//! Precedence, lowest first: built-in defaults, the YAML config file,
//! environment variables, command-line flags. Environment and flags are
//! merged by clap before they reach [`Settings::resolve`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use trainscope_api::HttpApiConfig;
use trainscope_monitor::controller::DEFAULT_INTERVAL_MINUTES;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Contents of `config.yaml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub refresh_interval_minutes: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub exit_when_done: Option<bool>,
}

impl FileConfig {
    /// Parse YAML text.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(text).context("Invalid config file")
    }

    /// Load the config file.
    ///
    /// An explicitly named file must exist; a missing file at the default
    /// location just means no file configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if required {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }
}

/// `~/.trainscope/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".trainscope").join("config.yaml"))
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub refresh_interval_minutes: Option<u32>,
    pub exit_when_done: bool,
}

/// Fully resolved settings.
#[derive(Clone, PartialEq)]
pub struct Settings {
    pub endpoint: String,
    pub token: Option<String>,
    pub refresh_interval_minutes: u32,
    pub request_timeout: Duration,
    pub exit_when_done: bool,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_interval_minutes", &self.refresh_interval_minutes)
            .field("request_timeout", &self.request_timeout)
            .field("exit_when_done", &self.exit_when_done)
            .finish()
    }
}

impl Settings {
    /// Merge file values with overrides.
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        let endpoint = overrides
            .endpoint
            .or(file.endpoint)
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No backend endpoint configured. Pass --endpoint, set TRAINSCOPE_ENDPOINT, \
                     or add 'endpoint:' to ~/.trainscope/config.yaml"
                )
            })?;

        Ok(Self {
            endpoint,
            token: overrides.token.or(file.token).filter(|t| !t.is_empty()),
            refresh_interval_minutes: overrides
                .refresh_interval_minutes
                .or(file.refresh_interval_minutes)
                .unwrap_or(DEFAULT_INTERVAL_MINUTES),
            request_timeout: Duration::from_secs(
                file.request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            exit_when_done: overrides.exit_when_done || file.exit_when_done.unwrap_or(false),
        })
    }

    /// HTTP client configuration for these settings.
    pub fn http_config(&self) -> HttpApiConfig {
        let config = HttpApiConfig::new(self.endpoint.clone())
            .with_request_timeout(self.request_timeout);
        match &self.token {
            Some(token) => config.with_token(token.clone()),
            None => config,
        }
    }
}
