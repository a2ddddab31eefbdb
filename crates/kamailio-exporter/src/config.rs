//! Exporter configuration: optional TOML file, then command-line overrides.
//!
//! ```toml
//! listen = "0.0.0.0:9494"
//! metrics_path = "/metrics"
//! uri = "unix:/var/run/kamailio/kamailio_ctl"
//! timeout = "5s"
//! methods = ["tm.stats", "sl.stats", "core.shmmem", "core.uptime"]
//! log_json = false
//! ```

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, anyhow, bail};
use kamailio_collector::CollectorConfig;
use kamailio_collector::config::{parse_duration, parse_methods};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:9494";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Contents of the config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<String>,
    pub metrics_path: Option<String>,
    pub uri: Option<String>,
    pub timeout: Option<String>,
    pub methods: Option<Vec<String>>,
    pub log_json: Option<bool>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Values given explicitly on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<SocketAddr>,
    pub metrics_path: Option<String>,
    pub uri: Option<String>,
    pub timeout: Option<String>,
    /// Comma separated.
    pub methods: Option<String>,
    pub log_json: bool,
}

/// Fully resolved exporter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    pub listen: SocketAddr,
    pub metrics_path: String,
    pub log_json: bool,
    pub collector: CollectorConfig,
}

impl ExporterConfig {
    /// Read the optional config file and apply `overrides` on top.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, overrides)
    }

    /// Explicit overrides win over the file; the file wins over defaults.
    pub fn resolve(file: FileConfig, overrides: Overrides) -> anyhow::Result<Self> {
        let defaults = CollectorConfig::default();

        let listen = match (overrides.listen, file.listen) {
            (Some(addr), _) => addr,
            (None, Some(addr)) => addr
                .parse()
                .with_context(|| format!("invalid listen address {addr:?}"))?,
            (None, None) => DEFAULT_LISTEN
                .parse()
                .context("invalid default listen address")?,
        };

        let metrics_path = overrides
            .metrics_path
            .or(file.metrics_path)
            .unwrap_or_else(|| DEFAULT_METRICS_PATH.to_string());
        validate_metrics_path(&metrics_path)?;

        let timeout = match overrides.timeout.or(file.timeout) {
            Some(s) => parse_duration(&s).ok_or_else(|| anyhow!("invalid timeout {s:?}"))?,
            None => defaults.timeout,
        };

        let methods = match (overrides.methods, file.methods) {
            (Some(csv), _) => parse_methods(&csv),
            (None, Some(list)) => list.into_iter().map(|m| m.trim().to_string()).collect(),
            (None, None) => defaults.methods,
        };

        Ok(Self {
            listen,
            metrics_path,
            log_json: overrides.log_json || file.log_json.unwrap_or(false),
            collector: CollectorConfig {
                uri: overrides.uri.or(file.uri).unwrap_or(defaults.uri),
                timeout,
                methods,
            },
        })
    }
}

fn validate_metrics_path(path: &str) -> anyhow::Result<()> {
    if !path.starts_with('/') {
        bail!("metrics path {path:?} must start with '/'");
    }
    if path == "/" {
        bail!("metrics path cannot be '/', it serves the landing page");
    }
    if path.chars().any(|c| c.is_whitespace() || matches!(c, '"' | '<' | '>' | '{' | '}')) {
        bail!("metrics path {path:?} contains invalid characters");
    }
    Ok(())
}
