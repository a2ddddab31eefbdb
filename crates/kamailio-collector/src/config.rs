//! Scrape configuration: control socket URI, I/O timeout and method list.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use kamailio_binrpc::Endpoint;

use crate::catalog::Catalog;
use crate::error::{CollectorError, CollectorResult};

pub const DEFAULT_URI: &str = "unix:/var/run/kamailio/kamailio_ctl";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_METHODS: &[&str] = &["tm.stats", "sl.stats", "core.shmmem", "core.uptime"];

/// What to scrape and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// `unix:/path`, `unix:///path` or `tcp://host:port`.
    pub uri: String,
    /// Bounds the connect and, from then on, the whole cycle's I/O.
    pub timeout: Duration,
    /// Methods scraped each cycle, in order.
    pub methods: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            timeout: DEFAULT_TIMEOUT,
            methods: DEFAULT_METHODS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl CollectorConfig {
    /// Check the configuration against `catalog` and resolve the endpoint.
    pub fn validate(&self, catalog: &Catalog) -> CollectorResult<Endpoint> {
        if self.timeout.is_zero() {
            return Err(CollectorError::InvalidConfiguration(
                "timeout must be greater than zero".into(),
            ));
        }
        if self.methods.is_empty() {
            return Err(CollectorError::InvalidConfiguration(
                "at least one method must be configured".into(),
            ));
        }
        validate_methods(&self.methods, catalog)?;
        parse_endpoint(&self.uri)
    }
}

/// Every method must be known and listed once.
pub fn validate_methods(methods: &[String], catalog: &Catalog) -> CollectorResult<()> {
    let mut seen = HashSet::new();
    for method in methods {
        if !catalog.is_supported(method) {
            return Err(CollectorError::UnknownMethod(method.clone()));
        }
        if !seen.insert(method.as_str()) {
            return Err(CollectorError::InvalidConfiguration(format!(
                "method {method} is listed more than once"
            )));
        }
    }
    Ok(())
}

/// Split a comma-separated method list, dropping blanks.
pub fn parse_methods(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a control socket URI.
pub fn parse_endpoint(uri: &str) -> CollectorResult<Endpoint> {
    let invalid = |reason: &str| {
        CollectorError::InvalidConfiguration(format!("invalid uri {uri:?}: {reason}"))
    };

    if let Some(rest) = uri.strip_prefix("tcp://") {
        let rest = rest.trim_end_matches('/');
        match rest.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Endpoint::Tcp(rest.to_string()))
            }
            _ => Err(invalid("expected tcp://host:port")),
        }
    } else if let Some(rest) = uri.strip_prefix("unix:") {
        let path = rest.strip_prefix("//").unwrap_or(rest);
        if path.is_empty() {
            return Err(invalid("missing socket path"));
        }
        Ok(Endpoint::Unix(PathBuf::from(path)))
    } else {
        Err(invalid("scheme must be unix or tcp"))
    }
}

/// Parse a duration like `5s`, `500ms`, `2m` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
