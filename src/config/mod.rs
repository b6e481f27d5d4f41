//! Configuration tree, loaded once from YAML at startup and re-delivered to
//! every worker's `reload_config` channel on SIGHUP (spec.md §4.B, §6).
//!
//! Each worker stores its own slice behind an `ArcSwap` (the pattern the
//! teacher uses for `DNSBackend` in `backend/mod.rs`) so a reload never
//! takes a lock on the hot path.

pub mod collectors;
pub mod loggers;
pub mod matching;
pub mod transformers;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{DcError, DcResult};

pub use collectors::CollectorsConfig;
pub use loggers::LoggersConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub collectors: CollectorsConfig,
    #[serde(default)]
    pub loggers: LoggersConfig,
    /// Worker name -> downstream routes. A worker with no entry here has no
    /// outgoing routes (valid for a pure sink).
    #[serde(default)]
    pub routes: HashMap<String, RouteConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
    /// Falls back to the local hostname when unset (`ReadConfig` in
    /// `loggers/dnstapclient.go` does the same for `ServerId`).
    #[serde(default)]
    pub server_identity: Option<String>,
    #[serde(default)]
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TraceConfig {
    #[serde(default)]
    pub log_malformed: bool,
}

impl GlobalConfig {
    pub fn server_identity(&self) -> String {
        self.server_identity
            .clone()
            .unwrap_or_else(|| nix::unistd::gethostname().map_or_else(
                |_| "dnscollector".to_string(),
                |h| h.to_string_lossy().into_owned(),
            ))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RouteConfig {
    #[serde(default)]
    pub default: Vec<String>,
    #[serde(default)]
    pub dropped: Vec<String>,
}

/// Parses a YAML config file. Any failure here is fatal at startup
/// (spec.md §7.1).
pub fn load_config<P: AsRef<Path>>(path: P) -> DcResult<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| DcError::config(format!("reading {}: {e}", path.display())))?;
    let config: Config = serde_yaml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> DcResult<()> {
    if let Some(dnstap) = &config.collectors.dnstap {
        if dnstap.tls_support && (dnstap.cert_file.is_none() || dnstap.key_file.is_none()) {
            return Err(DcError::config(
                "collectors.dnstap.tls_support requires cert_file and key_file",
            ));
        }
        crate::tls::validate_version(&dnstap.tls_min_version)?;
    }
    if let Some(pdns) = &config.collectors.powerdns {
        if pdns.tls_support && (pdns.cert_file.is_none() || pdns.key_file.is_none()) {
            return Err(DcError::config(
                "collectors.powerdns.tls_support requires cert_file and key_file",
            ));
        }
        crate::tls::validate_version(&pdns.tls_min_version)?;
    }
    if let Some(sender) = &config.loggers.dnstap {
        crate::tls::validate_version(&sender.tls_min_version)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let yaml = r#"
collectors:
  dnstap:
    listen_port: 6000
loggers:
  stdout:
    mode: json
routes:
  dnstap-in:
    default: [stdout-out]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.collectors.dnstap.unwrap().listen_port, 6000);
        assert_eq!(config.routes["dnstap-in"].default, vec!["stdout-out"]);
    }

    #[test]
    fn tls_without_cert_fails_validation() {
        let yaml = r#"
collectors:
  dnstap:
    tls_support: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(validate(&config).is_err());
    }
}
