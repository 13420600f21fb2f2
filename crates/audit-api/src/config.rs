//! # Service Configuration
//!
//! [`AppConfig`] is resolved once at startup. Sources, lowest precedence
//! first:
//!
//! 1. Built-in defaults (port 8080, actor `system`, deficiency-rate rule).
//! 2. A YAML file named by `AUDIT_CONFIG`.
//! 3. Environment variables `PORT`, `AUDIT_ACTOR`, `AUDIT_CONCLUSION_RULE`,
//!    `AUDIT_CATALOG`.
//!
//! The control catalog (reference data keyed by control code) is loaded
//! from `catalog_path` as YAML, or JSON when the file ends in `.json`.

use std::path::{Path, PathBuf};

use audit_core::Actor;
use audit_testing::{ConclusionRule, InMemoryCatalog};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while resolving configuration or loading the catalog.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Resolved service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Actor used when a request carries no `X-Actor` header.
    pub default_actor: Actor,
    /// Rule applied at submit and at approve.
    pub conclusion_rule: ConclusionRule,
    /// Control reference data file.
    pub catalog_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            default_actor: Actor::new("system"),
            conclusion_rule: ConclusionRule::default(),
            catalog_path: None,
        }
    }
}

/// Shape of the optional YAML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    port: Option<u16>,
    default_actor: Option<String>,
    conclusion_rule: Option<ConclusionRule>,
    catalog_path: Option<PathBuf>,
}

impl AppConfig {
    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary variable lookup.
    pub fn resolve(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let file = match var("AUDIT_CONFIG") {
            Some(path) => read_config_file(Path::new(&path))?,
            None => ConfigFile::default(),
        };

        let mut config = AppConfig::default();
        if let Some(port) = file.port {
            config.port = port;
        }
        if let Some(actor) = file.default_actor {
            config.default_actor = Actor::new(actor);
        }
        if let Some(rule) = file.conclusion_rule {
            config.conclusion_rule = rule;
        }
        config.catalog_path = file.catalog_path;

        if let Some(port) = var("PORT") {
            config.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT",
                value: port.clone(),
            })?;
        }
        if let Some(actor) = var("AUDIT_ACTOR").filter(|a| !a.trim().is_empty()) {
            config.default_actor = Actor::new(actor.trim());
        }
        if let Some(rule) = var("AUDIT_CONCLUSION_RULE") {
            config.conclusion_rule = rule.parse().map_err(|_| ConfigError::InvalidValue {
                key: "AUDIT_CONCLUSION_RULE",
                value: rule.clone(),
            })?;
        }
        if let Some(path) = var("AUDIT_CATALOG") {
            config.catalog_path = Some(PathBuf::from(path));
        }
        Ok(config)
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load control reference data keyed by control code.
pub fn load_catalog(path: &Path) -> Result<InMemoryCatalog, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };
    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&text).map_err(|e| parse_error(e.to_string()))
    } else {
        serde_yaml::from_str(&text).map_err(|e| parse_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_sources() {
        let config = AppConfig::resolve(env(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.default_actor, Actor::new("system"));
        assert_eq!(config.conclusion_rule, ConclusionRule::DeficiencyRate);
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: 9000\ndefault_actor: Riya Sharma\nconclusion_rule: zero-tolerance").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = AppConfig::resolve(env(&[("AUDIT_CONFIG", &path), ("PORT", "9100")])).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.default_actor, Actor::new("Riya Sharma"));
        assert_eq!(config.conclusion_rule, ConclusionRule::ZeroTolerance);
    }

    #[test]
    fn invalid_rule_rejected() {
        let err = AppConfig::resolve(env(&[("AUDIT_CONCLUSION_RULE", "lenient")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "AUDIT_CONCLUSION_RULE", .. }));
    }

    #[test]
    fn invalid_port_rejected() {
        let err = AppConfig::resolve(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PORT", .. }));
    }

    #[test]
    fn missing_config_file_reported() {
        let err = AppConfig::resolve(env(&[("AUDIT_CONFIG", "/nonexistent/audit.yaml")])).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn catalog_loads_from_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
ITGC-AC-01:
  overview:
    control_code: ITGC-AC-01
    control_name: User Access Review
  test_script:
    version: "1.0"
    generated_date: "2025-10-01"
    rules:
      - id: 1
        name: Review Completed
        type: completeness
        logic:
          field_name: reviewCompleted
          operator: equals
          expected_value: true
  samples:
    - sample_id: PR-S01
      primary_identifier: U-100
      fields:
        reviewCompleted: true
"#
        )
        .unwrap();
        let catalog = load_catalog(file.path()).unwrap();
        assert_eq!(catalog.len(), 1);
    }
}
