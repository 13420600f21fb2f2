//! # audit-cli: CLI Tool for the Audit Engagement Stack
//!
//! Provides the `audit` command-line interface. Every subcommand runs one
//! of the pure engines over a YAML or JSON document and prints the result.
//!
//! ## Subcommands
//!
//! - `audit matrix validate`: RACM row validation.
//! - `audit testing evaluate`: sample resolution, summary and conclusion.
//! - `audit engagement status`: engagement status roll-up.
//!
//! ```bash
//! audit matrix validate racm.yaml
//! audit testing evaluate itgc-ac-01.yaml --inputs inputs.yaml --rule zero-tolerance
//! audit engagement status controls.json --format json
//! ```
//!
//! Exit codes: `0` success, `1` invalid input or failed validation.

pub mod engagement;
pub mod matrix;
pub mod testing;

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// How results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Read a YAML document, or JSON when the file ends in `.json`.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
    } else {
        serde_yaml::from_str(&text).with_context(|| format!("invalid YAML in {}", path.display()))
    }
}

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn read_document_yaml_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.yaml");
        std::fs::write(&path, "a: 1\nb: 2\n").unwrap();
        let doc: BTreeMap<String, u32> = read_document(&path).unwrap();
        assert_eq!(doc["b"], 2);
    }

    #[test]
    fn read_document_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.JSON");
        std::fs::write(&path, r#"{"a": 1}"#).unwrap();
        let doc: BTreeMap<String, u32> = read_document(&path).unwrap();
        assert_eq!(doc["a"], 1);
    }

    #[test]
    fn read_document_missing_file_names_path() {
        let err = read_document::<serde_json::Value>(Path::new("/nonexistent/racm.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/racm.yaml"));
    }
}
