//! # Matrix CLI: validate risk & control matrices.
//!
//! ```bash
//! audit matrix validate racm.yaml
//! ```
//!
//! The document may be a bare `rows:` list or a full exported matrix;
//! only the rows are read. Exits `1` when any row is invalid.

use std::path::{Path, PathBuf};

use anyhow::Result;
use audit_state::{validate_rows, RiskControlRow, ValidationReport};
use clap::{Args, Subcommand};
use serde::Deserialize;

use crate::{print_json, read_document, OutputFormat};

/// Matrix subcommand arguments.
#[derive(Args, Debug)]
pub struct MatrixArgs {
    #[command(subcommand)]
    pub command: MatrixCommand,
}

/// Available matrix subcommands.
#[derive(Subcommand, Debug)]
pub enum MatrixCommand {
    /// Validate matrix rows: required fields and one key control per risk.
    Validate {
        /// Matrix document (YAML, or JSON by extension).
        file: PathBuf,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Rows of a matrix document.
#[derive(Debug, Deserialize)]
pub struct MatrixDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rows: Vec<RiskControlRow>,
}

/// Execute the matrix subcommand.
pub fn run_matrix(args: &MatrixArgs) -> Result<u8> {
    match &args.command {
        MatrixCommand::Validate { file, format } => run_validate(file, *format),
    }
}

fn run_validate(file: &Path, format: OutputFormat) -> Result<u8> {
    let doc: MatrixDocument = read_document(file)?;
    let report = validate_rows(&doc.rows);
    tracing::info!(
        file = %file.display(),
        rows = doc.rows.len(),
        invalid = report.row_errors.len(),
        "matrix validated"
    );

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print!("{}", render_report(doc.name.as_deref(), doc.rows.len(), &report)),
    }
    Ok(if report.is_valid() { 0 } else { 1 })
}

/// Text rendering of a validation report.
pub fn render_report(name: Option<&str>, rows: usize, report: &ValidationReport) -> String {
    let mut out = String::new();
    let title = name.unwrap_or("RACM");
    if report.is_valid() {
        out.push_str(&format!("{title}: VALID ({rows} rows)\n"));
        return out;
    }
    out.push_str(&format!(
        "{title}: INVALID ({} of {rows} rows flagged)\n",
        report.row_errors.len()
    ));
    for (row_id, fields) in &report.row_errors {
        if fields.is_empty() {
            out.push_str(&format!("  row {row_id}: no key control in risk group\n"));
        }
        for (field, message) in fields {
            out.push_str(&format!("  row {row_id}: {}: {message}\n", field.header()));
        }
    }
    for message in &report.global {
        out.push_str(&format!("{message}\n"));
    }
    out
}
