//! # Engagement CLI: roll control statuses up to an engagement status.
//!
//! ```bash
//! audit engagement status controls.yaml
//! ```
//!
//! The document is a list of controls with their `status` and optional
//! `conclusion`, either bare or under a `controls:` key.

use std::path::{Path, PathBuf};

use anyhow::Result;
use audit_state::{count_ineffective, derive_engagement_status, ControlStatus, EngagementStatus};
use audit_testing::Conclusion;
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};

use crate::{print_json, read_document, OutputFormat};

/// Engagement subcommand arguments.
#[derive(Args, Debug)]
pub struct EngagementArgs {
    #[command(subcommand)]
    pub command: EngagementCommand,
}

/// Available engagement subcommands.
#[derive(Subcommand, Debug)]
pub enum EngagementCommand {
    /// Derive the engagement status and deficiency count.
    Status {
        /// Controls document (YAML, or JSON by extension).
        file: PathBuf,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// One control's state as input to the roll-up.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlState {
    #[serde(default)]
    pub control_code: Option<String>,
    pub status: ControlStatus,
    #[serde(default)]
    pub conclusion: Option<Conclusion>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ControlsDocument {
    Wrapped { controls: Vec<ControlState> },
    Bare(Vec<ControlState>),
}

impl ControlsDocument {
    pub fn into_controls(self) -> Vec<ControlState> {
        match self {
            Self::Wrapped { controls } | Self::Bare(controls) => controls,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RollUp {
    pub status: EngagementStatus,
    pub total_deficiencies: u32,
    pub controls: usize,
}

/// Execute the engagement subcommand.
pub fn run_engagement(args: &EngagementArgs) -> Result<u8> {
    match &args.command {
        EngagementCommand::Status { file, format } => run_status(file, *format),
    }
}

/// Roll control states up to the engagement level.
pub fn roll_up(controls: &[ControlState]) -> RollUp {
    let statuses: Vec<ControlStatus> = controls.iter().map(|c| c.status).collect();
    RollUp {
        status: derive_engagement_status(&statuses),
        total_deficiencies: count_ineffective(controls.iter().map(|c| c.conclusion)),
        controls: controls.len(),
    }
}

fn run_status(file: &Path, format: OutputFormat) -> Result<u8> {
    let controls = read_document::<ControlsDocument>(file)?.into_controls();
    for control in controls.iter().filter(|c| c.conclusion.is_some() && c.status != ControlStatus::Concluded) {
        tracing::debug!(
            control = control.control_code.as_deref().unwrap_or("-"),
            status = %control.status,
            "conclusion on a control that is not concluded"
        );
    }
    let result = roll_up(&controls);
    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => println!(
            "{} ({} controls, {} deficiencies)",
            result.status, result.controls, result.total_deficiencies
        ),
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_controls_roll_up_in_progress() {
        let doc: ControlsDocument = serde_yaml::from_str(
            r#"
controls:
  - { control_code: C-1, status: Concluded, conclusion: Effective }
  - { control_code: C-2, status: Concluded, conclusion: Ineffective }
  - { control_code: C-3, status: In Testing }
"#,
        )
        .unwrap();
        let result = roll_up(&doc.into_controls());
        assert_eq!(result.status, EngagementStatus::InProgress);
        assert_eq!(result.total_deficiencies, 1);
        assert_eq!(result.controls, 3);
    }

    #[test]
    fn bare_list_and_empty_list() {
        let doc: ControlsDocument = serde_json::from_str(r#"[{"status": "Pending Review"}]"#).unwrap();
        assert_eq!(roll_up(&doc.into_controls()).status, EngagementStatus::UnderReview);
        assert_eq!(roll_up(&[]).status, EngagementStatus::NotStarted);
    }

    #[test]
    fn run_status_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("controls.json");
        std::fs::write(&path, r#"{"controls": [{"status": "Concluded", "conclusion": "Effective"}]}"#).unwrap();
        assert_eq!(run_status(&path, OutputFormat::Text).unwrap(), 0);
    }
}
