//! # RACM Validation Engine
//!
//! A pure read over matrix rows. Two checks, both always run to completion:
//!
//! 1. Every row has a risk identifier, risk description, assertion, control
//!    name and control description. Each empty field is reported as
//!    `Required` on that row.
//! 2. Rows are grouped by non-empty risk identifier, in first-seen order.
//!    A group without a key control marks every row in it as invalid (an
//!    entry, possibly with no field messages) and the first such group is
//!    named in a single global message.

use std::collections::BTreeMap;

use audit_core::RiskId;
use serde::{Deserialize, Serialize};

use crate::matrix::{RiskControlRow, RowField};

/// Message attached to an empty required field.
pub const REQUIRED: &str = "Required";

/// Global message when only field errors were found.
pub const REVIEW_HIGHLIGHTED: &str = "Validation failed. Please review highlighted rows.";

/// Outcome of validating a set of matrix rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Invalid rows by row id. A row may be present with no field messages
    /// when it belongs to a risk group without a key control.
    pub row_errors: BTreeMap<u32, BTreeMap<RowField, String>>,
    /// Summary messages; at most one.
    pub global: Vec<String>,
    /// First risk group found without a key control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_key_control: Option<RiskId>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.row_errors.is_empty()
    }

    /// Whether the given row was flagged.
    pub fn is_row_invalid(&self, row_id: u32) -> bool {
        self.row_errors.contains_key(&row_id)
    }
}

/// Validate matrix rows without mutating them.
pub fn validate_rows(rows: &[RiskControlRow]) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut groups: Vec<(&RiskId, Vec<&RiskControlRow>)> = Vec::new();

    for row in rows {
        if !row.risk_id.is_empty() {
            match groups.iter_mut().find(|(id, _)| *id == &row.risk_id) {
                Some((_, members)) => members.push(row),
                None => groups.push((&row.risk_id, vec![row])),
            }
        }

        let missing: BTreeMap<RowField, String> = RowField::REQUIRED
            .iter()
            .filter(|field| row.is_blank(**field))
            .map(|field| (*field, REQUIRED.to_string()))
            .collect();
        if !missing.is_empty() {
            report.row_errors.insert(row.id, missing);
        }
    }

    for (risk_id, members) in &groups {
        if members.iter().any(|r| r.is_key_control) {
            continue;
        }
        for row in members {
            report.row_errors.entry(row.id).or_default();
        }
        if report.missing_key_control.is_none() {
            report.missing_key_control = Some((*risk_id).clone());
            report.global.push(format!(
                "Validation failed: Risk ID {risk_id} must have at least one key control."
            ));
        }
    }

    if !report.row_errors.is_empty() && report.global.is_empty() {
        report.global.push(REVIEW_HIGHLIGHTED.to_string());
    }
    report
}
