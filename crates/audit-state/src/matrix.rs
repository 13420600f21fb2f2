//! # Risk & Control Matrix
//!
//! A matrix is a list of risks paired with the controls that mitigate them.
//!
//! ## Status
//!
//! ```text
//! Draft ──validate──▶ Validated ──lock──▶ Locked (terminal)
//!   ▲                     │
//!   └──── any row edit ───┘
//! ```
//!
//! `is_locked()` is derived from the status, so a locked matrix is always in
//! `Locked`. Locking also publishes the matrix (`Publication::Active`), which
//! makes it linkable from SOX engagements.

use std::collections::BTreeSet;

use audit_core::{FieldError, FormErrors, MatrixId, RiskId, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::{validate_rows, ValidationReport};

// ─── Row ─────────────────────────────────────────────────────────────

/// Financial-statement assertion addressed by a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Assertion {
    Existence,
    Completeness,
    Accuracy,
    Valuation,
    #[serde(rename = "Cut-off")]
    CutOff,
}

impl std::fmt::Display for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Existence => "Existence",
            Self::Completeness => "Completeness",
            Self::Accuracy => "Accuracy",
            Self::Valuation => "Valuation",
            Self::CutOff => "Cut-off",
        };
        f.write_str(s)
    }
}

/// Column of a matrix row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowField {
    RiskId,
    RiskDescription,
    Assertion,
    ControlName,
    ControlDescription,
    KeyControl,
}

impl RowField {
    /// Every column, in export order.
    pub const ALL: [RowField; 6] = [
        Self::RiskId,
        Self::RiskDescription,
        Self::Assertion,
        Self::ControlName,
        Self::ControlDescription,
        Self::KeyControl,
    ];

    /// Columns that must be non-empty for a row to validate.
    pub const REQUIRED: [RowField; 5] = [
        Self::RiskId,
        Self::RiskDescription,
        Self::Assertion,
        Self::ControlName,
        Self::ControlDescription,
    ];

    /// Column header.
    pub fn header(&self) -> &'static str {
        match self {
            Self::RiskId => "Risk ID",
            Self::RiskDescription => "Risk Description",
            Self::Assertion => "Assertion",
            Self::ControlName => "Control Name",
            Self::ControlDescription => "Control Description",
            Self::KeyControl => "Key Control",
        }
    }
}

/// One risk/control pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskControlRow {
    /// Row id, unique within the matrix.
    pub id: u32,
    #[serde(default)]
    pub risk_id: RiskId,
    #[serde(default)]
    pub risk_description: String,
    #[serde(default)]
    pub assertion: Option<Assertion>,
    #[serde(default)]
    pub control_name: String,
    #[serde(default)]
    pub control_description: String,
    #[serde(default, alias = "key")]
    pub is_key_control: bool,
}

impl RiskControlRow {
    /// A blank row.
    pub fn blank(id: u32) -> Self {
        Self {
            id,
            risk_id: RiskId::default(),
            risk_description: String::new(),
            assertion: None,
            control_name: String::new(),
            control_description: String::new(),
            is_key_control: false,
        }
    }

    /// Whether a column is empty. The key-control flag is never blank.
    pub fn is_blank(&self, field: RowField) -> bool {
        match field {
            RowField::RiskId => self.risk_id.is_empty(),
            RowField::RiskDescription => self.risk_description.trim().is_empty(),
            RowField::Assertion => self.assertion.is_none(),
            RowField::ControlName => self.control_name.trim().is_empty(),
            RowField::ControlDescription => self.control_description.trim().is_empty(),
            RowField::KeyControl => false,
        }
    }

    /// Cell value as exported.
    pub fn cell(&self, field: RowField) -> String {
        match field {
            RowField::RiskId => self.risk_id.to_string(),
            RowField::RiskDescription => self.risk_description.clone(),
            RowField::Assertion => self.assertion.map(|a| a.to_string()).unwrap_or_default(),
            RowField::ControlName => self.control_name.clone(),
            RowField::ControlDescription => self.control_description.clone(),
            RowField::KeyControl => (if self.is_key_control { "Yes" } else { "No" }).to_string(),
        }
    }
}

/// Partial edit of a row. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowPatch {
    #[serde(default)]
    pub risk_id: Option<String>,
    #[serde(default)]
    pub risk_description: Option<String>,
    /// `Some(None)` clears the assertion; `None` leaves it unchanged.
    #[serde(default, with = "audit_core::double_option")]
    pub assertion: Option<Option<Assertion>>,
    #[serde(default)]
    pub control_name: Option<String>,
    #[serde(default)]
    pub control_description: Option<String>,
    #[serde(default)]
    pub is_key_control: Option<bool>,
}

impl RowPatch {
    fn apply(self, row: &mut RiskControlRow) {
        if let Some(v) = self.risk_id {
            row.risk_id = RiskId::new(v);
        }
        if let Some(v) = self.risk_description {
            row.risk_description = v;
        }
        if let Some(v) = self.assertion {
            row.assertion = v;
        }
        if let Some(v) = self.control_name {
            row.control_name = v;
        }
        if let Some(v) = self.control_description {
            row.control_description = v;
        }
        if let Some(v) = self.is_key_control {
            row.is_key_control = v;
        }
    }
}

// ─── Status ──────────────────────────────────────────────────────────

/// Editing status of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixStatus {
    Draft,
    Validated,
    Locked,
}

impl std::fmt::Display for MatrixStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => f.write_str("Draft"),
            Self::Validated => f.write_str("Validated"),
            Self::Locked => f.write_str("Locked"),
        }
    }
}

/// Status of a matrix in the matrix list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Publication {
    Draft,
    Active,
    Archived,
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by matrix operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    /// Lock attempted without a successful validation.
    #[error("RACM must be successfully validated before locking (status: {status})")]
    NotValidated { status: MatrixStatus },

    /// The matrix is locked and no longer editable.
    #[error("matrix {0} is locked")]
    Locked(MatrixId),

    /// Delete requested with nothing selected.
    #[error("select at least one row")]
    EmptySelection,

    #[error("row {0} not found")]
    UnknownRow(u32),
}

// ─── Matrix ──────────────────────────────────────────────────────────

/// A Risk & Control Matrix with its rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskControlMatrix {
    pub id: MatrixId,
    pub name: String,
    /// Free-form framework tag (e.g. `SOX`, `ITGC`).
    pub framework: String,
    pub financial_year: String,
    pub version: String,
    pub status: MatrixStatus,
    pub publication: Publication,
    pub linked_engagements: u32,
    pub owner: String,
    pub last_updated: Timestamp,
    #[serde(default)]
    pub rows: Vec<RiskControlRow>,
}

impl RiskControlMatrix {
    /// Create a matrix from a validated form.
    ///
    /// Returns every form error at once when the form is rejected.
    pub fn create(
        form: MatrixForm,
        existing: &[RiskControlMatrix],
        now: Timestamp,
    ) -> Result<Self, FormErrors> {
        validate_matrix_form(&form, existing).into_result()?;
        Ok(Self {
            id: MatrixId::new(),
            name: form.name.trim().to_string(),
            framework: form.framework.trim().to_string(),
            financial_year: form.financial_year.trim().to_string(),
            version: "v1.0".to_string(),
            status: MatrixStatus::Draft,
            publication: Publication::Draft,
            linked_engagements: 0,
            owner: form.owner.trim().to_string(),
            last_updated: now,
            rows: Vec::new(),
        })
    }

    pub fn is_locked(&self) -> bool {
        self.status == MatrixStatus::Locked
    }

    pub fn row(&self, row_id: u32) -> Option<&RiskControlRow> {
        self.rows.iter().find(|r| r.id == row_id)
    }

    fn next_row_id(&self) -> u32 {
        self.rows.iter().map(|r| r.id).max().unwrap_or(0) + 1
    }

    fn begin_edit(&mut self, now: Timestamp) -> Result<(), MatrixError> {
        if self.is_locked() {
            return Err(MatrixError::Locked(self.id));
        }
        if self.status == MatrixStatus::Validated {
            self.status = MatrixStatus::Draft;
        }
        self.last_updated = now;
        Ok(())
    }

    /// Append a row built from `patch` over a blank row. Returns its id.
    pub fn add_row(&mut self, patch: RowPatch, now: Timestamp) -> Result<u32, MatrixError> {
        self.begin_edit(now)?;
        let mut row = RiskControlRow::blank(self.next_row_id());
        patch.apply(&mut row);
        let id = row.id;
        self.rows.push(row);
        Ok(id)
    }

    /// Edit one row in place.
    pub fn edit_row(&mut self, row_id: u32, patch: RowPatch, now: Timestamp) -> Result<(), MatrixError> {
        if self.is_locked() {
            return Err(MatrixError::Locked(self.id));
        }
        if self.row(row_id).is_none() {
            return Err(MatrixError::UnknownRow(row_id));
        }
        self.begin_edit(now)?;
        if let Some(row) = self.rows.iter_mut().find(|r| r.id == row_id) {
            patch.apply(row);
        }
        Ok(())
    }

    /// Copy a row directly after the original, with the key-control flag
    /// cleared. Returns the new row id.
    pub fn copy_row(&mut self, row_id: u32, now: Timestamp) -> Result<u32, MatrixError> {
        if self.is_locked() {
            return Err(MatrixError::Locked(self.id));
        }
        let index = self
            .rows
            .iter()
            .position(|r| r.id == row_id)
            .ok_or(MatrixError::UnknownRow(row_id))?;
        self.begin_edit(now)?;
        let mut copy = self.rows[index].clone();
        copy.id = self.next_row_id();
        copy.is_key_control = false;
        let id = copy.id;
        self.rows.insert(index + 1, copy);
        Ok(id)
    }

    /// Delete the selected rows. Returns how many were removed.
    pub fn delete_rows(&mut self, selection: &[u32], now: Timestamp) -> Result<usize, MatrixError> {
        if self.is_locked() {
            return Err(MatrixError::Locked(self.id));
        }
        if selection.is_empty() {
            return Err(MatrixError::EmptySelection);
        }
        self.begin_edit(now)?;
        let selected: BTreeSet<u32> = selection.iter().copied().collect();
        let before = self.rows.len();
        self.rows.retain(|r| !selected.contains(&r.id));
        Ok(before - self.rows.len())
    }

    /// Validate the rows. A clean report moves Draft → Validated; otherwise
    /// the status is unchanged.
    pub fn validate(&mut self, now: Timestamp) -> Result<ValidationReport, MatrixError> {
        if self.is_locked() {
            return Err(MatrixError::Locked(self.id));
        }
        let report = validate_rows(&self.rows);
        if report.is_valid() && self.status == MatrixStatus::Draft {
            self.status = MatrixStatus::Validated;
            self.last_updated = now;
        }
        Ok(report)
    }

    /// Lock (Validated → Locked). Irreversible. Publishes the matrix.
    pub fn lock(&mut self, now: Timestamp) -> Result<(), MatrixError> {
        if self.status != MatrixStatus::Validated {
            return Err(MatrixError::NotValidated {
                status: self.status,
            });
        }
        self.status = MatrixStatus::Locked;
        self.publication = Publication::Active;
        self.last_updated = now;
        Ok(())
    }

    /// Retire the matrix from the list of linkable matrices.
    pub fn archive(&mut self, now: Timestamp) {
        self.publication = Publication::Archived;
        self.last_updated = now;
    }

    /// An editable copy: bumped minor version, ` (Copy)` suffix, Draft,
    /// unlinked.
    pub fn duplicate(&self, now: Timestamp) -> Self {
        Self {
            id: MatrixId::new(),
            name: format!("{} (Copy)", self.name),
            version: bump_minor_version(&self.version),
            status: MatrixStatus::Draft,
            publication: Publication::Draft,
            linked_engagements: 0,
            last_updated: now,
            ..self.clone()
        }
    }

    /// Count one more engagement referencing this matrix.
    pub fn link_engagement(&mut self) {
        self.linked_engagements += 1;
    }

    /// Whether a SOX engagement may link to this matrix.
    pub fn is_sox_eligible(&self) -> bool {
        self.framework == "SOX" && self.publication == Publication::Active && self.is_locked()
    }
}

/// `v1.0` → `v1.1`; a version without a minor part gains `.1`.
fn bump_minor_version(version: &str) -> String {
    match version.split_once('.') {
        Some((major, minor)) => {
            let digits: String = minor.chars().take_while(char::is_ascii_digit).collect();
            let next = digits.parse::<u32>().unwrap_or(0) + 1;
            format!("{major}.{next}")
        }
        None => format!("{version}.1"),
    }
}

// ─── Creation form ───────────────────────────────────────────────────

/// Input for creating a matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub financial_year: String,
}

/// Message for a name+framework+year collision.
pub const DUPLICATE_CONFIGURATION: &str = "Duplicate RACM configuration detected.";

/// Validate a matrix creation form, collecting every error.
pub fn validate_matrix_form(form: &MatrixForm, existing: &[RiskControlMatrix]) -> FormErrors {
    let mut errors = FormErrors::new();
    let name = form.name.trim();
    let framework = form.framework.trim();
    let year = form.financial_year.trim();

    if name.is_empty() {
        errors.push(FieldError::RequiredFieldMissing {
            field: "name".to_string(),
        });
    } else if name.chars().count() < 3 {
        errors.push(FieldError::TooShort {
            field: "name".to_string(),
            min: 3,
        });
    } else if existing.iter().any(|m| m.name.to_lowercase() == name.to_lowercase()) {
        errors.push(FieldError::DuplicateName {
            field: "name".to_string(),
            value: name.to_string(),
        });
    }

    for (field, value) in [
        ("owner", form.owner.trim()),
        ("framework", framework),
        ("financial_year", year),
    ] {
        if value.is_empty() {
            errors.push(FieldError::RequiredFieldMissing {
                field: field.to_string(),
            });
        }
    }

    if !name.is_empty()
        && !framework.is_empty()
        && !year.is_empty()
        && existing.iter().any(|m| {
            m.name.to_lowercase() == name.to_lowercase()
                && m.framework == framework
                && m.financial_year == year
        })
    {
        errors.push_form(DUPLICATE_CONFIGURATION);
    }
    errors
}

// ─── Tests ───────────────────────────────────────────────────────────
