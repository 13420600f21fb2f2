//! # Error Types: Structured Error Hierarchy
//!
//! All errors use `thiserror`. Every failure in the audit domain is a
//! recoverable business-rule or input failure, never a crash.
//!
//! ## Design
//!
//! - State machine errors (in `audit-state`) carry the current state, the
//!   attempted target and the rejection reason.
//! - Form validation never fails fast. [`FormErrors`] collects one message
//!   per field plus optional form-level messages and is returned whole.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for the audit stack.
#[derive(Error, Debug)]
pub enum AuditError {
    /// State machine transition rejected.
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    /// Input validation failure.
    #[error("validation error: {0}")]
    Validation(String),

    /// Form validation failure with per-field detail.
    #[error("form validation failed: {0}")]
    Form(FormErrors),

    /// Referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single form field was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldError {
    /// The field is required but empty.
    #[error("{field} is required")]
    RequiredFieldMissing {
        /// Field name.
        field: String,
    },

    /// The value is shorter than the minimum length.
    #[error("{field} must be at least {min} characters")]
    TooShort {
        /// Field name.
        field: String,
        /// Minimum number of characters.
        min: usize,
    },

    /// Another record already uses this name (case-insensitive).
    #[error("{field} '{value}' already exists")]
    DuplicateName {
        /// Field name.
        field: String,
        /// The rejected value.
        value: String,
    },

    /// The value is present but not acceptable.
    #[error("{field}: {message}")]
    Invalid {
        /// Field name.
        field: String,
        /// Human-readable reason.
        message: String,
    },
}

impl FieldError {
    /// The field this error is attached to.
    pub fn field(&self) -> &str {
        match self {
            Self::RequiredFieldMissing { field }
            | Self::TooShort { field, .. }
            | Self::DuplicateName { field, .. }
            | Self::Invalid { field, .. } => field,
        }
    }
}

/// Collected validation failures for a whole form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormErrors {
    /// At most one error per field; the first recorded wins.
    pub fields: BTreeMap<String, FieldError>,
    /// Form-level messages (e.g. duplicate configuration).
    pub form: Vec<String>,
}

impl FormErrors {
    /// An empty error set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a field error unless the field already has one.
    pub fn push(&mut self, error: FieldError) {
        self.fields
            .entry(error.field().to_string())
            .or_insert(error);
    }

    /// Record a form-level message.
    pub fn push_form(&mut self, message: impl Into<String>) {
        self.form.push(message.into());
    }

    /// Whether the given field has an error.
    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.form.is_empty()
    }

    /// `Ok(())` when empty, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), FormErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for FormErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = self.fields.values().map(|e| e.to_string()).collect();
        parts.extend(self.form.iter().cloned());
        f.write_str(&parts.join("; "))
    }
}

impl From<FormErrors> for AuditError {
    fn from(errors: FormErrors) -> Self {
        Self::Form(errors)
    }
}
