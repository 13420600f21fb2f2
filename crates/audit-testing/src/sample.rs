//! # Sample Records
//!
//! One test unit drawn from a population snapshot: an identifier plus an
//! opaque bag of field values the rules are evaluated against.

use std::collections::BTreeMap;

use audit_core::SampleId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A sample record under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Sample identifier (e.g. `PR-S01`).
    pub sample_id: SampleId,
    /// Business key of the underlying record (e.g. an employee number).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_identifier: Option<String>,
    /// Label for the business key (e.g. `Employee ID`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_identifier_label: Option<String>,
    /// Field values evaluated by the rules.
    #[serde(default, alias = "record_data")]
    pub fields: BTreeMap<String, Value>,
}

impl SampleRecord {
    /// Create a sample with no fields.
    pub fn new(sample_id: SampleId) -> Self {
        Self {
            sample_id,
            primary_identifier: None,
            primary_identifier_label: None,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// The value of a field, treating an explicit `null` as absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// The value of a field with absence read as `null`.
    pub fn field_or_null(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&Value::Null)
    }
}
