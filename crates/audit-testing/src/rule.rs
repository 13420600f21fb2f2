//! # Test Rules
//!
//! Two rule forms exist in control reference data:
//!
//! - **Test-script rules** ([`TestScriptRule`]): a declarative comparison of
//!   one sample field against an expected value or another field. A missing
//!   field makes the rule not applicable.
//!
//! - **Attributes** ([`TestAttribute`]): older controls describe each check as
//!   a boolean [`Predicate`] tree. Absent fields read as `null` and the result
//!   is only ever pass or fail.
//!
//! Both are data. Adding an operator means adding an [`Operator`] variant and
//! one match arm in `evaluate.rs`; no caller changes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Operators ───────────────────────────────────────────────────────

/// Comparison operator applied between a sample value and an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Strict equality. Numbers compare by value (`1 == 1.0`).
    #[serde(alias = "===", alias = "==")]
    Equals,
    /// Strict inequality.
    #[serde(alias = "!==", alias = "!=")]
    NotEquals,
    /// Numeric or lexicographic `<`.
    #[serde(alias = "<")]
    LessThan,
    /// Numeric or lexicographic `<=`.
    #[serde(alias = "<=")]
    LessThanOrEqual,
    /// Numeric or lexicographic `>`.
    #[serde(alias = ">")]
    GreaterThan,
    /// Numeric or lexicographic `>=`.
    #[serde(alias = ">=")]
    GreaterThanOrEqual,
}

impl Operator {
    /// The conventional symbol for this operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Equals => "===",
            Self::NotEquals => "!==",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// A literal value.
    Value(Value),
    /// Another field of the same sample.
    Field(String),
}

// ─── Test-script rules ───────────────────────────────────────────────

/// Classification of a test-script rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    Completeness,
    Accuracy,
    Validity,
    Custom,
}

/// The declarative comparison performed by a test-script rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleLogic {
    /// Sample field under test.
    pub field_name: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Expected value, used when `reference_field` is not set.
    #[serde(default)]
    pub expected_value: Value,
    /// Compare against this sample field instead of `expected_value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_field: Option<String>,
}

impl RuleLogic {
    /// `field <op> literal`.
    pub fn compare(field: impl Into<String>, operator: Operator, expected: impl Into<Value>) -> Self {
        Self {
            field_name: field.into(),
            operator,
            expected_value: expected.into(),
            reference_field: None,
        }
    }

    /// `field == literal`.
    pub fn equals(field: impl Into<String>, expected: impl Into<Value>) -> Self {
        Self::compare(field, Operator::Equals, expected)
    }

    /// `field <op> other_field`.
    pub fn against_field(
        field: impl Into<String>,
        operator: Operator,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field.into(),
            operator,
            expected_value: Value::Null,
            reference_field: Some(reference.into()),
        }
    }

    /// The operand this logic compares against.
    pub fn operand(&self) -> Operand {
        match &self.reference_field {
            Some(field) => Operand::Field(field.clone()),
            None => Operand::Value(self.expected_value.clone()),
        }
    }
}

/// One rule of a test script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScriptRule {
    /// Rule identifier, unique within its script.
    pub id: u32,
    /// Short name.
    pub name: String,
    /// What the auditor is verifying.
    #[serde(default)]
    pub description: String,
    /// Rule classification.
    #[serde(rename = "type", alias = "kind")]
    pub kind: RuleKind,
    /// The comparison.
    pub logic: RuleLogic,
}

/// A versioned set of test-script rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScript {
    /// Script version (e.g. `TS-v1.2`).
    pub version: String,
    /// When the script was generated (display string).
    #[serde(default)]
    pub generated_date: String,
    /// Rules in evaluation order.
    pub rules: Vec<TestScriptRule>,
}

// ─── Attributes ──────────────────────────────────────────────────────

/// Boolean condition over a sample, used by attribute-style controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// `field <operator> operand`; absent fields read as `null`.
    Compare {
        field: String,
        operator: Operator,
        operand: Operand,
    },
    /// The field holds a truthy value (not null, false, 0 or "").
    Truthy { field: String },
    /// Negation.
    Not { predicate: Box<Predicate> },
    /// Every predicate holds (true when empty).
    All { predicates: Vec<Predicate> },
    /// At least one predicate holds (false when empty).
    Any { predicates: Vec<Predicate> },
}

impl Predicate {
    /// `field <op> literal`.
    pub fn compare(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            operator,
            operand: Operand::Value(value.into()),
        }
    }

    /// `field <op> other_field`.
    pub fn compare_fields(
        field: impl Into<String>,
        operator: Operator,
        other: impl Into<String>,
    ) -> Self {
        Self::Compare {
            field: field.into(),
            operator,
            operand: Operand::Field(other.into()),
        }
    }

    /// `field` is truthy.
    pub fn truthy(field: impl Into<String>) -> Self {
        Self::Truthy {
            field: field.into(),
        }
    }

    /// Negate `predicate`.
    pub fn negate(predicate: Predicate) -> Self {
        Self::Not {
            predicate: Box::new(predicate),
        }
    }
}

/// One attribute of an attribute-style control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestAttribute {
    /// Attribute identifier, unique within its control.
    pub attribute_id: u32,
    /// What the auditor is verifying.
    pub name: String,
    /// Whether a failure of this attribute fails the sample.
    #[serde(default = "default_mandatory")]
    pub mandatory: bool,
    /// The condition that must hold.
    pub predicate: Predicate,
}

fn default_mandatory() -> bool {
    true
}
