//! # Rule Evaluation Engine
//!
//! Pure, deterministic evaluation of one rule against one sample. Nothing
//! here mutates state, so re-running after every auditor edit is safe.
//!
//! ## Comparison semantics
//!
//! - Two numbers compare by numeric value (`1` equals `1.0`).
//! - Two strings order lexicographically.
//! - Any other pairing supports only equality (structural); ordering
//!   operators on mismatched or non-orderable types are false.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rule::{Operand, Operator, Predicate, TestAttribute, TestScriptRule};
use crate::sample::SampleRecord;

/// Result of evaluating one rule against one sample, before overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemResult {
    Pass,
    Fail,
    NotApplicable,
}

impl SystemResult {
    /// Map a boolean outcome to PASS/FAIL.
    pub fn from_bool(passed: bool) -> Self {
        if passed {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    /// Display label used in the legacy attribute vocabulary.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pass => "Pass",
            Self::Fail => "Fail",
            Self::NotApplicable => "Not Applicable",
        }
    }
}

impl std::fmt::Display for SystemResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::NotApplicable => "NOT_APPLICABLE",
        };
        f.write_str(s)
    }
}

/// One rule's evaluation as shown next to the rule in the testing view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleExecution {
    /// Rule identifier.
    pub rule_id: u32,
    /// The system result.
    pub system_result: SystemResult,
    /// The sample's value for the field under test (`null` when absent).
    pub evaluated_value: Value,
    /// The value it was compared against.
    pub expected_value: Value,
}

// ─── Check trait ─────────────────────────────────────────────────────

/// Anything that can be evaluated against a sample.
///
/// Implemented by both rule forms so that resolution and aggregation work
/// over either without knowing which one they hold.
pub trait Check {
    /// Identifier of the check within its control.
    fn check_id(&self) -> u32;

    /// Evaluate against a sample.
    fn evaluate(&self, sample: &SampleRecord) -> SystemResult;

    /// Whether a failure of this check fails the sample.
    fn is_mandatory(&self) -> bool {
        true
    }
}

impl Check for TestScriptRule {
    fn check_id(&self) -> u32 {
        self.id
    }

    fn evaluate(&self, sample: &SampleRecord) -> SystemResult {
        evaluate_rule(sample, self)
    }
}

impl Check for TestAttribute {
    fn check_id(&self) -> u32 {
        self.attribute_id
    }

    fn evaluate(&self, sample: &SampleRecord) -> SystemResult {
        SystemResult::from_bool(evaluate_predicate(sample, &self.predicate))
    }

    fn is_mandatory(&self) -> bool {
        self.mandatory
    }
}

// ─── Test-script rules ───────────────────────────────────────────────

/// Evaluate a declarative rule against a sample.
///
/// An absent or `null` field under test yields NOT_APPLICABLE regardless of
/// the operator. The same holds for an absent reference field.
pub fn evaluate_rule(sample: &SampleRecord, rule: &TestScriptRule) -> SystemResult {
    execute_rule(sample, rule).system_result
}

/// Evaluate a declarative rule and capture the compared values.
pub fn execute_rule(sample: &SampleRecord, rule: &TestScriptRule) -> RuleExecution {
    let logic = &rule.logic;
    let evaluated = sample.field(&logic.field_name).cloned();
    let expected = match &logic.reference_field {
        Some(reference) => sample.field(reference).cloned(),
        None => Some(logic.expected_value.clone()),
    };

    let system_result = match (&evaluated, &expected) {
        (Some(actual), Some(expected)) => {
            SystemResult::from_bool(compare(actual, logic.operator, expected))
        }
        _ => SystemResult::NotApplicable,
    };

    RuleExecution {
        rule_id: rule.id,
        system_result,
        evaluated_value: evaluated.unwrap_or(Value::Null),
        expected_value: expected.unwrap_or(Value::Null),
    }
}

// ─── Predicates ──────────────────────────────────────────────────────

/// Evaluate an attribute predicate. Absent fields read as `null`.
pub fn evaluate_predicate(sample: &SampleRecord, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Compare {
            field,
            operator,
            operand,
        } => {
            let left = sample.field_or_null(field);
            let right = match operand {
                Operand::Value(v) => v,
                Operand::Field(other) => sample.field_or_null(other),
            };
            compare(left, *operator, right)
        }
        Predicate::Truthy { field } => is_truthy(sample.field_or_null(field)),
        Predicate::Not { predicate } => !evaluate_predicate(sample, predicate),
        Predicate::All { predicates } => predicates.iter().all(|p| evaluate_predicate(sample, p)),
        Predicate::Any { predicates } => predicates.iter().any(|p| evaluate_predicate(sample, p)),
    }
}

/// Truthiness: `null`, `false`, `0` and `""` are falsy; everything else,
/// including empty arrays and objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ─── Comparison ──────────────────────────────────────────────────────

/// Apply `operator` to `left` and `right`.
pub fn compare(left: &Value, operator: Operator, right: &Value) -> bool {
    match operator {
        Operator::Equals => values_equal(left, right),
        Operator::NotEquals => !values_equal(left, right),
        Operator::LessThan => ordering(left, right) == Some(Ordering::Less),
        Operator::LessThanOrEqual => matches!(
            ordering(left, right),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::GreaterThan => ordering(left, right) == Some(Ordering::Greater),
        Operator::GreaterThanOrEqual => matches!(
            ordering(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
