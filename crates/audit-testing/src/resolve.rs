//! # Sample Status Resolver
//!
//! Folds per-rule system results and auditor inputs into one
//! [`SampleFinalStatus`]. Precedence, first match wins:
//!
//! 1. An explicit final auditor decision for the sample.
//! 2. NOT TESTED while any rule has no auditor-input record (never visited).
//! 3. FAIL on the first effective FAIL in rule order.
//! 4. NOT_APPLICABLE when every effective result is NOT_APPLICABLE.
//! 5. OVERRIDDEN when any override disagreed with its system result.
//! 6. PASS.
//!
//! The attribute variant has no OVERRIDDEN state, and only mandatory
//! attributes can fail the sample.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::evaluate::{Check, SystemResult};
use crate::sample::SampleRecord;
use crate::session::EvidenceLabel;

/// Auditor input recorded against one rule of one sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorRuleInput {
    /// Override of the system result; `None` accepts the system result.
    #[serde(default, rename = "override")]
    pub override_result: Option<SystemResult>,
    /// Free-text auditor comment.
    #[serde(default)]
    pub comment: String,
    /// Label of attached evidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceLabel>,
}

/// Auditor inputs for one sample, keyed by rule identifier.
pub type SampleInputs = BTreeMap<u32, AuditorRuleInput>;

/// Final status of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFinalStatus {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
    #[serde(rename = "NOT_APPLICABLE")]
    NotApplicable,
    #[serde(rename = "OVERRIDDEN")]
    Overridden,
    #[serde(rename = "NOT_TESTED", alias = "NOT TESTED")]
    NotTested,
}

impl SampleFinalStatus {
    /// Whether the sample counts as tested.
    pub fn is_tested(&self) -> bool {
        !matches!(self, Self::NotTested)
    }
}

impl From<SystemResult> for SampleFinalStatus {
    fn from(result: SystemResult) -> Self {
        match result {
            SystemResult::Pass => Self::Pass,
            SystemResult::Fail => Self::Fail,
            SystemResult::NotApplicable => Self::NotApplicable,
        }
    }
}

impl std::fmt::Display for SampleFinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::NotApplicable => "NOT_APPLICABLE",
            Self::Overridden => "OVERRIDDEN",
            Self::NotTested => "NOT TESTED",
        };
        f.write_str(s)
    }
}

/// Resolve a sample tested with test-script rules.
///
/// `inputs` is `None` for a sample the auditor never opened.
pub fn resolve_sample<C: Check>(
    sample: &SampleRecord,
    checks: &[C],
    inputs: Option<&SampleInputs>,
    final_decision: Option<SystemResult>,
) -> SampleFinalStatus {
    if let Some(decision) = final_decision {
        return decision.into();
    }
    let Some(inputs) = inputs else {
        return SampleFinalStatus::NotTested;
    };
    if checks.iter().any(|c| !inputs.contains_key(&c.check_id())) {
        return SampleFinalStatus::NotTested;
    }

    let mut overridden = false;
    let mut all_not_applicable = true;
    for check in checks {
        let system = check.evaluate(sample);
        let override_result = inputs
            .get(&check.check_id())
            .and_then(|input| input.override_result);
        if override_result.is_some_and(|o| o != system) {
            overridden = true;
        }
        match override_result.unwrap_or(system) {
            SystemResult::Fail => return SampleFinalStatus::Fail,
            SystemResult::Pass => all_not_applicable = false,
            SystemResult::NotApplicable => {}
        }
    }

    if all_not_applicable {
        SampleFinalStatus::NotApplicable
    } else if overridden {
        SampleFinalStatus::Overridden
    } else {
        SampleFinalStatus::Pass
    }
}

/// Resolve a sample tested with attributes.
///
/// Overrides are applied but never produce OVERRIDDEN. A failing
/// non-mandatory attribute does not fail the sample.
pub fn resolve_legacy_sample<C: Check>(
    sample: &SampleRecord,
    attributes: &[C],
    inputs: Option<&SampleInputs>,
) -> SampleFinalStatus {
    let Some(inputs) = inputs else {
        return SampleFinalStatus::NotTested;
    };
    if attributes.iter().any(|a| !inputs.contains_key(&a.check_id())) {
        return SampleFinalStatus::NotTested;
    }

    let mut all_not_applicable = true;
    let mut failed = false;
    for attribute in attributes {
        let effective = inputs
            .get(&attribute.check_id())
            .and_then(|input| input.override_result)
            .unwrap_or_else(|| attribute.evaluate(sample));
        if effective != SystemResult::NotApplicable {
            all_not_applicable = false;
        }
        if effective == SystemResult::Fail && attribute.is_mandatory() {
            failed = true;
            break;
        }
    }

    if failed {
        SampleFinalStatus::Fail
    } else if all_not_applicable {
        SampleFinalStatus::NotApplicable
    } else {
        SampleFinalStatus::Pass
    }
}

/// The pre-override result of a sample: any FAIL, else all NOT_APPLICABLE,
/// else PASS.
pub fn system_determined_result<C: Check>(sample: &SampleRecord, checks: &[C]) -> SystemResult {
    let mut all_not_applicable = true;
    for check in checks {
        match check.evaluate(sample) {
            SystemResult::Fail => return SystemResult::Fail,
            SystemResult::Pass => all_not_applicable = false,
            SystemResult::NotApplicable => {}
        }
    }
    if all_not_applicable {
        SystemResult::NotApplicable
    } else {
        SystemResult::Pass
    }
}
