//! # Control Reference Data
//!
//! [`ControlFullDetail`] is read-only input to the testing engine: the
//! control overview, its test procedure, the population snapshot and the
//! samples drawn from it. It is provided by a [`ControlCatalog`].
//!
//! [`check_readiness`] is the gate for moving a control into testing.

use std::collections::HashMap;

use audit_core::SampleId;
use serde::{Deserialize, Serialize};

use crate::evaluate::{evaluate_predicate, execute_rule, RuleExecution, SystemResult};
use crate::resolve::{
    resolve_legacy_sample, resolve_sample, system_determined_result, SampleFinalStatus,
    SampleInputs,
};
use crate::rule::{TestAttribute, TestScript};
use crate::sample::SampleRecord;

/// Descriptive metadata of a control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlOverview {
    /// Control code (e.g. `ITGC-AC-01`).
    #[serde(alias = "control_id")]
    pub control_code: String,
    pub control_name: String,
    #[serde(default)]
    pub description: String,
    /// Classification (e.g. `Key · Preventive · Manual`).
    #[serde(default)]
    pub classification: String,
    #[serde(default)]
    pub assertions: Vec<String>,
}

/// How samples of a control are tested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestProcedure {
    /// Declarative test-script rules.
    TestScript(TestScript),
    /// Attribute predicates.
    Attributes(Vec<TestAttribute>),
}

impl TestProcedure {
    /// Identifiers of every rule or attribute, in procedure order.
    pub fn check_ids(&self) -> Vec<u32> {
        match self {
            Self::TestScript(script) => script.rules.iter().map(|r| r.id).collect(),
            Self::Attributes(attrs) => attrs.iter().map(|a| a.attribute_id).collect(),
        }
    }

    /// Final status of one sample under this procedure.
    ///
    /// A final decision wins for both forms; otherwise scripts go through
    /// [`resolve_sample`] and attributes through [`resolve_legacy_sample`].
    pub fn resolve(
        &self,
        sample: &SampleRecord,
        inputs: Option<&SampleInputs>,
        final_decision: Option<SystemResult>,
    ) -> SampleFinalStatus {
        match self {
            Self::TestScript(script) => resolve_sample(sample, &script.rules, inputs, final_decision),
            Self::Attributes(attrs) => match final_decision {
                Some(decision) => decision.into(),
                None => resolve_legacy_sample(sample, attrs, inputs),
            },
        }
    }

    /// Pre-override result of a sample.
    pub fn system_result(&self, sample: &SampleRecord) -> SystemResult {
        match self {
            Self::TestScript(script) => system_determined_result(sample, &script.rules),
            Self::Attributes(attrs) => system_determined_result(sample, attrs),
        }
    }

    /// Per-rule results for display. Attribute predicates have no single
    /// evaluated or expected value, so both are null.
    pub fn executions(&self, sample: &SampleRecord) -> Vec<RuleExecution> {
        match self {
            Self::TestScript(script) => script.rules.iter().map(|r| execute_rule(sample, r)).collect(),
            Self::Attributes(attrs) => attrs
                .iter()
                .map(|a| RuleExecution {
                    rule_id: a.attribute_id,
                    system_result: SystemResult::from_bool(evaluate_predicate(sample, &a.predicate)),
                    evaluated_value: serde_json::Value::Null,
                    expected_value: serde_json::Value::Null,
                })
                .collect(),
        }
    }
}

/// Lifecycle of a population snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapshotStatus {
    Frozen,
    Active,
}

/// The dataset from which samples are drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub snapshot_id: String,
    pub dataset_name: String,
    pub record_count: u64,
    pub uploaded_by: String,
    pub upload_date: String,
    pub status: SnapshotStatus,
}

/// Everything the testing engine needs to know about one control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlFullDetail {
    pub overview: ControlOverview,
    #[serde(flatten)]
    pub procedure: TestProcedure,
    #[serde(default)]
    pub snapshot: Option<PopulationSnapshot>,
    #[serde(default)]
    pub samples: Vec<SampleRecord>,
}

impl ControlFullDetail {
    /// Look up a sample by identifier.
    pub fn sample(&self, sample_id: &SampleId) -> Option<&SampleRecord> {
        self.samples.iter().find(|s| &s.sample_id == sample_id)
    }

    /// Whether the control is tested with a declarative test script.
    pub fn is_scripted(&self) -> bool {
        matches!(self.procedure, TestProcedure::TestScript(_))
    }
}

// ─── Catalog ─────────────────────────────────────────────────────────

/// Read-only provider of control reference data.
pub trait ControlCatalog: Send + Sync {
    /// Reference data for a control code, if known.
    fn lookup(&self, control_code: &str) -> Option<ControlFullDetail>;
}

/// A catalog held in memory, keyed by control code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InMemoryCatalog {
    controls: HashMap<String, ControlFullDetail>,
}

impl InMemoryCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a map of control code to detail.
    pub fn from_map(controls: HashMap<String, ControlFullDetail>) -> Self {
        Self { controls }
    }

    /// Add or replace a control, keyed by its overview code.
    pub fn insert(&mut self, detail: ControlFullDetail) {
        self.controls
            .insert(detail.overview.control_code.clone(), detail);
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

impl ControlCatalog for InMemoryCatalog {
    fn lookup(&self, control_code: &str) -> Option<ControlFullDetail> {
        self.controls.get(control_code).cloned()
    }
}

// ─── Readiness ───────────────────────────────────────────────────────

/// Why testing cannot start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestingBlocked {
    NoSampleGenerated,
    PopulationNotFrozen,
}

impl std::fmt::Display for TestingBlocked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSampleGenerated => f.write_str(
                "No sample generated yet. Upload population and generate sample first.",
            ),
            Self::PopulationNotFrozen => f.write_str("Population must be frozen before testing."),
        }
    }
}

/// Outcome of the testing readiness gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Blocked(TestingBlocked),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Whether a control may enter testing.
///
/// Ready when samples exist and the snapshot is frozen, or when an ad-hoc
/// sample upload has happened. `detail` is `None` for controls without
/// reference data.
pub fn check_readiness(detail: Option<&ControlFullDetail>, adhoc_upload: bool) -> Readiness {
    if adhoc_upload {
        return Readiness::Ready;
    }
    let Some(detail) = detail else {
        return Readiness::Blocked(TestingBlocked::NoSampleGenerated);
    };
    if detail.samples.is_empty() {
        return Readiness::Blocked(TestingBlocked::NoSampleGenerated);
    }
    match &detail.snapshot {
        Some(snapshot) if snapshot.status == SnapshotStatus::Frozen => Readiness::Ready,
        _ => Readiness::Blocked(TestingBlocked::PopulationNotFrozen),
    }
}
