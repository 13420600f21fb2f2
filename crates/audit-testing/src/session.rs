//! # Testing Session
//!
//! The auditor's workspace for one control: inputs per (sample, rule),
//! final per-sample decisions and evidence labels. Every status and count
//! is derived from this state on read; nothing derived is stored.
//!
//! Opening a sample ([`TestingSession::visit_sample`]) materialises a
//! default input for each rule. That alone moves the sample out of
//! NOT TESTED without changing any result.
//!
//! Once the control is submitted the session is locked and rejects input.

use std::collections::BTreeMap;

use audit_core::SampleId;
use serde::{Deserialize, Serialize};

use crate::detail::ControlFullDetail;
use crate::error::TestingError;
use crate::evaluate::{RuleExecution, SystemResult};
use crate::resolve::{AuditorRuleInput, SampleFinalStatus, SampleInputs};
use crate::summary::{aggregate, TestingSummary};

// ─── Evidence ────────────────────────────────────────────────────────

/// Opaque label returned by the evidence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceLabel(pub String);

impl EvidenceLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EvidenceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file handed over by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl FileHandle {
    pub fn named(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            size_bytes: None,
        }
    }
}

/// What evidence is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum EvidenceTarget {
    /// The sample as a whole.
    Sample { sample_id: SampleId },
    /// One rule of one sample.
    Rule { sample_id: SampleId, rule_id: u32 },
}

impl EvidenceTarget {
    pub fn sample_id(&self) -> &SampleId {
        match self {
            Self::Sample { sample_id } | Self::Rule { sample_id, .. } => sample_id,
        }
    }
}

/// Collaborator that stores evidence files and returns a label for them.
pub trait EvidenceStore {
    fn attach(&self, target: &EvidenceTarget, file: &FileHandle) -> Result<EvidenceLabel, TestingError>;
}

/// Evidence store that keeps nothing and labels files by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileNameEvidenceStore;

impl EvidenceStore for FileNameEvidenceStore {
    fn attach(&self, _target: &EvidenceTarget, file: &FileHandle) -> Result<EvidenceLabel, TestingError> {
        let name = file.file_name.trim();
        if name.is_empty() {
            return Err(TestingError::Evidence("file name is empty".to_string()));
        }
        Ok(EvidenceLabel::new(name))
    }
}

// ─── Inputs ──────────────────────────────────────────────────────────

/// Partial update of one auditor input. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputUpdate {
    /// `Some(None)` clears an override; `None` leaves it unchanged.
    #[serde(default, rename = "override", with = "audit_core::double_option")]
    pub override_result: Option<Option<SystemResult>>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub evidence: Option<EvidenceLabel>,
}

impl InputUpdate {
    /// Set the override.
    pub fn override_with(result: SystemResult) -> Self {
        Self {
            override_result: Some(Some(result)),
            ..Self::default()
        }
    }

    /// Clear the override.
    pub fn clear_override() -> Self {
        Self {
            override_result: Some(None),
            ..Self::default()
        }
    }

    fn apply(self, input: &mut AuditorRuleInput) {
        if let Some(o) = self.override_result {
            input.override_result = o;
        }
        if let Some(comment) = self.comment {
            input.comment = comment;
        }
        if let Some(evidence) = self.evidence {
            input.evidence = Some(evidence);
        }
    }
}

// ─── Session ─────────────────────────────────────────────────────────

/// Mutable testing state for one control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestingSession {
    detail: ControlFullDetail,
    inputs: BTreeMap<SampleId, SampleInputs>,
    final_decisions: BTreeMap<SampleId, SystemResult>,
    sample_evidence: BTreeMap<SampleId, Vec<EvidenceLabel>>,
    locked: bool,
}

impl TestingSession {
    /// A fresh session: every sample NOT TESTED.
    pub fn new(detail: ControlFullDetail) -> Self {
        Self {
            detail,
            inputs: BTreeMap::new(),
            final_decisions: BTreeMap::new(),
            sample_evidence: BTreeMap::new(),
            locked: false,
        }
    }

    pub fn control_code(&self) -> &str {
        &self.detail.overview.control_code
    }

    pub fn detail(&self) -> &ControlFullDetail {
        &self.detail
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Stop accepting input.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Lock the session for submission and take the summary it is
    /// submitted with, in one step. Refused if already locked.
    pub fn seal(&mut self) -> Result<TestingSummary, TestingError> {
        self.ensure_unlocked()?;
        self.locked = true;
        Ok(self.summary())
    }

    /// Accept input again, after a reviewer sends the control back.
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Auditor inputs for a sample, if it was ever opened.
    pub fn inputs(&self, sample_id: &SampleId) -> Option<&SampleInputs> {
        self.inputs.get(sample_id)
    }

    pub fn final_decision(&self, sample_id: &SampleId) -> Option<SystemResult> {
        self.final_decisions.get(sample_id).copied()
    }

    pub fn sample_evidence(&self, sample_id: &SampleId) -> &[EvidenceLabel] {
        self.sample_evidence
            .get(sample_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn ensure_unlocked(&self) -> Result<(), TestingError> {
        if self.locked {
            return Err(TestingError::SessionLocked {
                control_code: self.control_code().to_string(),
            });
        }
        Ok(())
    }

    fn ensure_sample(&self, sample_id: &SampleId) -> Result<(), TestingError> {
        if self.detail.sample(sample_id).is_none() {
            return Err(TestingError::UnknownSample(sample_id.clone()));
        }
        Ok(())
    }

    /// Open a sample, creating a default input for every rule not yet seen.
    pub fn visit_sample(&mut self, sample_id: &SampleId) -> Result<&SampleInputs, TestingError> {
        self.ensure_unlocked()?;
        self.ensure_sample(sample_id)?;
        let ids = self.detail.procedure.check_ids();
        let inputs = self.inputs.entry(sample_id.clone()).or_default();
        for id in ids {
            inputs.entry(id).or_default();
        }
        Ok(&*inputs)
    }

    /// Apply a partial update to one rule's input. Opens the sample first.
    pub fn record_input(
        &mut self,
        sample_id: &SampleId,
        rule_id: u32,
        update: InputUpdate,
    ) -> Result<&AuditorRuleInput, TestingError> {
        self.ensure_unlocked()?;
        self.ensure_sample(sample_id)?;
        if !self.detail.procedure.check_ids().contains(&rule_id) {
            return Err(TestingError::UnknownRule(rule_id));
        }
        self.visit_sample(sample_id)?;
        let input = self
            .inputs
            .get_mut(sample_id)
            .and_then(|inputs| inputs.get_mut(&rule_id))
            .ok_or(TestingError::UnknownRule(rule_id))?;
        update.apply(input);
        Ok(&*input)
    }

    /// Attach evidence through the collaborator and store its label.
    pub fn attach_evidence(
        &mut self,
        store: &dyn EvidenceStore,
        target: EvidenceTarget,
        file: &FileHandle,
    ) -> Result<EvidenceLabel, TestingError> {
        self.ensure_unlocked()?;
        self.ensure_sample(target.sample_id())?;
        if let EvidenceTarget::Rule { rule_id, .. } = &target {
            if !self.detail.procedure.check_ids().contains(rule_id) {
                return Err(TestingError::UnknownRule(*rule_id));
            }
        }

        let label = store.attach(&target, file)?;
        match target {
            EvidenceTarget::Sample { sample_id } => {
                self.sample_evidence
                    .entry(sample_id)
                    .or_default()
                    .push(label.clone());
            }
            EvidenceTarget::Rule { sample_id, rule_id } => {
                let update = InputUpdate {
                    evidence: Some(label.clone()),
                    ..InputUpdate::default()
                };
                self.record_input(&sample_id, rule_id, update)?;
            }
        }
        Ok(label)
    }

    /// Record the auditor's final decision for a sample.
    pub fn set_final_decision(
        &mut self,
        sample_id: &SampleId,
        decision: SystemResult,
    ) -> Result<(), TestingError> {
        self.ensure_unlocked()?;
        self.ensure_sample(sample_id)?;
        self.final_decisions.insert(sample_id.clone(), decision);
        Ok(())
    }

    /// Remove the final decision, falling back to rule resolution.
    pub fn clear_final_decision(&mut self, sample_id: &SampleId) -> Result<(), TestingError> {
        self.ensure_unlocked()?;
        self.ensure_sample(sample_id)?;
        self.final_decisions.remove(sample_id);
        Ok(())
    }

    /// Resolved status of one sample.
    pub fn sample_status(&self, sample_id: &SampleId) -> Result<SampleFinalStatus, TestingError> {
        let sample = self
            .detail
            .sample(sample_id)
            .ok_or_else(|| TestingError::UnknownSample(sample_id.clone()))?;
        let status = self.detail.procedure.resolve(
            sample,
            self.inputs.get(sample_id),
            self.final_decision(sample_id),
        );
        Ok(status)
    }

    /// Resolved status of every sample, in sample order.
    pub fn sample_statuses(&self) -> Vec<(SampleId, SampleFinalStatus)> {
        self.detail
            .samples
            .iter()
            .filter_map(|s| {
                self.sample_status(&s.sample_id)
                    .ok()
                    .map(|status| (s.sample_id.clone(), status))
            })
            .collect()
    }

    /// Aggregated counts over every sample.
    pub fn summary(&self) -> TestingSummary {
        let statuses: Vec<SampleFinalStatus> =
            self.sample_statuses().into_iter().map(|(_, s)| s).collect();
        aggregate(&statuses)
    }

    /// Per-rule system results for one sample.
    pub fn rule_executions(&self, sample_id: &SampleId) -> Result<Vec<RuleExecution>, TestingError> {
        let sample = self
            .detail
            .sample(sample_id)
            .ok_or_else(|| TestingError::UnknownSample(sample_id.clone()))?;
        let executions = self.detail.procedure.executions(sample);
        Ok(executions)
    }
}
