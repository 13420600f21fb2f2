//! Deficiency records raised by reviewers against a control.

use audit_core::{Actor, ControlId, DeficiencyId, Timestamp};
use serde::{Deserialize, Serialize};

/// How serious a deficiency is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Reviewer input for a new deficiency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeficiencyDraft {
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
}

/// A deficiency raised against a control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deficiency {
    pub id: DeficiencyId,
    pub control_id: ControlId,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    pub created_by: Actor,
    pub created_at: Timestamp,
}

impl Deficiency {
    pub(crate) fn raise(control_id: ControlId, draft: DeficiencyDraft, created_by: Actor, created_at: Timestamp) -> Self {
        Self {
            id: DeficiencyId::new(),
            control_id,
            severity: draft.severity,
            description: draft.description,
            root_cause: draft.root_cause.filter(|c| !c.trim().is_empty()),
            created_by,
            created_at,
        }
    }
}
