//! # audit-state: Audit Engagement State Machines
//!
//! Owns every mutable entity of an audit engagement and the rules for
//! changing it. Derived values (engagement status, deficiency counts) are
//! pure functions over the current entities and are never stored.
//!
//! ## State Machines
//!
//! - **Control** (`control.rs`): `Not Started → Planning → In Testing →
//!   Pending Review → Concluded`, with the reviewer reject edge
//!   `Pending Review → In Testing`. Every transition is gated, stamped and
//!   recorded in the audit trail.
//!
//! - **Engagement** (`engagement.rs`): owns its controls. Status is rolled
//!   up from control statuses with fixed precedence; manual close is a
//!   display projection that can be reopened.
//!
//! - **Risk & Control Matrix** (`matrix.rs`): `Draft → Validated → Locked`.
//!   Any row change while Validated reverts to Draft; locked matrices are
//!   immutable. Row validation lives in `validation.rs`.
//!
//! ## Supporting modules
//!
//! - `deficiency.rs`: reviewer-raised deficiency records.
//! - `navigation.rs`: the selection context passed between screens.

pub mod control;
pub mod deficiency;
pub mod engagement;
pub mod matrix;
pub mod navigation;
pub mod validation;

// ─── Control re-exports ─────────────────────────────────────────────

pub use control::{
    AuditTrailEntry, ControlError, ControlStatus, ControlTransitionRecord, EngagementControl,
    Submission, TrailAction,
};
pub use deficiency::{Deficiency, DeficiencyDraft, Severity};

// ─── Engagement re-exports ──────────────────────────────────────────

pub use engagement::{
    count_deficiencies, count_ineffective, derive_engagement_status, period_label,
    validate_engagement_form, Closure, Engagement, EngagementError, EngagementForm,
    EngagementStatus, EngagementType,
};

// ─── Matrix re-exports ──────────────────────────────────────────────

pub use matrix::{
    validate_matrix_form, Assertion, MatrixError, MatrixForm, MatrixStatus, Publication,
    RiskControlMatrix, RiskControlRow, RowField, RowPatch, DUPLICATE_CONFIGURATION,
};
pub use validation::{validate_rows, ValidationReport, REQUIRED, REVIEW_HIGHLIGHTED};

pub use navigation::{NavCommand, NavigationError, Session, View};
