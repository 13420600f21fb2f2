//! # audit-testing: Control-Testing Evaluation Engine
//!
//! The testing pipeline of an audit engagement, leaves first:
//!
//! ```text
//! rule evaluation ──▶ sample status resolution ──▶ testing aggregation
//!   (evaluate.rs)         (resolve.rs)                (summary.rs)
//! ```
//!
//! - **Rules** (`rule.rs`): declarative test-script rules (field, operator,
//!   expected value) and legacy attribute predicates, both plain data. There
//!   is no embedded executable logic in reference data; operators are a
//!   closed enum interpreted by [`evaluate`].
//!
//! - **Evaluation** (`evaluate.rs`): pure, deterministic `sample × rule →
//!   SystemResult`. Safe to re-run after every auditor edit.
//!
//! - **Resolution** (`resolve.rs`): folds system results and auditor
//!   overrides into one [`SampleFinalStatus`] with fixed precedence.
//!
//! - **Aggregation** (`summary.rs`): counts per-sample statuses into a
//!   [`TestingSummary`] and derives the control [`Conclusion`].
//!
//! - **Reference data** (`detail.rs`): the read-only [`ControlFullDetail`]
//!   provided by a [`ControlCatalog`], and the readiness gate for entering
//!   testing.
//!
//! - **Session** (`session.rs`): the mutable auditor workspace for one
//!   control (inputs, final decisions, evidence labels).

pub mod detail;
pub mod error;
pub mod evaluate;
pub mod resolve;
pub mod rule;
pub mod sample;
pub mod session;
pub mod summary;

pub use detail::{
    check_readiness, ControlCatalog, ControlFullDetail, ControlOverview, InMemoryCatalog,
    PopulationSnapshot, Readiness, SnapshotStatus, TestProcedure, TestingBlocked,
};
pub use error::TestingError;
pub use evaluate::{evaluate_rule, Check, RuleExecution, SystemResult};
pub use resolve::{
    resolve_legacy_sample, resolve_sample, system_determined_result, AuditorRuleInput,
    SampleFinalStatus, SampleInputs,
};
pub use rule::{Operand, Operator, Predicate, RuleKind, RuleLogic, TestAttribute, TestScript, TestScriptRule};
pub use sample::SampleRecord;
pub use session::{
    EvidenceLabel, EvidenceStore, EvidenceTarget, FileHandle, FileNameEvidenceStore, InputUpdate,
    TestingSession,
};
pub use summary::{aggregate, Conclusion, ConclusionRule, SampleProgress, TestingSummary};
