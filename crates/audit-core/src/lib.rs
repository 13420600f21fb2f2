//! # audit-core: Foundational Types for the Audit Engagement Stack
//!
//! Defines the primitives every other crate in the workspace builds on.
//! It depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `MatrixId`, `EngagementId`,
//!    `ControlId`, `DeficiencyId`, `RiskId`, `SampleId`. You cannot pass a
//!    matrix identifier where an engagement identifier is expected.
//!
//! 2. **UTC-only timestamps.** [`Timestamp`] is UTC, truncated to seconds,
//!    rendered as `YYYY-MM-DDTHH:MM:SSZ`. The `display_date()` rendering
//!    (`15 Oct 2025`) is what the workspace shows for "last updated".
//!
//! 3. **Collaborators behind traits.** The time source ([`Clock`]) is a trait
//!    so state transitions can be stamped deterministically in tests.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `audit-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod double_option;
pub mod error;
pub mod identity;
pub mod temporal;

pub use error::{AuditError, FieldError, FormErrors};
pub use identity::{Actor, ControlId, DeficiencyId, EngagementId, MatrixId, RiskId, SampleId};
pub use temporal::{Clock, FixedClock, SystemClock, Timestamp};
