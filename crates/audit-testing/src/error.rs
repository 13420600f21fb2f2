//! Errors raised while testing a control.

use audit_core::SampleId;
use thiserror::Error;

use crate::detail::TestingBlocked;

/// Failure of a testing-session or aggregation operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TestingError {
    /// The sample is not part of the control's sample set.
    #[error("unknown sample {0}")]
    UnknownSample(SampleId),

    /// The rule or attribute is not part of the control's procedure.
    #[error("unknown rule {0}")]
    UnknownRule(u32),

    /// The session was submitted and no longer accepts input.
    #[error("testing session for {control_code} is locked")]
    SessionLocked {
        /// Control under test.
        control_code: String,
    },

    /// Some samples have not been tested yet.
    #[error("{remaining} sample(s) not tested")]
    NotAllSamplesTested {
        /// Count of samples still NOT TESTED.
        remaining: usize,
    },

    /// Testing cannot start.
    #[error("testing blocked: {0}")]
    Blocked(TestingBlocked),

    /// The evidence collaborator rejected the attachment.
    #[error("evidence attachment failed: {0}")]
    Evidence(String),
}
