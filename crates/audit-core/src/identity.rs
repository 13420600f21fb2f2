//! # Domain Identity Newtypes
//!
//! Newtype wrappers for the identifiers of the audit domain. Entity
//! identifiers (matrices, engagements, controls, deficiencies) are random
//! UUIDs; business keys supplied by auditors (risk identifiers, sample
//! identifiers) are validated strings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuditError;

/// Unique identifier for a Risk & Control Matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatrixId(pub Uuid);

/// Unique identifier for an audit engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngagementId(pub Uuid);

/// Unique identifier for a control instance inside one engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControlId(pub Uuid);

/// Unique identifier for a deficiency raised against a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeficiencyId(pub Uuid);

macro_rules! uuid_id {
    ($name:ident, $prefix:literal) => {
        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_id!(MatrixId, "matrix");
uuid_id!(EngagementId, "engagement");
uuid_id!(ControlId, "control");
uuid_id!(DeficiencyId, "deficiency");

/// Risk identifier as entered in a matrix (e.g. `R-1`).
///
/// Groups matrix rows: several controls may mitigate the same risk. An
/// empty risk identifier is representable because draft rows start blank;
/// validation reports it as a missing field. Deserialized values are
/// trimmed the same way as [`RiskId::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub struct RiskId(pub String);

impl RiskId {
    /// Wrap a risk identifier, trimming surrounding whitespace.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    /// Whether the identifier is blank.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RiskId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<RiskId> for String {
    fn from(id: RiskId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RiskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one sample record drawn from a population (e.g. `PR-S01`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(pub String);

impl SampleId {
    /// Create a sample identifier, rejecting blank values.
    pub fn parse(value: impl Into<String>) -> Result<Self, AuditError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AuditError::Validation(
                "sample identifier must not be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The user performing an action (the `currentActor()` collaborator result).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(pub String);

impl Actor {
    /// Create an actor from a display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The actor's display name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
