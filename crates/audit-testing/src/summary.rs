//! # Control Testing Aggregator
//!
//! Counts per-sample statuses into a [`TestingSummary`] and derives the
//! control [`Conclusion`].
//!
//! By construction `tested == total - not_tested` and
//! `tested == passed + failed + not_applicable`; OVERRIDDEN samples count
//! as passed.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TestingError;
use crate::resolve::SampleFinalStatus;

/// Control-level conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conclusion {
    Effective,
    Ineffective,
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Effective => f.write_str("Effective"),
            Self::Ineffective => f.write_str("Ineffective"),
        }
    }
}

/// How failed samples translate into a conclusion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConclusionRule {
    /// Ineffective when strictly more than 10% of samples failed.
    #[default]
    DeficiencyRate,
    /// Ineffective on any failure.
    ZeroTolerance,
}

impl ConclusionRule {
    /// Conclude from a failure count out of `total` samples.
    pub fn conclude(&self, failed: u32, total: u32) -> Conclusion {
        let ineffective = match self {
            // failed / total > 0.10, kept in integers so 1 of 10 is exactly on the boundary
            Self::DeficiencyRate => u64::from(failed) * 10 > u64::from(total),
            Self::ZeroTolerance => failed > 0,
        };
        if ineffective {
            Conclusion::Ineffective
        } else {
            Conclusion::Effective
        }
    }
}

impl std::fmt::Display for ConclusionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeficiencyRate => f.write_str("deficiency-rate"),
            Self::ZeroTolerance => f.write_str("zero-tolerance"),
        }
    }
}

impl FromStr for ConclusionRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deficiency-rate" => Ok(Self::DeficiencyRate),
            "zero-tolerance" => Ok(Self::ZeroTolerance),
            other => Err(format!(
                "unknown conclusion rule {other:?} (expected deficiency-rate or zero-tolerance)"
            )),
        }
    }
}

/// Aggregated counts for one control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestingSummary {
    pub total: u32,
    pub tested: u32,
    pub passed: u32,
    pub failed: u32,
    pub not_applicable: u32,
    pub not_tested: u32,
}

/// Aggregate sample statuses into a summary.
pub fn aggregate(statuses: &[SampleFinalStatus]) -> TestingSummary {
    let count = |wanted: SampleFinalStatus| statuses.iter().filter(|s| **s == wanted).count() as u32;

    let total = statuses.len() as u32;
    let not_tested = count(SampleFinalStatus::NotTested);
    let tested = total - not_tested;
    let failed = count(SampleFinalStatus::Fail);
    let not_applicable = count(SampleFinalStatus::NotApplicable);

    TestingSummary {
        total,
        tested,
        passed: tested - failed - not_applicable,
        failed,
        not_applicable,
        not_tested,
    }
}

impl TestingSummary {
    /// Whether every sample has been tested.
    pub fn is_complete(&self) -> bool {
        self.not_tested == 0
    }

    /// Conclude the control, refusing while samples remain untested.
    pub fn conclude(&self, rule: ConclusionRule) -> Result<Conclusion, TestingError> {
        if !self.is_complete() {
            return Err(TestingError::NotAllSamplesTested {
                remaining: self.not_tested as usize,
            });
        }
        Ok(rule.conclude(self.failed, self.total))
    }

    /// Failed samples as a percentage of tested samples (0 when none tested).
    pub fn failure_rate(&self) -> f64 {
        if self.tested == 0 {
            0.0
        } else {
            f64::from(self.failed) / f64::from(self.tested) * 100.0
        }
    }

    /// The `tested/total` progress value.
    pub fn progress(&self) -> SampleProgress {
        SampleProgress {
            tested: self.tested,
            total: self.total,
        }
    }
}

// ─── Sample progress ─────────────────────────────────────────────────

/// Samples tested out of total, rendered `tested/total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SampleProgress {
    pub tested: u32,
    pub total: u32,
}

impl SampleProgress {
    /// No samples.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for SampleProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tested, self.total)
    }
}

impl FromStr for SampleProgress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tested, total) = s
            .split_once('/')
            .ok_or_else(|| format!("sample progress must be tested/total, got {s:?}"))?;
        let tested: u32 = tested
            .trim()
            .parse()
            .map_err(|e| format!("invalid tested count in {s:?}: {e}"))?;
        let total: u32 = total
            .trim()
            .parse()
            .map_err(|e| format!("invalid total count in {s:?}: {e}"))?;
        if tested > total {
            return Err(format!("tested exceeds total in {s:?}"));
        }
        Ok(Self { tested, total })
    }
}

impl From<SampleProgress> for String {
    fn from(p: SampleProgress) -> Self {
        p.to_string()
    }
}

impl TryFrom<String> for SampleProgress {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
