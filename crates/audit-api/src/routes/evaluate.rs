//! # Stateless Evaluation API
//!
//! Runs the pure engines over request bodies without touching the store.
//!
//! ## Endpoints
//!
//! - `POST /v1/evaluate/sample`: resolve one sample against a procedure
//! - `POST /v1/evaluate/aggregate`: summarise sample statuses and conclude
//! - `POST /v1/evaluate/engagement-status`: roll up control statuses
//! - `POST /v1/evaluate/matrix`: validate matrix rows

use audit_state::{
    count_ineffective, derive_engagement_status, validate_rows, ControlStatus, EngagementStatus,
    RiskControlRow, ValidationReport,
};
use audit_testing::{
    aggregate, Conclusion, ConclusionRule, RuleExecution, SampleFinalStatus, SampleInputs,
    SampleProgress, SampleRecord, SystemResult, TestProcedure, TestingSummary,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

/// One sample with its procedure and any auditor input.
#[derive(Debug, Deserialize)]
pub struct EvaluateSampleRequest {
    pub sample: SampleRecord,
    pub procedure: TestProcedure,
    /// Absent for a sample the auditor never opened.
    #[serde(default)]
    pub inputs: Option<SampleInputs>,
    #[serde(default)]
    pub final_decision: Option<SystemResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluateSampleResponse {
    pub status: SampleFinalStatus,
    pub system_result: SystemResult,
    pub executions: Vec<RuleExecution>,
}

#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    pub statuses: Vec<SampleFinalStatus>,
    /// Defaults to the configured rule.
    #[serde(default)]
    pub rule: Option<ConclusionRule>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub summary: TestingSummary,
    pub samples_tested: SampleProgress,
    pub failure_rate: f64,
    /// Present only when every sample is tested.
    pub conclusion: Option<Conclusion>,
}

/// Status and conclusion of one control, as input to the roll-up.
#[derive(Debug, Deserialize)]
pub struct ControlStatusInput {
    pub status: ControlStatus,
    #[serde(default)]
    pub conclusion: Option<Conclusion>,
}

#[derive(Debug, Deserialize)]
pub struct EngagementStatusRequest {
    pub controls: Vec<ControlStatusInput>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EngagementStatusResponse {
    pub status: EngagementStatus,
    pub total_deficiencies: u32,
}

#[derive(Debug, Deserialize)]
pub struct ValidateMatrixRequest {
    pub rows: Vec<RiskControlRow>,
}

impl Validate for ValidateMatrixRequest {
    fn validate(&self) -> Result<(), String> {
        let mut ids: Vec<u32> = self.rows.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err("row ids must be unique".to_string());
        }
        Ok(())
    }
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/evaluate/sample", post(evaluate_sample))
        .route("/v1/evaluate/aggregate", post(aggregate_statuses))
        .route("/v1/evaluate/engagement-status", post(engagement_status))
        .route("/v1/evaluate/matrix", post(validate_matrix))
}

// ── Handlers ────────────────────────────────────────────────────────

async fn evaluate_sample(
    body: Result<Json<EvaluateSampleRequest>, JsonRejection>,
) -> Result<Json<EvaluateSampleResponse>, AppError> {
    let req = extract_json(body)?;
    let status = req
        .procedure
        .resolve(&req.sample, req.inputs.as_ref(), req.final_decision);
    Ok(Json(EvaluateSampleResponse {
        status,
        system_result: req.procedure.system_result(&req.sample),
        executions: req.procedure.executions(&req.sample),
    }))
}

async fn aggregate_statuses(
    State(state): State<AppState>,
    body: Result<Json<AggregateRequest>, JsonRejection>,
) -> Result<Json<AggregateResponse>, AppError> {
    let req = extract_json(body)?;
    let rule = req.rule.unwrap_or(state.config.conclusion_rule);
    let summary = aggregate(&req.statuses);
    Ok(Json(AggregateResponse {
        summary,
        samples_tested: summary.progress(),
        failure_rate: summary.failure_rate(),
        conclusion: summary.conclude(rule).ok(),
    }))
}

async fn engagement_status(
    body: Result<Json<EngagementStatusRequest>, JsonRejection>,
) -> Result<Json<EngagementStatusResponse>, AppError> {
    let req = extract_json(body)?;
    let statuses: Vec<ControlStatus> = req.controls.iter().map(|c| c.status).collect();
    let total_deficiencies = count_ineffective(req.controls.iter().map(|c| c.conclusion));
    Ok(Json(EngagementStatusResponse {
        status: derive_engagement_status(&statuses),
        total_deficiencies,
    }))
}

async fn validate_matrix(
    body: Result<Json<ValidateMatrixRequest>, JsonRejection>,
) -> Result<Json<ValidationReport>, AppError> {
    let req = extract_validated_json(body)?;
    Ok(Json(validate_rows(&req.rows)))
}
