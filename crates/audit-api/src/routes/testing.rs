//! # Testing Session API
//!
//! The auditor's workspace for a control that is in testing. All under
//! `/v1/engagements/{id}/controls/{cid}/testing`:
//!
//! - `GET`: every sample with its resolved status, rule executions and
//!   inputs, plus the aggregated summary
//! - `PUT /samples/{sample_id}`: open a sample
//! - `PUT /samples/{sample_id}/rules/{rule_id}`: update one rule input
//! - `PUT /samples/{sample_id}/decision`: set or clear the final decision
//! - `POST /samples/{sample_id}/evidence`: attach evidence
//!
//! Writes are accepted only while the control is In Testing and its
//! session is unlocked, and never on a closed engagement.

use audit_core::{ControlId, EngagementId, SampleId};
use audit_state::{ControlStatus, EngagementError};
use audit_testing::{
    EvidenceLabel, EvidenceTarget, FileHandle, InputUpdate, RuleExecution, SampleFinalStatus,
    SampleInputs, SampleProgress, SystemResult, TestingError, TestingSession, TestingSummary,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::extractors::{extract_json, RequestActor};
use crate::routes::controls::find_control;
use crate::routes::engagements::engagement_not_found;
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

/// One sample as shown in the testing workspace.
#[derive(Debug, Serialize, Deserialize)]
pub struct SampleView {
    pub sample_id: SampleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_identifier_label: Option<String>,
    pub status: SampleFinalStatus,
    pub system_result: SystemResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_decision: Option<SystemResult>,
    /// Absent until the sample is opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<SampleInputs>,
    pub executions: Vec<RuleExecution>,
    #[serde(default)]
    pub evidence: Vec<EvidenceLabel>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestingView {
    pub control_code: String,
    pub locked: bool,
    pub summary: TestingSummary,
    pub samples_tested: SampleProgress,
    pub samples: Vec<SampleView>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    /// `null` clears the decision.
    #[serde(default)]
    pub decision: Option<SystemResult>,
}

#[derive(Debug, Deserialize)]
pub struct EvidenceRequest {
    /// Attach to one rule; absent attaches to the sample.
    #[serde(default)]
    pub rule_id: Option<u32>,
    pub file_name: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvidenceResponse {
    pub label: EvidenceLabel,
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    const BASE: &str = "/v1/engagements/{id}/controls/{cid}/testing";
    Router::new()
        .route(BASE, get(get_testing))
        .route(&format!("{BASE}/samples/{{sample_id}}"), put(open_sample))
        .route(
            &format!("{BASE}/samples/{{sample_id}}/rules/{{rule_id}}"),
            put(update_input),
        )
        .route(&format!("{BASE}/samples/{{sample_id}}/decision"), put(set_decision))
        .route(&format!("{BASE}/samples/{{sample_id}}/evidence"), post(attach_evidence))
}

// ── Helpers ─────────────────────────────────────────────────────────

fn parse_sample_id(raw: String) -> Result<SampleId, AppError> {
    SampleId::parse(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

fn no_session(control_id: ControlId) -> AppError {
    AppError::NotFound(format!("no testing session for {control_id}"))
}

/// Apply a session write for a control of an open engagement.
fn with_session<R>(
    state: &AppState,
    engagement_id: EngagementId,
    control_id: ControlId,
    f: impl FnOnce(&mut TestingSession) -> Result<R, TestingError>,
) -> Result<R, AppError> {
    let engagement = state
        .engagements
        .get(&engagement_id)
        .ok_or_else(|| engagement_not_found(engagement_id))?;
    let control = engagement
        .control(control_id)
        .ok_or(EngagementError::UnknownControl(control_id))?;
    if engagement.is_closed() {
        return Err(EngagementError::Closed(engagement_id).into());
    }
    if control.status != ControlStatus::InTesting {
        return Err(AppError::Conflict(format!(
            "control {control_id} is {}, not {}",
            control.status,
            ControlStatus::InTesting
        )));
    }
    let result = state
        .sessions
        .try_update(&control_id, f)
        .ok_or_else(|| no_session(control_id))??;
    Ok(result)
}

fn sample_view(session: &TestingSession, sample_id: &SampleId) -> Result<SampleView, AppError> {
    let detail = session.detail();
    let sample = detail
        .sample(sample_id)
        .ok_or_else(|| TestingError::UnknownSample(sample_id.clone()))?;
    Ok(SampleView {
        sample_id: sample.sample_id.clone(),
        primary_identifier: sample.primary_identifier.clone(),
        primary_identifier_label: sample.primary_identifier_label.clone(),
        status: session.sample_status(sample_id)?,
        system_result: detail.procedure.system_result(sample),
        final_decision: session.final_decision(sample_id),
        inputs: session.inputs(sample_id).cloned(),
        executions: session.rule_executions(sample_id)?,
        evidence: session.sample_evidence(sample_id).to_vec(),
    })
}

// ── Handlers ────────────────────────────────────────────────────────

async fn get_testing(
    State(state): State<AppState>,
    Path((id, cid)): Path<(Uuid, Uuid)>,
) -> Result<Json<TestingView>, AppError> {
    let control_id = ControlId::from(cid);
    find_control(&state, id.into(), control_id)?;
    let session = state
        .sessions
        .get(&control_id)
        .ok_or_else(|| no_session(control_id))?;

    let samples = session
        .detail()
        .samples
        .iter()
        .map(|s| sample_view(&session, &s.sample_id))
        .collect::<Result<Vec<_>, _>>()?;
    let summary = session.summary();
    Ok(Json(TestingView {
        control_code: session.control_code().to_string(),
        locked: session.is_locked(),
        summary,
        samples_tested: summary.progress(),
        samples,
    }))
}

async fn open_sample(
    State(state): State<AppState>,
    Path((id, cid, sample_id)): Path<(Uuid, Uuid, String)>,
) -> Result<Json<SampleView>, AppError> {
    let sample_id = parse_sample_id(sample_id)?;
    with_session(&state, id.into(), cid.into(), |s| {
        s.visit_sample(&sample_id)?;
        Ok(sample_view(s, &sample_id))
    })?
    .map(Json)
}

async fn update_input(
    State(state): State<AppState>,
    Path((id, cid, sample_id, rule_id)): Path<(Uuid, Uuid, String, u32)>,
    RequestActor(actor): RequestActor,
    body: Result<Json<InputUpdate>, JsonRejection>,
) -> Result<Json<SampleView>, AppError> {
    let update = extract_json(body)?;
    let sample_id = parse_sample_id(sample_id)?;
    let view = with_session(&state, id.into(), cid.into(), |s| {
        s.record_input(&sample_id, rule_id, update)?;
        Ok(sample_view(s, &sample_id))
    })??;
    tracing::debug!(sample_id = %sample_id, rule_id, actor = %actor, "auditor input recorded");
    Ok(Json(view))
}

async fn set_decision(
    State(state): State<AppState>,
    Path((id, cid, sample_id)): Path<(Uuid, Uuid, String)>,
    RequestActor(actor): RequestActor,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<SampleView>, AppError> {
    let req = extract_json(body)?;
    let sample_id = parse_sample_id(sample_id)?;
    let view = with_session(&state, id.into(), cid.into(), |s| {
        match req.decision {
            Some(decision) => s.set_final_decision(&sample_id, decision)?,
            None => s.clear_final_decision(&sample_id)?,
        }
        Ok(sample_view(s, &sample_id))
    })??;
    tracing::debug!(sample_id = %sample_id, decision = ?req.decision, actor = %actor, "final decision recorded");
    Ok(Json(view))
}

async fn attach_evidence(
    State(state): State<AppState>,
    Path((id, cid, sample_id)): Path<(Uuid, Uuid, String)>,
    RequestActor(actor): RequestActor,
    body: Result<Json<EvidenceRequest>, JsonRejection>,
) -> Result<Json<EvidenceResponse>, AppError> {
    let req = extract_json(body)?;
    let sample_id = parse_sample_id(sample_id)?;
    let target = match req.rule_id {
        Some(rule_id) => EvidenceTarget::Rule {
            sample_id: sample_id.clone(),
            rule_id,
        },
        None => EvidenceTarget::Sample {
            sample_id: sample_id.clone(),
        },
    };
    let file = FileHandle {
        file_name: req.file_name,
        size_bytes: req.size_bytes,
    };
    let store = state.evidence.clone();
    let label = with_session(&state, id.into(), cid.into(), |s| {
        s.attach_evidence(store.as_ref(), target, &file)
    })?;
    tracing::info!(sample_id = %sample_id, label = %label, actor = %actor, "evidence attached");
    Ok(Json(EvidenceResponse { label }))
}
