//! # Control Lifecycle API
//!
//! Drives one control of an engagement through
//! `Not Started → Planning → In Testing → Pending Review → Concluded`.
//!
//! ## Endpoints
//!
//! All under `/v1/engagements/{id}/controls/{cid}`:
//!
//! - `GET`: the control as presented
//! - `GET /readiness`: whether testing may start, and why not
//! - `POST /upload`: record an ad-hoc sample upload
//! - `POST /plan`, `/start-testing`, `/submit`, `/approve`, `/reject`
//! - `POST /deficiencies`: raise a deficiency during review
//!
//! Committed transitions are logged with `control_id`, `from`, `to` and
//! `actor`, and counted per target status.

use audit_core::{Actor, ControlId, EngagementId};
use audit_state::{
    ControlError, Deficiency, DeficiencyDraft, EngagementControl, EngagementError,
};
use audit_testing::{check_readiness, Conclusion, Readiness, TestingSession, TestingSummary};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, RequestActor, Validate};
use crate::middleware::metrics::record_transition;
use crate::routes::engagements::engagement_not_found;
use crate::state::{AdhocUpload, AppState};

// ── Request/Response DTOs ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub file_name: String,
}

impl Validate for UploadRequest {
    fn validate(&self) -> Result<(), String> {
        if self.file_name.trim().is_empty() {
            return Err("file_name must not be empty".to_string());
        }
        Ok(())
    }
}

impl Validate for DeficiencyDraft {
    fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("description must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub conclusion: Conclusion,
    pub summary: TestingSummary,
    pub control: EngagementControl,
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    const BASE: &str = "/v1/engagements/{id}/controls/{cid}";
    Router::new()
        .route(BASE, get(get_control))
        .route(&format!("{BASE}/readiness"), get(readiness))
        .route(&format!("{BASE}/upload"), post(upload_samples))
        .route(&format!("{BASE}/plan"), post(plan))
        .route(&format!("{BASE}/start-testing"), post(start_testing))
        .route(&format!("{BASE}/submit"), post(submit))
        .route(&format!("{BASE}/approve"), post(approve))
        .route(&format!("{BASE}/reject"), post(reject))
        .route(&format!("{BASE}/deficiencies"), post(flag_deficiency))
}

// ── Helpers ─────────────────────────────────────────────────────────

fn ids((id, cid): (Uuid, Uuid)) -> (EngagementId, ControlId) {
    (EngagementId::from(id), ControlId::from(cid))
}

/// The stored control record.
pub(crate) fn find_control(
    state: &AppState,
    engagement_id: EngagementId,
    control_id: ControlId,
) -> Result<EngagementControl, AppError> {
    let engagement = state
        .engagements
        .get(&engagement_id)
        .ok_or_else(|| engagement_not_found(engagement_id))?;
    engagement
        .control(control_id)
        .cloned()
        .ok_or_else(|| EngagementError::UnknownControl(control_id).into())
}

/// Run a control operation under the engagement's write lock. The
/// operation either commits whole or leaves the control untouched.
fn transition<R>(
    state: &AppState,
    engagement_id: EngagementId,
    control_id: ControlId,
    actor: &Actor,
    f: impl FnOnce(&mut EngagementControl) -> Result<R, ControlError>,
) -> Result<(R, EngagementControl), AppError> {
    let (result, from, control) = state
        .engagements
        .try_update(&engagement_id, |e| {
            let control = e.control_mut(control_id)?;
            let from = control.status;
            let result = f(control)?;
            Ok::<_, EngagementError>((result, from, control.clone()))
        })
        .ok_or_else(|| engagement_not_found(engagement_id))??;

    if from != control.status {
        tracing::info!(
            control_id = %control_id,
            from = %from,
            to = %control.status,
            actor = %actor,
            "control transition"
        );
        record_transition(&control.status.to_string());
    }
    Ok((result, control))
}

fn current_readiness(state: &AppState, control: &EngagementControl) -> Readiness {
    let detail = state.catalog.lookup(&control.control_code);
    check_readiness(detail.as_ref(), state.uploads.contains(&control.id))
}

// ── Handlers ────────────────────────────────────────────────────────

async fn get_control(
    State(state): State<AppState>,
    Path(path): Path<(Uuid, Uuid)>,
) -> Result<Json<EngagementControl>, AppError> {
    let (engagement_id, control_id) = ids(path);
    let engagement = state
        .engagements
        .get(&engagement_id)
        .ok_or_else(|| engagement_not_found(engagement_id))?;
    engagement
        .display_controls()
        .into_iter()
        .find(|c| c.id == control_id)
        .map(Json)
        .ok_or_else(|| EngagementError::UnknownControl(control_id).into())
}

async fn readiness(
    State(state): State<AppState>,
    Path(path): Path<(Uuid, Uuid)>,
) -> Result<Json<Readiness>, AppError> {
    let (engagement_id, control_id) = ids(path);
    let control = find_control(&state, engagement_id, control_id)?;
    Ok(Json(current_readiness(&state, &control)))
}

async fn upload_samples(
    State(state): State<AppState>,
    Path(path): Path<(Uuid, Uuid)>,
    RequestActor(actor): RequestActor,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AdhocUpload>), AppError> {
    let req = extract_validated_json(body)?;
    let (engagement_id, control_id) = ids(path);
    state
        .engagements
        .try_update(&engagement_id, |e| e.control_mut(control_id).map(|_| ()))
        .ok_or_else(|| engagement_not_found(engagement_id))??;

    let upload = AdhocUpload {
        file_name: req.file_name.trim().to_string(),
        uploaded_by: actor,
        uploaded_at: state.now(),
    };
    state.uploads.insert(control_id, upload.clone());
    tracing::info!(control_id = %control_id, file = %upload.file_name, "ad-hoc samples uploaded");
    Ok((StatusCode::CREATED, Json(upload)))
}

async fn plan(
    State(state): State<AppState>,
    Path(path): Path<(Uuid, Uuid)>,
    RequestActor(actor): RequestActor,
) -> Result<Json<EngagementControl>, AppError> {
    let (engagement_id, control_id) = ids(path);
    let now = state.now();
    let ((), control) = transition(&state, engagement_id, control_id, &actor, |c| c.plan(&actor, now))?;
    Ok(Json(control))
}

async fn start_testing(
    State(state): State<AppState>,
    Path(path): Path<(Uuid, Uuid)>,
    RequestActor(actor): RequestActor,
) -> Result<Json<EngagementControl>, AppError> {
    let (engagement_id, control_id) = ids(path);
    let stored = find_control(&state, engagement_id, control_id)?;
    let detail = state.catalog.lookup(&stored.control_code);
    let readiness = check_readiness(detail.as_ref(), state.uploads.contains(&control_id));
    let now = state.now();

    let ((), control) = transition(&state, engagement_id, control_id, &actor, |c| {
        c.start_testing(readiness, &actor, now)
    })?;

    if state.sessions.contains(&control_id) {
        state.sessions.update(&control_id, TestingSession::unlock);
    } else if let Some(detail) = detail {
        state.sessions.insert(control_id, TestingSession::new(detail));
    }
    Ok(Json(control))
}

async fn submit(
    State(state): State<AppState>,
    Path(path): Path<(Uuid, Uuid)>,
    RequestActor(actor): RequestActor,
) -> Result<Json<SubmitResponse>, AppError> {
    let (engagement_id, control_id) = ids(path);
    // freeze inputs before the control moves; unfrozen again if it cannot
    let summary = state
        .sessions
        .try_update(&control_id, TestingSession::seal)
        .ok_or_else(|| AppError::Conflict(format!("no testing session for {control_id}")))??;
    let rule = state.config.conclusion_rule;
    let now = state.now();

    let submitted = transition(&state, engagement_id, control_id, &actor, |c| {
        c.submit_for_review(&summary, rule, &actor, now)
    });
    let (conclusion, control) = match submitted {
        Ok(submitted) => submitted,
        Err(err) => {
            state.sessions.update(&control_id, TestingSession::unlock);
            return Err(err);
        }
    };

    Ok(Json(SubmitResponse {
        conclusion,
        summary,
        control,
    }))
}

async fn approve(
    State(state): State<AppState>,
    Path(path): Path<(Uuid, Uuid)>,
    RequestActor(actor): RequestActor,
) -> Result<Json<EngagementControl>, AppError> {
    let (engagement_id, control_id) = ids(path);
    let rule = state.config.conclusion_rule;
    let now = state.now();
    let (_, control) = transition(&state, engagement_id, control_id, &actor, |c| {
        c.approve(rule, &actor, now)
    })?;
    Ok(Json(control))
}

async fn reject(
    State(state): State<AppState>,
    Path(path): Path<(Uuid, Uuid)>,
    RequestActor(actor): RequestActor,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<EngagementControl>, AppError> {
    let req = extract_json(body)?;
    let (engagement_id, control_id) = ids(path);
    let now = state.now();
    let ((), control) = transition(&state, engagement_id, control_id, &actor, |c| {
        c.reject(&req.reason, &actor, now)
    })?;
    state.sessions.update(&control_id, TestingSession::unlock);
    Ok(Json(control))
}

async fn flag_deficiency(
    State(state): State<AppState>,
    Path(path): Path<(Uuid, Uuid)>,
    RequestActor(actor): RequestActor,
    body: Result<Json<DeficiencyDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Deficiency>), AppError> {
    let draft = extract_validated_json(body)?;
    let (engagement_id, control_id) = ids(path);
    let now = state.now();
    let (deficiency, _) = transition(&state, engagement_id, control_id, &actor, |c| {
        c.flag_deficiency(draft, &actor, now)
    })?;
    state.deficiencies.insert(deficiency.id, deficiency.clone());
    tracing::info!(
        control_id = %control_id,
        deficiency_id = %deficiency.id,
        actor = %actor,
        "deficiency raised"
    );
    Ok((StatusCode::CREATED, Json(deficiency)))
}
