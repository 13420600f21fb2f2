//! # Engagement API
//!
//! ## Endpoints
//!
//! - `POST /v1/engagements`: create an engagement (instantiates controls
//!   from the linked matrix)
//! - `GET /v1/engagements`: list engagements (`?active=true` hides closed)
//! - `GET /v1/engagements/{id}`: get an engagement
//! - `POST /v1/engagements/{id}/close`: manual close
//! - `POST /v1/engagements/{id}/reopen`: reopen a closed engagement
//! - `GET /v1/engagements/{id}/controls`: controls as presented
//! - `POST /v1/engagements/{id}/controls`: add a control
//! - `GET /v1/engagements/{id}/deficiencies`: deficiencies raised
//!
//! Every engagement response carries `status` and `total_deficiencies`
//! derived from the controls at read time.

use audit_core::{EngagementId, MatrixId, Timestamp};
use audit_state::{
    Closure, Deficiency, Engagement, EngagementControl, EngagementForm, EngagementStatus,
    EngagementType,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, RequestActor, Validate};
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

/// An engagement with its derived fields.
#[derive(Debug, Serialize, Deserialize)]
pub struct EngagementView {
    pub id: EngagementId,
    pub name: String,
    #[serde(rename = "type")]
    pub engagement_type: EngagementType,
    pub period: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_matrix: Option<MatrixId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_matrix_name: Option<String>,
    pub lead_partner: String,
    pub description: String,
    pub status: EngagementStatus,
    pub total_deficiencies: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure: Option<Closure>,
    pub controls: Vec<EngagementControl>,
    pub created_at: Timestamp,
}

impl From<&Engagement> for EngagementView {
    fn from(e: &Engagement) -> Self {
        Self {
            id: e.id,
            name: e.name.clone(),
            engagement_type: e.engagement_type,
            period: e.period.clone(),
            period_start: e.period_start,
            period_end: e.period_end,
            linked_matrix: e.linked_matrix,
            linked_matrix_name: e.linked_matrix_name.clone(),
            lead_partner: e.lead_partner.clone(),
            description: e.description.clone(),
            status: e.status(),
            total_deficiencies: e.total_deficiencies(),
            closure: e.closure.clone(),
            controls: e.display_controls(),
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub active: Option<bool>,
}

/// A control added to an engagement by hand.
#[derive(Debug, Deserialize)]
pub struct AddControlRequest {
    pub control_code: String,
    pub control_name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub is_key: bool,
    #[serde(default)]
    pub process: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
}

impl Validate for AddControlRequest {
    fn validate(&self) -> Result<(), String> {
        if self.control_code.trim().is_empty() {
            return Err("control_code must not be empty".to_string());
        }
        if self.control_name.trim().is_empty() {
            return Err("control_name must not be empty".to_string());
        }
        Ok(())
    }
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/engagements", get(list_engagements).post(create_engagement))
        .route("/v1/engagements/{id}", get(get_engagement))
        .route("/v1/engagements/{id}/close", post(close_engagement))
        .route("/v1/engagements/{id}/reopen", post(reopen_engagement))
        .route(
            "/v1/engagements/{id}/controls",
            get(list_controls).post(add_control),
        )
        .route("/v1/engagements/{id}/deficiencies", get(list_deficiencies))
}

pub(crate) fn engagement_not_found(id: EngagementId) -> AppError {
    AppError::NotFound(format!("{id} not found"))
}

// ── Handlers ────────────────────────────────────────────────────────

async fn create_engagement(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    body: Result<Json<EngagementForm>, JsonRejection>,
) -> Result<(StatusCode, Json<EngagementView>), AppError> {
    let form = extract_json(body)?;
    let now = state.now();
    let matrices = state.matrices.list();
    let engagement = state.engagements.insert_with(|existing| {
        Engagement::create(form, existing, &matrices, &actor, now).map(|e| (e.id, e))
    })?;
    if let Some(matrix_id) = engagement.linked_matrix {
        state.matrices.update(&matrix_id, |m| m.link_engagement());
    }
    tracing::info!(
        engagement_id = %engagement.id,
        name = %engagement.name,
        controls = engagement.controls.len(),
        actor = %actor,
        "engagement created"
    );
    Ok((StatusCode::CREATED, Json(EngagementView::from(&engagement))))
}

async fn list_engagements(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<EngagementView>> {
    let mut engagements: Vec<Engagement> = state
        .engagements
        .list()
        .into_iter()
        .filter(|e| query.active != Some(true) || e.is_active())
        .collect();
    engagements.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
    Json(engagements.iter().map(EngagementView::from).collect())
}

async fn get_engagement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EngagementView>, AppError> {
    let id = EngagementId::from(id);
    state
        .engagements
        .get(&id)
        .map(|e| Json(EngagementView::from(&e)))
        .ok_or_else(|| engagement_not_found(id))
}

async fn close_engagement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    RequestActor(actor): RequestActor,
) -> Result<Json<EngagementView>, AppError> {
    let id = EngagementId::from(id);
    let now = state.now();
    let engagement = state
        .engagements
        .try_update(&id, |e| e.close(&actor, now).map(|()| e.clone()))
        .ok_or_else(|| engagement_not_found(id))??;
    tracing::info!(engagement_id = %id, actor = %actor, "engagement closed");
    Ok(Json(EngagementView::from(&engagement)))
}

async fn reopen_engagement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    RequestActor(actor): RequestActor,
) -> Result<Json<EngagementView>, AppError> {
    let id = EngagementId::from(id);
    let engagement = state
        .engagements
        .try_update(&id, |e| e.reopen().map(|()| e.clone()))
        .ok_or_else(|| engagement_not_found(id))??;
    tracing::info!(engagement_id = %id, actor = %actor, "engagement reopened");
    Ok(Json(EngagementView::from(&engagement)))
}

async fn list_controls(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EngagementControl>>, AppError> {
    let id = EngagementId::from(id);
    state
        .engagements
        .get(&id)
        .map(|e| Json(e.display_controls()))
        .ok_or_else(|| engagement_not_found(id))
}

async fn add_control(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<AddControlRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EngagementControl>), AppError> {
    let req = extract_validated_json(body)?;
    let id = EngagementId::from(id);
    let mut control = EngagementControl::new(
        req.control_code.trim(),
        req.control_name.trim(),
        req.domain,
        req.is_key,
        state.now(),
    );
    control.process = req.process;
    control.frequency = req.frequency;

    state
        .engagements
        .try_update(&id, |e| e.add_control(control.clone()))
        .ok_or_else(|| engagement_not_found(id))??;
    Ok((StatusCode::CREATED, Json(control)))
}

async fn list_deficiencies(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Deficiency>>, AppError> {
    let id = EngagementId::from(id);
    let engagement = state
        .engagements
        .get(&id)
        .ok_or_else(|| engagement_not_found(id))?;
    let mut deficiencies: Vec<Deficiency> = state
        .deficiencies
        .list()
        .into_iter()
        .filter(|d| engagement.control(d.control_id).is_some())
        .collect();
    deficiencies.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(deficiencies))
}
