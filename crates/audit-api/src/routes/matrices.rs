//! # Risk & Control Matrix API
//!
//! ## Endpoints
//!
//! - `POST /v1/matrices`: create a matrix (Draft, `v1.0`)
//! - `GET /v1/matrices`: list matrices
//! - `GET /v1/matrices/{id}`: get a matrix
//! - `POST /v1/matrices/{id}/rows`: add a row
//! - `PUT /v1/matrices/{id}/rows/{row_id}`: edit a row
//! - `POST /v1/matrices/{id}/rows/{row_id}/copy`: copy a row
//! - `POST /v1/matrices/{id}/rows/delete`: delete selected rows
//! - `POST /v1/matrices/{id}/validate`: run row validation
//! - `POST /v1/matrices/{id}/lock`: lock a validated matrix
//! - `POST /v1/matrices/{id}/archive`: archive
//! - `POST /v1/matrices/{id}/duplicate`: editable copy

use audit_core::MatrixId;
use audit_state::{MatrixError, MatrixForm, MatrixStatus, RiskControlMatrix, RowPatch, ValidationReport};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::extractors::{extract_json, RequestActor};
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeleteRowsRequest {
    #[serde(default)]
    pub row_ids: Vec<u32>,
}

/// A matrix after a row was added or copied.
#[derive(Debug, Serialize, Deserialize)]
pub struct RowChangeResponse {
    pub row_id: u32,
    pub matrix: RiskControlMatrix,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteRowsResponse {
    pub deleted: usize,
    pub matrix: RiskControlMatrix,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub status: MatrixStatus,
    pub report: ValidationReport,
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/matrices", get(list_matrices).post(create_matrix))
        .route("/v1/matrices/{id}", get(get_matrix))
        .route("/v1/matrices/{id}/rows", post(add_row))
        .route("/v1/matrices/{id}/rows/delete", post(delete_rows))
        .route("/v1/matrices/{id}/rows/{row_id}", put(edit_row))
        .route("/v1/matrices/{id}/rows/{row_id}/copy", post(copy_row))
        .route("/v1/matrices/{id}/validate", post(validate_matrix))
        .route("/v1/matrices/{id}/lock", post(lock_matrix))
        .route("/v1/matrices/{id}/archive", post(archive_matrix))
        .route("/v1/matrices/{id}/duplicate", post(duplicate_matrix))
}

fn not_found(id: MatrixId) -> AppError {
    AppError::NotFound(format!("{id} not found"))
}

/// Apply a fallible change to a stored matrix.
fn mutate<R>(
    state: &AppState,
    id: MatrixId,
    f: impl FnOnce(&mut RiskControlMatrix) -> Result<R, MatrixError>,
) -> Result<(R, RiskControlMatrix), AppError> {
    state
        .matrices
        .try_update(&id, |matrix| f(matrix).map(|r| (r, matrix.clone())))
        .ok_or_else(|| not_found(id))?
        .map_err(AppError::from)
}

// ── Handlers ────────────────────────────────────────────────────────

async fn create_matrix(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    body: Result<Json<MatrixForm>, JsonRejection>,
) -> Result<(StatusCode, Json<RiskControlMatrix>), AppError> {
    let form = extract_json(body)?;
    let now = state.now();
    let matrix = state.matrices.insert_with(|existing| {
        RiskControlMatrix::create(form, existing, now).map(|m| (m.id, m))
    })?;
    tracing::info!(matrix_id = %matrix.id, name = %matrix.name, actor = %actor, "matrix created");
    Ok((StatusCode::CREATED, Json(matrix)))
}

async fn list_matrices(State(state): State<AppState>) -> Json<Vec<RiskControlMatrix>> {
    let mut matrices = state.matrices.list();
    matrices.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Json(matrices)
}

async fn get_matrix(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RiskControlMatrix>, AppError> {
    let id = MatrixId::from(id);
    state.matrices.get(&id).map(Json).ok_or_else(|| not_found(id))
}

async fn add_row(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<RowPatch>, JsonRejection>,
) -> Result<(StatusCode, Json<RowChangeResponse>), AppError> {
    let patch = extract_json(body)?;
    let now = state.now();
    let (row_id, matrix) = mutate(&state, id.into(), |m| m.add_row(patch, now))?;
    Ok((StatusCode::CREATED, Json(RowChangeResponse { row_id, matrix })))
}

async fn edit_row(
    State(state): State<AppState>,
    Path((id, row_id)): Path<(Uuid, u32)>,
    body: Result<Json<RowPatch>, JsonRejection>,
) -> Result<Json<RiskControlMatrix>, AppError> {
    let patch = extract_json(body)?;
    let now = state.now();
    let ((), matrix) = mutate(&state, id.into(), |m| m.edit_row(row_id, patch, now))?;
    Ok(Json(matrix))
}

async fn copy_row(
    State(state): State<AppState>,
    Path((id, row_id)): Path<(Uuid, u32)>,
) -> Result<(StatusCode, Json<RowChangeResponse>), AppError> {
    let now = state.now();
    let (row_id, matrix) = mutate(&state, id.into(), |m| m.copy_row(row_id, now))?;
    Ok((StatusCode::CREATED, Json(RowChangeResponse { row_id, matrix })))
}

async fn delete_rows(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<DeleteRowsRequest>, JsonRejection>,
) -> Result<Json<DeleteRowsResponse>, AppError> {
    let req = extract_json(body)?;
    let now = state.now();
    let (deleted, matrix) = mutate(&state, id.into(), |m| m.delete_rows(&req.row_ids, now))?;
    Ok(Json(DeleteRowsResponse { deleted, matrix }))
}

async fn validate_matrix(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ValidateResponse>, AppError> {
    let now = state.now();
    let (report, matrix) = mutate(&state, id.into(), |m| m.validate(now))?;
    tracing::debug!(matrix_id = %matrix.id, valid = report.is_valid(), "matrix validated");
    Ok(Json(ValidateResponse {
        status: matrix.status,
        report,
    }))
}

async fn lock_matrix(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    RequestActor(actor): RequestActor,
) -> Result<Json<RiskControlMatrix>, AppError> {
    let now = state.now();
    let ((), matrix) = mutate(&state, id.into(), |m| m.lock(now))?;
    tracing::info!(matrix_id = %matrix.id, actor = %actor, "matrix locked");
    Ok(Json(matrix))
}

async fn archive_matrix(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RiskControlMatrix>, AppError> {
    let id = MatrixId::from(id);
    let now = state.now();
    state
        .matrices
        .update(&id, |m| m.archive(now))
        .map(Json)
        .ok_or_else(|| not_found(id))
}

async fn duplicate_matrix(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<RiskControlMatrix>), AppError> {
    let id = MatrixId::from(id);
    let source = state.matrices.get(&id).ok_or_else(|| not_found(id))?;
    let copy = source.duplicate(state.now());
    state.matrices.insert(copy.id, copy.clone());
    Ok((StatusCode::CREATED, Json(copy)))
}
