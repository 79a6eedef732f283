//! Admin handlers

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::model::Actor;

use crate::api::error::ApiError;
use crate::api::models::*;
use crate::api::AppState;

pub async fn list_appointments(
    State(state): State<AppState>,
    query: Result<Query<AdminAppointmentQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let appointments = state.service.admin_appointments(query.into_filter()?).await?;
    Ok(Json(appointments))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.service.appointment(&actor, id).await?))
}

pub async fn override_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    payload: Result<Json<OverrideAppointmentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = payload?;
    let updated = state
        .service
        .override_appointment(&actor, id, req.into_override()?)
        .await?;
    Ok(Json(updated))
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.service.delete_appointment(&actor, id).await?))
}

pub async fn analytics(
    State(state): State<AppState>,
    query: Result<Query<AnalyticsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    Ok(Json(state.service.analytics(query.from, query.to).await?))
}

pub async fn list_counselors(
    State(state): State<AppState>,
    query: Result<Query<CounselorListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    Ok(Json(state.service.counselors(query.department.as_deref()).await?))
}

pub async fn create_counselor(
    State(state): State<AppState>,
    payload: Result<Json<CreateCounselorRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let (id, profile) = req.into_parts();
    let created = state.service.create_counselor(id, profile).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_counselor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.service.counselor_detail(id).await?))
}

pub async fn update_counselor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateCounselorRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let Json(patch) = payload?;
    Ok(Json(state.service.update_counselor(id, patch).await?))
}

pub async fn delete_counselor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    state.service.delete_counselor(id).await?;
    Ok(Json(Deleted { deleted: id }))
}
