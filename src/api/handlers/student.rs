//! Student handlers

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::model::{Actor, AppointmentStatus};

use crate::api::error::ApiError;
use crate::api::models::*;
use crate::api::AppState;

pub async fn book_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<BookAppointmentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let booked = state
        .service
        .book(&actor, req.counselor_id, req.start, req.end, req.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(booked)))
}

pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    query: Result<Query<AppointmentListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let appointments = state
        .service
        .student_appointments(&actor, query.into_filter()?)
        .await?;
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

pub async fn cancel_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let cancelled = state
        .service
        .transition(&actor, id, AppointmentStatus::Cancelled)
        .await?;
    Ok(Json(cancelled))
}

pub async fn list_counselors(
    State(state): State<AppState>,
    query: Result<Query<CounselorListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    Ok(Json(state.service.counselors(query.department.as_deref()).await?))
}

pub async fn counselor_slots(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<SlotsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let counselor_id = parse_id(&id)?;
    let Query(window) = query?;
    let view = state.service.slots(counselor_id, window.start, window.end).await?;
    Ok(Json(view))
}
