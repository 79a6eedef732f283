//! Counselor handlers

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::model::{Actor, Appointment, AppointmentStatus};

use crate::api::error::ApiError;
use crate::api::models::*;
use crate::api::AppState;

pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    query: Result<Query<AppointmentListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let appointments = state
        .service
        .counselor_appointments(&actor, query.into_filter()?)
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

pub async fn update_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateAppointmentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = payload?;
    let updated = state.service.update_appointment(&actor, id, req.into()).await?;
    Ok(Json(updated))
}

async fn transition(
    state: &AppState,
    actor: &Actor,
    id: &str,
    to: AppointmentStatus,
) -> Result<Json<Appointment>, ApiError> {
    let id = parse_id(id)?;
    Ok(Json(state.service.transition(actor, id, to).await?))
}

pub async fn confirm_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    transition(&state, &actor, &id, AppointmentStatus::Confirmed).await
}

pub async fn complete_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    transition(&state, &actor, &id, AppointmentStatus::Completed).await
}

pub async fn no_show_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    transition(&state, &actor, &id, AppointmentStatus::NoShow).await
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    transition(&state, &actor, &id, AppointmentStatus::Cancelled).await
}

pub async fn dashboard_stats(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.dashboard_stats(&actor).await?))
}

pub async fn upcoming(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    query: Result<Query<UpcomingQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    Ok(Json(state.service.upcoming(&actor, query.limit).await?))
}

pub async fn student_history(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(student_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let student_id = parse_id(&student_id)?;
    Ok(Json(state.service.student_history(&actor, student_id).await?))
}

pub async fn my_students(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.my_students(&actor).await?))
}

// ── Session notes ────────────────────────────────────────

pub async fn create_session_note(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<CreateSessionNoteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let note = state.service.create_session_note(&actor, req.into()).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn list_session_notes(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    query: Result<Query<SessionNoteQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    Ok(Json(state.service.session_notes(&actor, query.into_filter()?).await?))
}

pub async fn get_session_note(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.service.session_note(&actor, id).await?))
}

pub async fn update_session_note(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateSessionNoteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let Json(req) = payload?;
    Ok(Json(state.service.update_session_note(&actor, id, req.into()).await?))
}

pub async fn delete_session_note(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    state.service.delete_session_note(&actor, id).await?;
    Ok(Json(Deleted { deleted: id }))
}
