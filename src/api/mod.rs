//! HTTP surface: one route group per role, each behind a role guard.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use axum::middleware as axum_middleware;
use axum::routing::{get, patch};
use axum::Router;

use crate::model::Role;
use crate::service::Service;

use handlers::{admin, counselor, student};

#[derive(Clone)]
pub struct AppState {
    pub service: Service,
}

impl AppState {
    pub fn new(service: Service) -> Self {
        Self { service }
    }
}

fn guarded(routes: Router<AppState>, role: Role) -> Router<AppState> {
    routes.route_layer(axum_middleware::from_fn_with_state(role, auth::require_role))
}

fn student_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/appointments",
            get(student::list_appointments).post(student::book_appointment),
        )
        .route("/appointments/{id}", get(student::get_appointment))
        .route("/appointments/{id}/cancel", patch(student::cancel_appointment))
        .route("/counselors", get(student::list_counselors))
        .route("/counselors/{id}/slots", get(student::counselor_slots))
}

fn counselor_routes() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(counselor::list_appointments))
        .route(
            "/appointments/{id}",
            get(counselor::get_appointment).patch(counselor::update_appointment),
        )
        .route("/appointments/{id}/confirm", patch(counselor::confirm_appointment))
        .route("/appointments/{id}/complete", patch(counselor::complete_appointment))
        .route("/appointments/{id}/no-show", patch(counselor::no_show_appointment))
        .route("/appointments/{id}/cancel", patch(counselor::cancel_appointment))
        .route("/dashboard/stats", get(counselor::dashboard_stats))
        .route("/dashboard/upcoming", get(counselor::upcoming))
        .route("/students", get(counselor::my_students))
        .route("/students/{id}/appointments", get(counselor::student_history))
        .route(
            "/notes",
            get(counselor::list_session_notes).post(counselor::create_session_note),
        )
        .route(
            "/notes/{id}",
            get(counselor::get_session_note)
                .patch(counselor::update_session_note)
                .delete(counselor::delete_session_note),
        )
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(admin::list_appointments))
        .route(
            "/appointments/{id}",
            get(admin::get_appointment)
                .patch(admin::override_appointment)
                .delete(admin::delete_appointment),
        )
        .route("/analytics/appointments", get(admin::analytics))
        .route(
            "/counselors",
            get(admin::list_counselors).post(admin::create_counselor),
        )
        .route(
            "/counselors/{id}",
            get(admin::get_counselor)
                .patch(admin::update_counselor)
                .delete(admin::delete_counselor),
        )
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/student", guarded(student_routes(), Role::Student))
        .nest("/counselor", guarded(counselor_routes(), Role::Counselor))
        .nest("/admin", guarded(admin_routes(), Role::Admin))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
}
