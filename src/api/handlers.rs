pub mod admin;
pub mod counselor;
pub mod student;

use axum::Json;

use super::models::Health;

pub async fn healthz() -> Json<Health> {
    Json(Health { status: "ok" })
}
