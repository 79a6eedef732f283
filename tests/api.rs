use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use ulid::Ulid;

use haven::api::{self, AppState};
use haven::cache::{MemoryStore, ReadThroughCache};
use haven::engine::Engine;
use haven::service::Service;

const H: i64 = 3_600_000;
/// 2026-01-01T00:00:00Z
const DAY: i64 = 1_767_225_600_000;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("haven_test_api");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn app(wal: &str) -> Router {
    let engine = Arc::new(Engine::new(test_wal_path(wal)).unwrap());
    let cache = ReadThroughCache::new(Arc::new(MemoryStore::new()));
    api::router(AppState::new(Service::new(engine, cache)))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    actor: Option<(Ulid, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = actor {
        builder = builder
            .header("x-actor-id", id.to_string())
            .header("x-actor-role", role);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_counselor(app: &Router, name: &str, department: &str) -> Ulid {
    let admin = Ulid::new();
    let (status, body) = send(
        app,
        Method::POST,
        "/admin/counselors",
        Some((admin, "admin")),
        Some(json!({ "name": name, "departments": [department] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn booking_flow_end_to_end() {
    let app = app("booking_flow.wal");
    let counselor = create_counselor(&app, "Reyes", "Psychology").await;
    let student = Ulid::new();

    let (status, booked) = send(
        &app,
        Method::POST,
        "/student/appointments",
        Some((student, "student")),
        Some(json!({ "counselor_id": counselor, "start": DAY + 10 * H, "end": DAY + 11 * H, "notes": "first visit" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booked["status"], "pending");
    let id = booked["id"].as_str().unwrap().to_string();

    let (status, confirmed) = send(
        &app,
        Method::PATCH,
        &format!("/counselor/appointments/{id}/confirm"),
        Some((counselor, "counselor")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "confirmed");

    let (status, listed) = send(&app, Method::GET, "/student/appointments", Some((student, "student")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["status"], "confirmed");

    let (status, completed) = send(
        &app,
        Method::PATCH,
        &format!("/counselor/appointments/{id}/complete"),
        Some((counselor, "counselor")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["status"], "completed");

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/student/appointments/{id}/cancel"),
        Some((student, "student")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn overlapping_booking_conflicts() {
    let app = app("overlap.wal");
    let counselor = create_counselor(&app, "Reyes", "Psychology").await;
    let book = |start: i64, end: i64| {
        let app = app.clone();
        async move {
            send(
                &app,
                Method::POST,
                "/student/appointments",
                Some((Ulid::new(), "student")),
                Some(json!({ "counselor_id": counselor, "start": start, "end": end })),
            )
            .await
            .0
        }
    };

    assert_eq!(book(DAY + 10 * H, DAY + 11 * H).await, StatusCode::CREATED);
    assert_eq!(book(DAY + 10 * H + H / 2, DAY + 11 * H + H / 2).await, StatusCode::CONFLICT);
    assert_eq!(book(DAY + 11 * H, DAY + 12 * H).await, StatusCode::CREATED);
    assert_eq!(book(DAY + 12 * H, DAY + 12 * H).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn identity_and_role_checks() {
    let app = app("identity.wal");
    let counselor = create_counselor(&app, "Reyes", "Psychology").await;

    let (status, body) = send(&app, Method::GET, "/student/appointments", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = send(&app, Method::GET, "/admin/appointments", Some((Ulid::new(), "student")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let student = Ulid::new();
    let (_, booked) = send(
        &app,
        Method::POST,
        "/student/appointments",
        Some((student, "student")),
        Some(json!({ "counselor_id": counselor, "start": DAY + 9 * H, "end": DAY + 10 * H })),
    )
    .await;
    let id = booked["id"].as_str().unwrap().to_string();

    let stranger = Ulid::new();
    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/counselor/appointments/{id}/confirm"),
        Some((stranger, "counselor")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/student/appointments/{id}"),
        Some((Ulid::new(), "student")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_input_is_bad_request() {
    let app = app("malformed.wal");
    let student = Some((Ulid::new(), "student"));

    let (status, _) = send(&app, Method::GET, "/student/appointments/not-an-id", student, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/student/appointments?status=archived", student, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/student/appointments",
        student,
        Some(json!({ "start": DAY })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &app,
        Method::POST,
        "/student/appointments",
        student,
        Some(json!({ "counselor_id": Ulid::new(), "start": DAY + H, "end": DAY + 2 * H })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cached_reads_follow_writes() {
    let app = app("cache_freshness.wal");
    let counselor = create_counselor(&app, "Reyes", "Psychology").await;
    let student = Ulid::new();
    let slots_uri = format!("/student/counselors/{counselor}/slots?start={}&end={}", DAY + 8 * H, DAY + 17 * H);

    let (status, before) = send(&app, Method::GET, &slots_uri, Some((student, "student")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(before["booked"].as_array().unwrap().is_empty());
    let (_, stats) = send(&app, Method::GET, "/counselor/dashboard/stats", Some((counselor, "counselor")), None).await;
    assert_eq!(stats["pending_appointments"], 0);

    let (_, booked) = send(
        &app,
        Method::POST,
        "/student/appointments",
        Some((student, "student")),
        Some(json!({ "counselor_id": counselor, "start": DAY + 10 * H, "end": DAY + 11 * H })),
    )
    .await;
    let id = booked["id"].as_str().unwrap().to_string();

    let (_, after) = send(&app, Method::GET, &slots_uri, Some((student, "student")), None).await;
    assert_eq!(after["booked"].as_array().unwrap().len(), 1);
    let (_, stats) = send(&app, Method::GET, "/counselor/dashboard/stats", Some((counselor, "counselor")), None).await;
    assert_eq!(stats["pending_appointments"], 1);

    send(
        &app,
        Method::PATCH,
        &format!("/counselor/appointments/{id}/cancel"),
        Some((counselor, "counselor")),
        None,
    )
    .await;
    let (_, freed) = send(&app, Method::GET, &slots_uri, Some((student, "student")), None).await;
    assert!(freed["booked"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn admin_counselor_management() {
    let app = app("admin_counselors.wal");
    let admin = Some((Ulid::new(), "admin"));
    let counselor = create_counselor(&app, "Reyes", "Psychology").await;

    let (status, updated) = send(
        &app,
        Method::PATCH,
        &format!("/admin/counselors/{counselor}"),
        admin,
        Some(json!({ "office": "B-204" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["office"], "B-204");
    assert_eq!(updated["name"], "Reyes");

    let (status, dup) = send(
        &app,
        Method::POST,
        "/admin/counselors",
        admin,
        Some(json!({ "id": counselor, "name": "Other" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(dup["error"].is_string());

    send(
        &app,
        Method::POST,
        "/student/appointments",
        Some((Ulid::new(), "student")),
        Some(json!({ "counselor_id": counselor, "start": DAY + 10 * H, "end": DAY + 11 * H })),
    )
    .await;

    let (status, detail) = send(&app, Method::GET, &format!("/admin/counselors/{counselor}"), admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["total_appointments"], 1);

    let (status, _) = send(&app, Method::DELETE, &format!("/admin/counselors/{counselor}"), admin, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, analytics) = send(&app, Method::GET, "/admin/analytics/appointments", admin, None).await;
    assert_eq!(analytics["by_status"][0]["status"], "pending");
    assert_eq!(analytics["by_status"][0]["count"], 1);

    let (status, _) = send(&app, Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn completed_session_still_blocks_booking() {
    let app = app("completed_blocks.wal");
    let counselor = create_counselor(&app, "Reyes", "Psychology").await;
    let owner = Some((counselor, "counselor"));
    let student = Some((Ulid::new(), "student"));

    let (_, booked) = send(
        &app,
        Method::POST,
        "/student/appointments",
        student,
        Some(json!({ "counselor_id": counselor, "start": DAY + 10 * H, "end": DAY + 11 * H })),
    )
    .await;
    let id = booked["id"].as_str().unwrap().to_string();
    for step in ["confirm", "complete"] {
        let (status, _) = send(&app, Method::PATCH, &format!("/counselor/appointments/{id}/{step}"), owner, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) = send(
        &app,
        Method::POST,
        "/student/appointments",
        student,
        Some(json!({ "counselor_id": counselor, "start": DAY + 10 * H, "end": DAY + 11 * H })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let slots_uri = format!("/student/counselors/{counselor}/slots?start={}&end={}", DAY + 8 * H, DAY + 17 * H);
    let (_, slots) = send(&app, Method::GET, &slots_uri, student, None).await;
    assert_eq!(slots["booked"].as_array().unwrap().len(), 1);

    let extreme = format!("/student/counselors/{counselor}/slots?start={}&end={}", i64::MIN, i64::MAX);
    let (status, body) = send(&app, Method::GET, &extreme, student, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn session_notes_and_roster() {
    let app = app("session_notes.wal");
    let counselor = create_counselor(&app, "Reyes", "Psychology").await;
    let owner = Some((counselor, "counselor"));
    let student_id = Ulid::new();

    let (_, booked) = send(
        &app,
        Method::POST,
        "/student/appointments",
        Some((student_id, "student")),
        Some(json!({ "counselor_id": counselor, "start": DAY + 10 * H, "end": DAY + 11 * H })),
    )
    .await;
    let appointment = booked["id"].as_str().unwrap().to_string();

    let (status, roster) = send(&app, Method::GET, "/counselor/students", owner, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(roster[0]["student_id"], student_id.to_string());
    assert_eq!(roster[0]["total_appointments"], 1);

    let (status, _) = send(
        &app,
        Method::POST,
        "/counselor/notes",
        owner,
        Some(json!({ "appointment_id": appointment, "notes": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, note) = send(
        &app,
        Method::POST,
        "/counselor/notes",
        owner,
        Some(json!({ "appointment_id": appointment, "notes": "intake", "follow_up": DAY + 7 * 24 * H })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(note["student_id"], student_id.to_string());
    let note_id = note["id"].as_str().unwrap().to_string();

    let (status, listed) = send(
        &app,
        Method::GET,
        &format!("/counselor/notes?student_id={student_id}"),
        owner,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, patched) = send(
        &app,
        Method::PATCH,
        &format!("/counselor/notes/{note_id}"),
        owner,
        Some(json!({ "recommendations": "weekly check-in", "follow_up": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["recommendations"], "weekly check-in");
    assert!(patched["follow_up"].is_null());

    let stranger = Some((Ulid::new(), "counselor"));
    let (status, _) = send(&app, Method::GET, &format!("/counselor/notes/{note_id}"), stranger, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = Some((Ulid::new(), "admin"));
    let (status, _) = send(&app, Method::DELETE, &format!("/admin/appointments/{appointment}"), admin, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, Method::DELETE, &format!("/counselor/notes/{note_id}"), owner, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &format!("/counselor/notes/{note_id}"), owner, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::DELETE, &format!("/admin/appointments/{appointment}"), admin, None).await;
    assert_eq!(status, StatusCode::OK);
}
