use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::engine::EngineError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

/// An HTTP error response with a JSON `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "authentication required")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "access denied")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::InvalidRange(_) | EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict { .. }
            | EngineError::AlreadyExists(_)
            | EngineError::InvalidTransition { .. }
            | EngineError::Immutable { .. }
            | EngineError::HasAppointments(_)
            | EngineError::HasSessionNotes(_) => StatusCode::CONFLICT,
            EngineError::WalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            // Details stay in the log.
            tracing::error!(target: "haven::http::error", "internal error: {err}");
            return Self::new(status, "internal server error");
        }
        if status == StatusCode::FORBIDDEN {
            return Self::forbidden();
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody { error: self.message };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use ulid::Ulid;

    use super::*;
    use crate::model::{AppointmentStatus, Span};

    #[test]
    fn engine_errors_map_to_status() {
        let id = Ulid::new();
        let cases = [
            (EngineError::InvalidRange(Span { start: 2, end: 1 }), StatusCode::BAD_REQUEST),
            (EngineError::LimitExceeded("notes too long"), StatusCode::BAD_REQUEST),
            (EngineError::Forbidden(id), StatusCode::FORBIDDEN),
            (EngineError::NotFound(id), StatusCode::NOT_FOUND),
            (
                EngineError::Conflict {
                    appointment: id,
                    slot: Span::new(1, 2),
                },
                StatusCode::CONFLICT,
            ),
            (EngineError::AlreadyExists(id), StatusCode::CONFLICT),
            (
                EngineError::InvalidTransition {
                    from: AppointmentStatus::Completed,
                    to: AppointmentStatus::Confirmed,
                },
                StatusCode::CONFLICT,
            ),
            (
                EngineError::Immutable {
                    id,
                    status: AppointmentStatus::Cancelled,
                },
                StatusCode::CONFLICT,
            ),
            (EngineError::HasAppointments(id), StatusCode::CONFLICT),
            (EngineError::HasSessionNotes(id), StatusCode::CONFLICT),
            (EngineError::WalError("disk full".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn internal_details_not_exposed() {
        let err = ApiError::from(EngineError::WalError("/var/lib/haven: disk full".into()));
        assert_eq!(err.message, "internal server error");
    }
}
