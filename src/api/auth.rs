//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the verified caller
//! as `x-actor-id` (ULID) and `x-actor-role`. Each route group admits one role.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use ulid::Ulid;

use crate::model::{Actor, Role};

use super::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Read the caller from the identity headers. Missing or malformed → 401.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let id = header(ACTOR_ID_HEADER)
        .and_then(|v| Ulid::from_string(v).ok())
        .ok_or_else(ApiError::unauthorized)?;
    let role = header(ACTOR_ROLE_HEADER)
        .and_then(|v| v.parse::<Role>().ok())
        .ok_or_else(ApiError::unauthorized)?;
    Ok(Actor { id, role })
}

/// Route-group guard: admits callers whose role is `required` and exposes them
/// to handlers as `Extension<Actor>`.
pub async fn require_role(
    State(required): State<Role>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let actor = actor_from_headers(request.headers())?;
    if actor.role != required {
        tracing::debug!(actor = %actor.id, role = actor.role.as_str(), required = required.as_str(), "role rejected");
        return Err(ApiError::forbidden());
    }
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, StatusCode};

    use super::*;

    fn headers(id: Option<&str>, role: Option<&str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(id) = id {
            h.insert(ACTOR_ID_HEADER, HeaderValue::from_str(id).unwrap());
        }
        if let Some(role) = role {
            h.insert(ACTOR_ROLE_HEADER, HeaderValue::from_str(role).unwrap());
        }
        h
    }

    #[test]
    fn parses_valid_identity() {
        let id = Ulid::new();
        let actor = actor_from_headers(&headers(Some(&id.to_string()), Some("Counselor"))).unwrap();
        assert_eq!(actor, Actor::counselor(id));
    }

    #[test]
    fn missing_or_malformed_is_unauthorized() {
        let id = Ulid::new().to_string();
        for h in [
            headers(None, Some("student")),
            headers(Some(&id), None),
            headers(Some("not-a-ulid"), Some("student")),
            headers(Some(&id), Some("janitor")),
        ] {
            assert_eq!(actor_from_headers(&h).unwrap_err().status(), StatusCode::UNAUTHORIZED);
        }
    }
}
