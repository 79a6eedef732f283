use ulid::Ulid;

use crate::model::{AppointmentStatus, Span};

#[derive(Debug)]
pub enum EngineError {
    InvalidRange(Span),
    LimitExceeded(&'static str),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    Forbidden(Ulid),
    Conflict {
        appointment: Ulid,
        slot: Span,
    },
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    Immutable {
        id: Ulid,
        status: AppointmentStatus,
    },
    HasAppointments(Ulid),
    HasSessionNotes(Ulid),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange(span) => {
                write!(f, "invalid time range: start {} is not before end {}", span.start, span.end)
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Forbidden(id) => write!(f, "access denied to {id}"),
            EngineError::Conflict { appointment, slot } => write!(
                f,
                "time slot [{}, {}) not available: held by appointment {appointment}",
                slot.start, slot.end
            ),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition: {from} -> {to}")
            }
            EngineError::Immutable { id, status } => {
                write!(f, "appointment {id} is {status} and can no longer be changed")
            }
            EngineError::HasAppointments(id) => {
                write!(f, "cannot delete counselor {id}: has appointments")
            }
            EngineError::HasSessionNotes(id) => {
                write!(f, "cannot delete appointment {id}: has session notes")
            }
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
