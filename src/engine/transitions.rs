//! Appointment lifecycle.
//!
//! Every status change a student or counselor may request is listed in
//! [`TRANSITIONS`]. Anything not in the table is rejected, including moves out
//! of a terminal state. Admins bypass the table through an explicit override.

use crate::model::{Actor, Appointment, AppointmentStatus, Role};

use super::EngineError;

use AppointmentStatus::*;

pub struct Transition {
    pub from: &'static [AppointmentStatus],
    pub to: AppointmentStatus,
    pub actors: &'static [Role],
}

pub const TRANSITIONS: &[Transition] = &[
    Transition {
        from: &[Pending],
        to: Confirmed,
        actors: &[Role::Counselor],
    },
    Transition {
        from: &[Pending, Confirmed],
        to: Cancelled,
        actors: &[Role::Student, Role::Counselor],
    },
    Transition {
        from: &[Confirmed],
        to: Completed,
        actors: &[Role::Counselor],
    },
    Transition {
        from: &[Confirmed],
        to: NoShow,
        actors: &[Role::Counselor],
    },
];

/// Ownership guard: students act on their own appointments, counselors on the
/// ones booked with them. Admins see everything.
pub fn authorize(actor: &Actor, appointment: &Appointment) -> Result<(), EngineError> {
    let owns = match actor.role {
        Role::Student => appointment.student_id == actor.id,
        Role::Counselor => appointment.counselor_id == actor.id,
        Role::Admin => true,
    };
    if owns {
        Ok(())
    } else {
        Err(EngineError::Forbidden(appointment.id))
    }
}

/// Look up `from -> to` in the table for the actor's role.
///
/// A role that is never allowed to move anything into `to` is denied access;
/// otherwise a missing table row is an invalid transition.
pub fn check_transition(
    actor: &Actor,
    appointment: &Appointment,
    to: AppointmentStatus,
) -> Result<(), EngineError> {
    authorize(actor, appointment)?;
    let from = appointment.status;
    let mut targets = TRANSITIONS.iter().filter(|t| t.to == to).peekable();
    if targets.peek().is_none() {
        return Err(EngineError::InvalidTransition { from, to });
    }
    let mut role_may_target = false;
    for t in targets {
        if !t.actors.contains(&actor.role) {
            continue;
        }
        role_may_target = true;
        if t.from.contains(&from) {
            return Ok(());
        }
    }
    if role_may_target || actor.role == Role::Admin {
        Err(EngineError::InvalidTransition { from, to })
    } else {
        Err(EngineError::Forbidden(appointment.id))
    }
}
