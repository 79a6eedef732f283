use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_range};
use super::transitions::{authorize, check_transition};
use super::{Engine, EngineError, WalCommand};

/// Counselor-side edit of an active appointment. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentUpdate {
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub notes: Option<String>,
}

/// Administrative override: any status, any time, any notes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentOverride {
    pub status: Option<AppointmentStatus>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub notes: Option<String>,
}

/// A counselor's new session record. The student is taken from the appointment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSessionNote {
    pub appointment_id: Ulid,
    pub notes: String,
    pub observations: Option<String>,
    pub recommendations: Option<String>,
    pub follow_up: Option<Ms>,
}

fn validate_profile(profile: &CounselorProfile) -> Result<(), EngineError> {
    if profile.name.trim().is_empty() {
        return Err(EngineError::LimitExceeded("counselor name is required"));
    }
    if profile.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("counselor name too long"));
    }
    if profile.departments.len() > MAX_DEPARTMENTS {
        return Err(EngineError::LimitExceeded("too many departments"));
    }
    Ok(())
}

fn validate_notes(notes: &Option<String>) -> Result<(), EngineError> {
    if let Some(n) = notes
        && n.len() > MAX_NOTES_LEN {
            return Err(EngineError::LimitExceeded("notes too long"));
        }
    Ok(())
}

fn validate_session_note(note: &SessionNote) -> Result<(), EngineError> {
    if note.notes.trim().is_empty() {
        return Err(EngineError::LimitExceeded("session notes are required"));
    }
    let too_long = [Some(&note.notes), note.observations.as_ref(), note.recommendations.as_ref()]
        .into_iter()
        .flatten()
        .any(|text| text.len() > MAX_NOTES_LEN);
    if too_long {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    if let Some(at) = note.follow_up
        && !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&at)
    {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// Empty notes clear the field.
fn normalize_notes(notes: String) -> Option<String> {
    if notes.trim().is_empty() { None } else { Some(notes) }
}

fn require_role(actor: &Actor, role: Role, target: Ulid) -> Result<(), EngineError> {
    if actor.role == role {
        Ok(())
    } else {
        Err(EngineError::Forbidden(target))
    }
}

impl Engine {
    // ── Counselors ───────────────────────────────────────────

    pub async fn create_counselor(
        &self,
        id: Ulid,
        profile: CounselorProfile,
    ) -> Result<CounselorInfo, EngineError> {
        if self.counselors.len() >= MAX_COUNSELORS {
            return Err(EngineError::LimitExceeded("too many counselors"));
        }
        validate_profile(&profile)?;
        let _directory = self.directory.lock().await;
        if self.counselors.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::CounselorCreated { id, profile: profile.clone() };
        self.wal_append(&event).await?;
        let cs = CounselorState::new(id, profile);
        let info = cs.info();
        self.counselors.insert(id, Arc::new(RwLock::new(cs)));
        tracing::info!(counselor = %id, "counselor created");
        Ok(info)
    }

    /// Merge `patch` into the stored profile under the counselor's write lock.
    pub async fn update_counselor(
        &self,
        id: Ulid,
        patch: CounselorPatch,
    ) -> Result<CounselorInfo, EngineError> {
        let cs = self.get_counselor(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = cs.write().await;
        let profile = patch.apply(&guard.profile);
        validate_profile(&profile)?;
        let event = Event::CounselorUpdated { id, profile };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(guard.info())
    }

    pub async fn delete_counselor(&self, id: Ulid) -> Result<(), EngineError> {
        let _directory = self.directory.lock().await;
        let cs = self.get_counselor(&id).ok_or(EngineError::NotFound(id))?;
        // Hold the write lock so no booking slips in between the check and the removal.
        let guard = cs.write().await;
        if !guard.appointments.is_empty() {
            return Err(EngineError::HasAppointments(id));
        }
        let event = Event::CounselorDeleted { id };
        self.wal_append(&event).await?;
        self.counselors.remove(&id);
        drop(guard);
        tracing::info!(counselor = %id, "counselor deleted");
        Ok(())
    }

    // ── Appointments ─────────────────────────────────────────

    /// Book a pending appointment for the calling student.
    ///
    /// The overlap check and the insert happen under the counselor's write lock.
    pub async fn book_appointment(
        &self,
        actor: &Actor,
        counselor_id: Ulid,
        start: Ms,
        end: Ms,
        notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        require_role(actor, Role::Student, counselor_id)?;
        let span = validate_range(start, end)?;
        let notes = notes.and_then(normalize_notes);
        validate_notes(&notes)?;

        let cs = self
            .get_counselor(&counselor_id)
            .ok_or(EngineError::NotFound(counselor_id))?;
        let mut guard = cs.write().await;
        // Deleted while we waited for the lock.
        if !self.counselors.contains_key(&counselor_id) {
            return Err(EngineError::NotFound(counselor_id));
        }
        if guard.appointments.len() >= MAX_APPOINTMENTS_PER_COUNSELOR {
            return Err(EngineError::LimitExceeded("too many appointments for counselor"));
        }

        check_no_conflict(&guard, &span, None)?;

        let now = now_ms();
        let appointment = Appointment {
            id: Ulid::new(),
            student_id: actor.id,
            counselor_id,
            span,
            status: AppointmentStatus::Pending,
            notes,
            created_at: now,
            updated_at: now,
        };
        let event = Event::AppointmentBooked { appointment: appointment.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(
            appointment = %appointment.id,
            counselor = %counselor_id,
            student = %actor.id,
            "appointment booked"
        );
        Ok(appointment)
    }

    /// Move an appointment to `to`, subject to the transition table.
    pub async fn transition_appointment(
        &self,
        actor: &Actor,
        id: Ulid,
        to: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let mut guard = self.resolve_appointment_write(&id).await?;
        let current = guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))?;
        check_transition(actor, &current, to)?;

        let event = Event::AppointmentStatusChanged {
            id,
            counselor_id: current.counselor_id,
            status: to,
            at: now_ms(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(appointment = %id, from = %current.status, %to, actor = %actor.id, "appointment transitioned");
        guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Reschedule and/or annotate an active appointment as its counselor.
    pub async fn update_appointment(
        &self,
        actor: &Actor,
        id: Ulid,
        update: AppointmentUpdate,
    ) -> Result<Appointment, EngineError> {
        require_role(actor, Role::Counselor, id)?;
        let notes = update.notes.map(normalize_notes);
        if let Some(n) = &notes {
            validate_notes(n)?;
        }

        let mut guard = self.resolve_appointment_write(&id).await?;
        let current = guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))?;
        authorize(actor, &current)?;
        if current.status.is_terminal() {
            return Err(EngineError::Immutable { id, status: current.status });
        }

        let mut span = None;
        if update.start.is_some() || update.end.is_some() {
            let proposed = validate_range(
                update.start.unwrap_or(current.span.start),
                update.end.unwrap_or(current.span.end),
            )?;
            if proposed != current.span {
                check_no_conflict(&guard, &proposed, Some(id))?;
                span = Some(proposed);
            }
        }
        let notes = notes.filter(|n| *n != current.notes);

        if span.is_some() || notes.is_some() {
            let event = Event::AppointmentRevised {
                id,
                counselor_id: current.counselor_id,
                span,
                status: None,
                notes,
                at: now_ms(),
            };
            self.persist_and_apply(&mut guard, &event).await?;
            tracing::info!(appointment = %id, counselor = %actor.id, "appointment updated");
        }
        guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Administrative override. Bypasses the transition table, but an
    /// appointment that ends up holding its slot must still not overlap another one.
    pub async fn override_appointment(
        &self,
        actor: &Actor,
        id: Ulid,
        change: AppointmentOverride,
    ) -> Result<Appointment, EngineError> {
        require_role(actor, Role::Admin, id)?;
        let notes = change.notes.map(normalize_notes);
        if let Some(n) = &notes {
            validate_notes(n)?;
        }

        let mut guard = self.resolve_appointment_write(&id).await?;
        let current = guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))?;

        let span = if change.start.is_some() || change.end.is_some() {
            validate_range(
                change.start.unwrap_or(current.span.start),
                change.end.unwrap_or(current.span.end),
            )?
        } else {
            current.span
        };
        let status = change.status.unwrap_or(current.status);
        if status.holds_slot() {
            check_no_conflict(&guard, &span, Some(id))?;
        }

        let span = (span != current.span).then_some(span);
        let status = (status != current.status).then_some(status);
        let notes = notes.filter(|n| *n != current.notes);
        if span.is_none() && status.is_none() && notes.is_none() {
            return Ok(current);
        }

        let event = Event::AppointmentRevised {
            id,
            counselor_id: current.counselor_id,
            span,
            status,
            notes,
            at: now_ms(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(appointment = %id, admin = %actor.id, "appointment overridden");
        guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Remove an appointment entirely. Returns the removed record.
    /// Refused while session notes still reference it.
    pub async fn delete_appointment(&self, actor: &Actor, id: Ulid) -> Result<Appointment, EngineError> {
        require_role(actor, Role::Admin, id)?;
        let mut guard = self.resolve_appointment_write(&id).await?;
        let current = guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))?;
        if guard.has_session_notes_for(id) {
            return Err(EngineError::HasSessionNotes(id));
        }
        let event = Event::AppointmentDeleted {
            id,
            counselor_id: current.counselor_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(appointment = %id, admin = %actor.id, "appointment deleted");
        Ok(current)
    }

    // ── Session notes ────────────────────────────────────────

    /// Record a session note against one of the calling counselor's appointments.
    pub async fn create_session_note(
        &self,
        actor: &Actor,
        new: NewSessionNote,
    ) -> Result<SessionNote, EngineError> {
        let appointment_id = new.appointment_id;
        require_role(actor, Role::Counselor, appointment_id)?;

        let mut guard = self.resolve_appointment_write(&appointment_id).await?;
        let appointment = guard
            .appointment(appointment_id)
            .cloned()
            .ok_or(EngineError::NotFound(appointment_id))?;
        if appointment.counselor_id != actor.id {
            return Err(EngineError::Forbidden(appointment_id));
        }
        if guard.session_notes.len() >= MAX_SESSION_NOTES_PER_COUNSELOR {
            return Err(EngineError::LimitExceeded("too many session notes for counselor"));
        }

        let now = now_ms();
        let note = SessionNote {
            id: Ulid::new(),
            appointment_id,
            counselor_id: actor.id,
            student_id: appointment.student_id,
            notes: new.notes,
            observations: new.observations.and_then(normalize_notes),
            recommendations: new.recommendations.and_then(normalize_notes),
            follow_up: new.follow_up,
            created_at: now,
            updated_at: now,
        };
        validate_session_note(&note)?;
        let event = Event::SessionNoteCreated { note: note.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(
            note = %note.id,
            appointment = %appointment_id,
            counselor = %actor.id,
            "session note created"
        );
        Ok(note)
    }

    /// Merge `patch` into a note the calling counselor owns.
    pub async fn update_session_note(
        &self,
        actor: &Actor,
        id: Ulid,
        patch: SessionNotePatch,
    ) -> Result<SessionNote, EngineError> {
        require_role(actor, Role::Counselor, id)?;
        let mut guard = self.resolve_session_note_write(&id).await?;
        let current = guard.session_note(id).cloned().ok_or(EngineError::NotFound(id))?;
        if current.counselor_id != actor.id {
            return Err(EngineError::Forbidden(id));
        }

        let note = patch.apply(&current, now_ms());
        validate_session_note(&note)?;
        let event = Event::SessionNoteUpdated { note: note.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(note)
    }

    /// Remove a note the calling counselor owns. Returns the removed record.
    pub async fn delete_session_note(&self, actor: &Actor, id: Ulid) -> Result<SessionNote, EngineError> {
        require_role(actor, Role::Counselor, id)?;
        let mut guard = self.resolve_session_note_write(&id).await?;
        let current = guard.session_note(id).cloned().ok_or(EngineError::NotFound(id))?;
        if current.counselor_id != actor.id {
            return Err(EngineError::Forbidden(id));
        }
        let event = Event::SessionNoteDeleted {
            id,
            counselor_id: current.counselor_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(note = %id, counselor = %actor.id, "session note deleted");
        Ok(current)
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    ///
    /// Read locks are held until the swap lands; a mutation appended between the
    /// snapshot and the swap would otherwise vanish from the new file.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        let mut seen = HashSet::new();
        let mut guards = Vec::new();
        let _directory = self.directory.lock().await;

        for cs in self.counselor_handles() {
            let guard = cs.read_owned().await;
            if !seen.insert(guard.id) {
                continue;
            }
            events.push(Event::CounselorCreated {
                id: guard.id,
                profile: guard.profile.clone(),
            });
            for appointment in &guard.appointments {
                events.push(Event::AppointmentBooked {
                    appointment: appointment.clone(),
                });
            }
            for note in &guard.session_notes {
                events.push(Event::SessionNoteCreated { note: note.clone() });
            }
            guards.push(guard);
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        let result = rx
            .await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()));
        drop(guards);
        result
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
