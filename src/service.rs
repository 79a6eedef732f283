//! Role-facing operations: engine calls wrapped in the read-through cache.
//!
//! Reads go through [`ReadThroughCache::get_or_compute`] under a key scoped to
//! the caller where the result is caller-specific. Every successful write
//! invalidates the scopes the registry lists for it before returning.

use std::sync::Arc;

use ulid::Ulid;

use crate::cache::{filter_params, note_filter_params, window_params, CacheKey, EntityChange, ReadThroughCache, Scope};
use crate::engine::transitions::authorize;
use crate::engine::{now_ms, AppointmentOverride, AppointmentUpdate, Engine, EngineError, NewSessionNote};
use crate::limits::{ADMIN_LIST_CAP, DEFAULT_UPCOMING_LIMIT, MAX_UPCOMING_LIMIT};
use crate::model::*;

fn appointment_change(a: &Appointment) -> EntityChange {
    EntityChange::Appointment {
        id: a.id,
        student_id: a.student_id,
        counselor_id: a.counselor_id,
    }
}

fn session_note_change(note: &SessionNote) -> EntityChange {
    EntityChange::SessionNote {
        id: note.id,
        counselor_id: note.counselor_id,
    }
}

/// The upcoming list is keyed by the minute it was computed in, so a cached
/// entry never outlives the instant it was measured from by more than that.
fn upcoming_params(limit: usize, now: Ms) -> String {
    format!("upcoming&limit={limit}&minute={}", now.div_euclid(60_000))
}

#[derive(Clone)]
pub struct Service {
    engine: Arc<Engine>,
    cache: ReadThroughCache,
}

impl Service {
    pub fn new(engine: Arc<Engine>, cache: ReadThroughCache) -> Self {
        Self { engine, cache }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn cache(&self) -> &ReadThroughCache {
        &self.cache
    }

    async fn committed(&self, appointment: Appointment) -> Appointment {
        self.cache.invalidate_change(&appointment_change(&appointment)).await;
        appointment
    }

    // ── Shared ───────────────────────────────────────────────

    /// One appointment, visible to its student, its counselor and admins.
    ///
    /// The snapshot is shared across callers, so ownership is checked on every read.
    pub async fn appointment(&self, actor: &Actor, id: Ulid) -> Result<Appointment, EngineError> {
        let key = CacheKey::entity(Scope::Appointment, id);
        let appointment = self
            .cache
            .get_or_compute(&key, || self.engine.get_appointment(id))
            .await?;
        authorize(actor, &appointment)?;
        Ok(appointment)
    }

    pub async fn transition(
        &self,
        actor: &Actor,
        id: Ulid,
        to: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let updated = self.engine.transition_appointment(actor, id, to).await?;
        Ok(self.committed(updated).await)
    }

    // ── Student ──────────────────────────────────────────────

    pub async fn book(
        &self,
        actor: &Actor,
        counselor_id: Ulid,
        start: Ms,
        end: Ms,
        notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        let booked = self
            .engine
            .book_appointment(actor, counselor_id, start, end, notes)
            .await?;
        Ok(self.committed(booked).await)
    }

    /// The caller's own appointments, soonest first.
    pub async fn student_appointments(
        &self,
        actor: &Actor,
        mut filter: AppointmentFilter,
    ) -> Result<Vec<Appointment>, EngineError> {
        filter.student_id = Some(actor.id);
        filter.order = SortOrder::Ascending;
        let key = CacheKey::entity(Scope::StudentAppointments, actor.id).with_params(&filter_params(&filter));
        self.cache
            .get_or_compute(&key, || async { Ok(self.engine.list_appointments(&filter).await) })
            .await
    }

    pub async fn counselors(&self, department: Option<&str>) -> Result<Vec<CounselorInfo>, EngineError> {
        let department = department.map(str::trim).filter(|d| !d.is_empty());
        let key = CacheKey::global(Scope::Counselors)
            .with_params(&format!("department={}", department.unwrap_or_default().to_lowercase()));
        self.cache
            .get_or_compute(&key, || async { Ok(self.engine.list_counselors(department).await) })
            .await
    }

    pub async fn slots(&self, counselor_id: Ulid, start: Ms, end: Ms) -> Result<SlotsView, EngineError> {
        let key = CacheKey::entity(Scope::CounselorSlots, counselor_id)
            .with_params(&window_params(Some(start), Some(end)));
        self.cache
            .get_or_compute(&key, || self.engine.slots(counselor_id, start, end))
            .await
    }

    // ── Counselor ────────────────────────────────────────────

    /// Appointments booked with the calling counselor, soonest first.
    pub async fn counselor_appointments(
        &self,
        actor: &Actor,
        mut filter: AppointmentFilter,
    ) -> Result<Vec<Appointment>, EngineError> {
        filter.counselor_id = Some(actor.id);
        filter.order = SortOrder::Ascending;
        let key = CacheKey::entity(Scope::CounselorAppointments, actor.id).with_params(&filter_params(&filter));
        self.cache
            .get_or_compute(&key, || async { Ok(self.engine.list_appointments(&filter).await) })
            .await
    }

    /// One student's appointments with the calling counselor.
    pub async fn student_history(&self, actor: &Actor, student_id: Ulid) -> Result<Vec<Appointment>, EngineError> {
        let filter = AppointmentFilter {
            student_id: Some(student_id),
            ..Default::default()
        };
        self.counselor_appointments(actor, filter).await
    }

    pub async fn update_appointment(
        &self,
        actor: &Actor,
        id: Ulid,
        update: AppointmentUpdate,
    ) -> Result<Appointment, EngineError> {
        let updated = self.engine.update_appointment(actor, id, update).await?;
        Ok(self.committed(updated).await)
    }

    pub async fn dashboard_stats(&self, actor: &Actor) -> Result<DashboardStats, EngineError> {
        let now = now_ms();
        let day = now - now.rem_euclid(DAY_MS);
        // Keyed by UTC day so the "today" count rolls over at midnight.
        let key = CacheKey::entity(Scope::CounselorStats, actor.id).with_params(&format!("stats&day={day}"));
        self.cache
            .get_or_compute(&key, || self.engine.dashboard_stats(actor.id, now))
            .await
    }

    pub async fn upcoming(&self, actor: &Actor, limit: Option<usize>) -> Result<Vec<Appointment>, EngineError> {
        let limit = limit.unwrap_or(DEFAULT_UPCOMING_LIMIT).clamp(1, MAX_UPCOMING_LIMIT);
        let now = now_ms();
        let key = CacheKey::entity(Scope::CounselorStats, actor.id).with_params(&upcoming_params(limit, now));
        self.cache
            .get_or_compute(&key, || self.engine.upcoming(actor.id, now, limit))
            .await
    }

    /// Students who have booked with the calling counselor.
    pub async fn my_students(&self, actor: &Actor) -> Result<Vec<StudentSummary>, EngineError> {
        let key = CacheKey::entity(Scope::CounselorStudents, actor.id);
        self.cache
            .get_or_compute(&key, || self.engine.my_students(actor.id))
            .await
    }

    // ── Session notes ────────────────────────────────────────

    pub async fn create_session_note(&self, actor: &Actor, new: NewSessionNote) -> Result<SessionNote, EngineError> {
        let note = self.engine.create_session_note(actor, new).await?;
        self.cache.invalidate_change(&session_note_change(&note)).await;
        Ok(note)
    }

    /// The calling counselor's notes, newest first.
    pub async fn session_notes(&self, actor: &Actor, filter: SessionNoteFilter) -> Result<Vec<SessionNote>, EngineError> {
        let key = CacheKey::entity(Scope::SessionNotes, actor.id).with_params(&note_filter_params(&filter));
        self.cache
            .get_or_compute(&key, || self.engine.list_session_notes(actor.id, &filter))
            .await
    }

    /// One note. The snapshot is shared, so ownership is checked on every read.
    pub async fn session_note(&self, actor: &Actor, id: Ulid) -> Result<SessionNote, EngineError> {
        let key = CacheKey::entity(Scope::SessionNote, id);
        let note = self
            .cache
            .get_or_compute(&key, || self.engine.get_session_note(actor, id))
            .await?;
        if actor.role != Role::Counselor || note.counselor_id != actor.id {
            return Err(EngineError::Forbidden(id));
        }
        Ok(note)
    }

    pub async fn update_session_note(
        &self,
        actor: &Actor,
        id: Ulid,
        patch: SessionNotePatch,
    ) -> Result<SessionNote, EngineError> {
        let note = self.engine.update_session_note(actor, id, patch).await?;
        self.cache.invalidate_change(&session_note_change(&note)).await;
        Ok(note)
    }

    pub async fn delete_session_note(&self, actor: &Actor, id: Ulid) -> Result<SessionNote, EngineError> {
        let note = self.engine.delete_session_note(actor, id).await?;
        self.cache.invalidate_change(&session_note_change(&note)).await;
        Ok(note)
    }

    // ── Admin ────────────────────────────────────────────────

    /// Every appointment matching `filter`, newest first, capped.
    pub async fn admin_appointments(&self, mut filter: AppointmentFilter) -> Result<Vec<Appointment>, EngineError> {
        filter.order = SortOrder::Descending;
        filter.limit = Some(filter.limit.map_or(ADMIN_LIST_CAP, |l| l.min(ADMIN_LIST_CAP)));
        let key = CacheKey::global(Scope::AdminAppointments).with_params(&filter_params(&filter));
        self.cache
            .get_or_compute(&key, || async { Ok(self.engine.list_appointments(&filter).await) })
            .await
    }

    pub async fn override_appointment(
        &self,
        actor: &Actor,
        id: Ulid,
        change: AppointmentOverride,
    ) -> Result<Appointment, EngineError> {
        let updated = self.engine.override_appointment(actor, id, change).await?;
        Ok(self.committed(updated).await)
    }

    pub async fn delete_appointment(&self, actor: &Actor, id: Ulid) -> Result<Appointment, EngineError> {
        let removed = self.engine.delete_appointment(actor, id).await?;
        Ok(self.committed(removed).await)
    }

    pub async fn analytics(&self, from: Option<Ms>, to: Option<Ms>) -> Result<AppointmentAnalytics, EngineError> {
        let key = CacheKey::global(Scope::Analytics).with_params(&window_params(from, to));
        self.cache
            .get_or_compute(&key, || self.engine.analytics(from, to))
            .await
    }

    pub async fn counselor_detail(&self, id: Ulid) -> Result<CounselorDetail, EngineError> {
        let key = CacheKey::entity(Scope::Counselor, id);
        self.cache
            .get_or_compute(&key, || self.engine.counselor_detail(id))
            .await
    }

    pub async fn create_counselor(&self, id: Ulid, profile: CounselorProfile) -> Result<CounselorInfo, EngineError> {
        let info = self.engine.create_counselor(id, profile).await?;
        self.cache.invalidate_change(&EntityChange::Counselor { id }).await;
        Ok(info)
    }

    pub async fn update_counselor(&self, id: Ulid, patch: CounselorPatch) -> Result<CounselorInfo, EngineError> {
        let info = self.engine.update_counselor(id, patch).await?;
        self.cache.invalidate_change(&EntityChange::Counselor { id }).await;
        Ok(info)
    }

    pub async fn delete_counselor(&self, id: Ulid) -> Result<(), EngineError> {
        self.engine.delete_counselor(id).await?;
        self.cache.invalidate_change(&EntityChange::Counselor { id }).await;
        Ok(())
    }
}
