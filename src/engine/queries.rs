use std::collections::HashMap;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{booked_spans, free_spans};
use super::conflict::validate_window;
use super::{Engine, EngineError};

fn sort_appointments(appointments: &mut [Appointment], order: SortOrder) {
    appointments.sort_by(|a, b| {
        let ord = a.span.start.cmp(&b.span.start).then(a.id.cmp(&b.id));
        match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    });
}

impl Engine {
    /// Fetch one appointment. Ownership is checked by the caller.
    pub async fn get_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        let counselor_id = self
            .counselor_for_appointment(&id)
            .ok_or(EngineError::NotFound(id))?;
        let cs = self
            .get_counselor(&counselor_id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = cs.read().await;
        guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Appointments matching `filter`, ordered by start time and truncated to `filter.limit`.
    ///
    /// A counselor filter reads only that counselor's calendar; otherwise every
    /// counselor is scanned, one read lock at a time.
    pub async fn list_appointments(&self, filter: &AppointmentFilter) -> Vec<Appointment> {
        let handles = match filter.counselor_id {
            Some(cid) => self.get_counselor(&cid).into_iter().collect(),
            None => self.counselor_handles(),
        };

        let mut out = Vec::new();
        for cs in handles {
            let guard = cs.read().await;
            out.extend(guard.appointments.iter().filter(|a| filter.matches(a)).cloned());
        }
        sort_appointments(&mut out, filter.order);
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        out
    }

    /// Booked and free spans of a counselor inside `[start, end)`.
    pub async fn slots(&self, counselor_id: Ulid, start: Ms, end: Ms) -> Result<SlotsView, EngineError> {
        let window = validate_window(start, end)?;
        let cs = self
            .get_counselor(&counselor_id)
            .ok_or(EngineError::NotFound(counselor_id))?;
        let guard = cs.read().await;
        Ok(SlotsView {
            counselor_id,
            window,
            booked: booked_spans(&guard, &window),
            free: free_spans(&guard, &window),
        })
    }

    /// Counts for the counselor dashboard. "Today" is the UTC day containing `now`.
    pub async fn dashboard_stats(&self, counselor_id: Ulid, now: Ms) -> Result<DashboardStats, EngineError> {
        let cs = self
            .get_counselor(&counselor_id)
            .ok_or(EngineError::NotFound(counselor_id))?;
        let guard = cs.read().await;

        let day_start = now - now.rem_euclid(DAY_MS);
        let today = Span::new(day_start, day_start + DAY_MS);

        let mut stats = DashboardStats {
            total_appointments: guard.appointments.len(),
            pending_appointments: 0,
            confirmed_appointments: 0,
            today_appointments: 0,
        };
        for a in &guard.appointments {
            match a.status {
                AppointmentStatus::Pending => stats.pending_appointments += 1,
                AppointmentStatus::Confirmed => stats.confirmed_appointments += 1,
                _ => {}
            }
            if today.contains_instant(a.span.start) {
                stats.today_appointments += 1;
            }
        }
        Ok(stats)
    }

    /// Active appointments starting at or after `now`, soonest first.
    pub async fn upcoming(
        &self,
        counselor_id: Ulid,
        now: Ms,
        limit: usize,
    ) -> Result<Vec<Appointment>, EngineError> {
        let cs = self
            .get_counselor(&counselor_id)
            .ok_or(EngineError::NotFound(counselor_id))?;
        let guard = cs.read().await;
        let limit = limit.clamp(1, MAX_UPCOMING_LIMIT);
        let from = guard.appointments.partition_point(|a| a.span.start < now);
        Ok(guard.appointments[from..]
            .iter()
            .filter(|a| a.status.is_active())
            .take(limit)
            .cloned()
            .collect())
    }

    /// Fetch one session note owned by the calling counselor.
    pub async fn get_session_note(&self, actor: &Actor, id: Ulid) -> Result<SessionNote, EngineError> {
        let counselor_id = self
            .counselor_for_session_note(&id)
            .ok_or(EngineError::NotFound(id))?;
        let cs = self.get_counselor(&counselor_id).ok_or(EngineError::NotFound(id))?;
        let guard = cs.read().await;
        let note = guard.session_note(id).cloned().ok_or(EngineError::NotFound(id))?;
        if actor.role != Role::Counselor || note.counselor_id != actor.id {
            return Err(EngineError::Forbidden(id));
        }
        Ok(note)
    }

    /// A counselor's session notes matching `filter`, newest first.
    pub async fn list_session_notes(
        &self,
        counselor_id: Ulid,
        filter: &SessionNoteFilter,
    ) -> Result<Vec<SessionNote>, EngineError> {
        let cs = self
            .get_counselor(&counselor_id)
            .ok_or(EngineError::NotFound(counselor_id))?;
        let guard = cs.read().await;
        let mut out: Vec<SessionNote> = guard
            .session_notes
            .iter()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    /// Every student who has booked with the counselor, most recently seen first.
    pub async fn my_students(&self, counselor_id: Ulid) -> Result<Vec<StudentSummary>, EngineError> {
        let cs = self
            .get_counselor(&counselor_id)
            .ok_or(EngineError::NotFound(counselor_id))?;
        let guard = cs.read().await;

        let mut roster: HashMap<Ulid, StudentSummary> = HashMap::new();
        for a in &guard.appointments {
            let row = roster.entry(a.student_id).or_insert(StudentSummary {
                student_id: a.student_id,
                total_appointments: 0,
                completed_appointments: 0,
                last_appointment_at: a.span.start,
            });
            row.total_appointments += 1;
            if a.status == AppointmentStatus::Completed {
                row.completed_appointments += 1;
            }
            row.last_appointment_at = row.last_appointment_at.max(a.span.start);
        }

        let mut out: Vec<StudentSummary> = roster.into_values().collect();
        out.sort_by(|a, b| {
            b.last_appointment_at
                .cmp(&a.last_appointment_at)
                .then(a.student_id.cmp(&b.student_id))
        });
        Ok(out)
    }

    /// Counselor directory sorted by name, optionally narrowed to one department.
    pub async fn list_counselors(&self, department: Option<&str>) -> Vec<CounselorInfo> {
        let mut out = Vec::new();
        for cs in self.counselor_handles() {
            let guard = cs.read().await;
            let listed = department.is_none_or(|d| {
                guard
                    .profile
                    .departments
                    .iter()
                    .any(|dep| dep.eq_ignore_ascii_case(d))
            });
            if listed {
                out.push(guard.info());
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn counselor_detail(&self, id: Ulid) -> Result<CounselorDetail, EngineError> {
        let cs = self.get_counselor(&id).ok_or(EngineError::NotFound(id))?;
        let guard = cs.read().await;
        Ok(CounselorDetail {
            info: guard.info(),
            total_appointments: guard.appointments.len(),
        })
    }

    /// Appointment counts by status plus the busiest counselors, over appointments
    /// whose start lies within the optional inclusive bounds.
    pub async fn analytics(&self, from: Option<Ms>, to: Option<Ms>) -> Result<AppointmentAnalytics, EngineError> {
        if let (Some(f), Some(t)) = (from, to)
            && f > t {
                return Err(EngineError::InvalidRange(Span { start: f, end: t }));
            }
        let filter = AppointmentFilter {
            from,
            to,
            ..Default::default()
        };

        let mut by_status: HashMap<AppointmentStatus, usize> = HashMap::new();
        let mut top_counselors = Vec::new();
        for cs in self.counselor_handles() {
            let guard = cs.read().await;
            let mut count = 0;
            for a in guard.appointments.iter().filter(|a| filter.matches(a)) {
                *by_status.entry(a.status).or_default() += 1;
                count += 1;
            }
            if count > 0 {
                top_counselors.push(CounselorCount {
                    counselor_id: guard.id,
                    count,
                });
            }
        }

        top_counselors.sort_by(|a, b| b.count.cmp(&a.count).then(a.counselor_id.cmp(&b.counselor_id)));
        top_counselors.truncate(TOP_COUNSELORS);

        Ok(AppointmentAnalytics {
            by_status: AppointmentStatus::ALL
                .into_iter()
                .filter_map(|status| {
                    by_status
                        .get(&status)
                        .map(|&count| StatusCount { status, count })
                })
                .collect(),
            top_counselors,
        })
    }
}
