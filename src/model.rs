use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

/// Which of the three overlap shapes an existing span has relative to a proposed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapCase {
    /// The existing span contains the proposed start.
    ContainsStart,
    /// The existing span contains the proposed end.
    ContainsEnd,
    /// The proposed span fully contains the existing one.
    Engulfed,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Classify how `self` (an existing span) collides with `proposed`.
    /// `None` exactly when the two do not overlap.
    pub fn overlap_case(&self, proposed: &Span) -> Option<OverlapCase> {
        if self.contains_instant(proposed.start) {
            Some(OverlapCase::ContainsStart)
        } else if self.start < proposed.end && proposed.end <= self.end {
            Some(OverlapCase::ContainsEnd)
        } else if proposed.contains_span(self) {
            Some(OverlapCase::Engulfed)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    NoShow,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::NoShow,
        AppointmentStatus::Cancelled,
    ];

    /// Pending and confirmed appointments can still move through the FSM.
    pub fn is_active(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    /// Everything except cancelled and no-show keeps the counselor's time
    /// taken, including sessions that already happened.
    pub fn holds_slot(self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::NoShow => "no_show",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown appointment status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Counselor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Counselor => "counselor",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "counselor" => Ok(Role::Counselor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The authenticated caller, as handed to us by the upstream HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn student(id: Ulid) -> Self {
        Self { id, role: Role::Student }
    }

    pub fn counselor(id: Ulid) -> Self {
        Self { id, role: Role::Counselor }
    }

    pub fn admin(id: Ulid) -> Self {
        Self { id, role: Role::Admin }
    }
}

/// A scheduled counseling session between one student and one counselor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub student_id: Ulid,
    pub counselor_id: Ulid,
    pub span: Span,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounselorProfile {
    pub name: String,
    pub office: Option<String>,
    pub phone: Option<String>,
    pub departments: Vec<String>,
}

/// Partial profile update. Unset fields keep their value; an empty office or
/// phone clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounselorPatch {
    pub name: Option<String>,
    pub office: Option<String>,
    pub phone: Option<String>,
    pub departments: Option<Vec<String>>,
}

impl CounselorPatch {
    pub fn apply(self, current: &CounselorProfile) -> CounselorProfile {
        let clearable = |value: Option<String>, old: &Option<String>| match value {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
            None => old.clone(),
        };
        CounselorProfile {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            office: clearable(self.office, &current.office),
            phone: clearable(self.phone, &current.phone),
            departments: self.departments.unwrap_or_else(|| current.departments.clone()),
        }
    }
}

/// A counselor's private record of a session, tied to one of their appointments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNote {
    pub id: Ulid,
    pub appointment_id: Ulid,
    pub counselor_id: Ulid,
    pub student_id: Ulid,
    pub notes: String,
    pub observations: Option<String>,
    pub recommendations: Option<String>,
    pub follow_up: Option<Ms>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// Partial session note update. Unset fields keep their value; an empty
/// observation or recommendation clears it, as does a follow-up of `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionNotePatch {
    pub notes: Option<String>,
    pub observations: Option<String>,
    pub recommendations: Option<String>,
    pub follow_up: Option<Option<Ms>>,
}

impl SessionNotePatch {
    pub fn apply(self, current: &SessionNote, at: Ms) -> SessionNote {
        let clearable = |value: Option<String>, old: &Option<String>| match value {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
            None => old.clone(),
        };
        SessionNote {
            notes: self.notes.unwrap_or_else(|| current.notes.clone()),
            observations: clearable(self.observations, &current.observations),
            recommendations: clearable(self.recommendations, &current.recommendations),
            follow_up: self.follow_up.unwrap_or(current.follow_up),
            updated_at: at,
            ..current.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct CounselorState {
    pub id: Ulid,
    pub profile: CounselorProfile,
    /// All appointments ever booked with this counselor, sorted by `span.start`.
    pub appointments: Vec<Appointment>,
    /// Session notes in creation order.
    pub session_notes: Vec<SessionNote>,
}

impl CounselorState {
    pub fn new(id: Ulid, profile: CounselorProfile) -> Self {
        Self {
            id,
            profile,
            appointments: Vec::new(),
            session_notes: Vec::new(),
        }
    }

    /// Insert appointment maintaining sort order by span.start.
    pub fn insert_appointment(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .binary_search_by_key(&appointment.span.start, |a| a.span.start)
            .unwrap_or_else(|e| e);
        self.appointments.insert(pos, appointment);
    }

    pub fn remove_appointment(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn appointment(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn appointment_mut(&mut self, id: Ulid) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == id)
    }

    pub fn session_note(&self, id: Ulid) -> Option<&SessionNote> {
        self.session_notes.iter().find(|n| n.id == id)
    }

    /// Replace a note in place, or append it if unknown.
    pub fn upsert_session_note(&mut self, note: SessionNote) {
        match self.session_notes.iter_mut().find(|n| n.id == note.id) {
            Some(slot) => *slot = note,
            None => self.session_notes.push(note),
        }
    }

    pub fn remove_session_note(&mut self, id: Ulid) -> Option<SessionNote> {
        let pos = self.session_notes.iter().position(|n| n.id == id)?;
        Some(self.session_notes.remove(pos))
    }

    pub fn has_session_notes_for(&self, appointment_id: Ulid) -> bool {
        self.session_notes.iter().any(|n| n.appointment_id == appointment_id)
    }

    /// Return only appointments whose span overlaps the query window.
    /// Uses binary search to skip appointments starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        let right_bound = self
            .appointments
            .partition_point(|a| a.span.start < query.end);
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.span.end > query.start)
    }

    pub fn info(&self) -> CounselorInfo {
        CounselorInfo {
            id: self.id,
            name: self.profile.name.clone(),
            office: self.profile.office.clone(),
            phone: self.profile.phone.clone(),
            departments: self.profile.departments.clone(),
        }
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CounselorCreated {
        id: Ulid,
        profile: CounselorProfile,
    },
    CounselorUpdated {
        id: Ulid,
        profile: CounselorProfile,
    },
    CounselorDeleted {
        id: Ulid,
    },
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentStatusChanged {
        id: Ulid,
        counselor_id: Ulid,
        status: AppointmentStatus,
        at: Ms,
    },
    /// One edit or override, applied as a unit. Unset fields are unchanged.
    AppointmentRevised {
        id: Ulid,
        counselor_id: Ulid,
        span: Option<Span>,
        status: Option<AppointmentStatus>,
        notes: Option<Option<String>>,
        at: Ms,
    },
    AppointmentDeleted {
        id: Ulid,
        counselor_id: Ulid,
    },
    SessionNoteCreated {
        note: SessionNote,
    },
    SessionNoteUpdated {
        note: SessionNote,
    },
    SessionNoteDeleted {
        id: Ulid,
        counselor_id: Ulid,
    },
}

// ── Query types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounselorInfo {
    pub id: Ulid,
    pub name: String,
    pub office: Option<String>,
    pub phone: Option<String>,
    pub departments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounselorDetail {
    #[serde(flatten)]
    pub info: CounselorInfo,
    pub total_appointments: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Filters for appointment listings. Date bounds apply to the start time and
/// are inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AppointmentFilter {
    pub student_id: Option<Ulid>,
    pub counselor_id: Option<Ulid>,
    pub status: Option<AppointmentStatus>,
    pub from: Option<Ms>,
    pub to: Option<Ms>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.student_id.is_none_or(|s| appointment.student_id == s)
            && self.counselor_id.is_none_or(|c| appointment.counselor_id == c)
            && self.status.is_none_or(|s| appointment.status == s)
            && self.from.is_none_or(|from| appointment.span.start >= from)
            && self.to.is_none_or(|to| appointment.span.start <= to)
    }
}

/// Filters for a counselor's session notes. Date bounds apply to `created_at`
/// and are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SessionNoteFilter {
    pub student_id: Option<Ulid>,
    pub from: Option<Ms>,
    pub to: Option<Ms>,
}

impl SessionNoteFilter {
    pub fn matches(&self, note: &SessionNote) -> bool {
        self.student_id.is_none_or(|s| note.student_id == s)
            && self.from.is_none_or(|from| note.created_at >= from)
            && self.to.is_none_or(|to| note.created_at <= to)
    }
}

/// One row of a counselor's student roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub student_id: Ulid,
    pub total_appointments: usize,
    pub completed_appointments: usize,
    pub last_appointment_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotsView {
    pub counselor_id: Ulid,
    pub window: Span,
    pub booked: Vec<Span>,
    pub free: Vec<Span>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_appointments: usize,
    pub pending_appointments: usize,
    pub confirmed_appointments: usize,
    pub today_appointments: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: AppointmentStatus,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounselorCount {
    pub counselor_id: Ulid,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentAnalytics {
    pub by_status: Vec<StatusCount>,
    pub top_counselors: Vec<CounselorCount>,
}
