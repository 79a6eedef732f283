//! Cache key definitions.
//!
//! A key is `scope:entity:params`. The entity slot holds the ULID the entry
//! belongs to (`_` when the entry is global); the params slot holds the hex
//! SHA-256 of a canonical parameter string (`-` when there are none). Keeping
//! the entity ahead of the params lets one prefix scan clear every variant of
//! an entity's entries.

use std::fmt;
use std::time::Duration;

use sha2::{Digest, Sha256};
use ulid::Ulid;

use crate::model::{AppointmentFilter, Ms, SessionNoteFilter, SortOrder};

/// Families of cached reads. Each has its own TTL and key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A single appointment by id.
    Appointment,
    /// A student's own appointment list.
    StudentAppointments,
    /// A counselor's appointment lists (including per-student history).
    CounselorAppointments,
    /// The admin-wide appointment list.
    AdminAppointments,
    /// Booked and free spans of a counselor.
    CounselorSlots,
    /// Dashboard stats and upcoming list of a counselor.
    CounselorStats,
    /// Admin analytics.
    Analytics,
    /// Counselor directory.
    Counselors,
    /// One counselor's detail.
    Counselor,
    /// A counselor's roster of students.
    CounselorStudents,
    /// A single session note by id.
    SessionNote,
    /// A counselor's session note listings.
    SessionNotes,
}

impl Scope {
    pub const ALL: [Scope; 12] = [
        Scope::Appointment,
        Scope::StudentAppointments,
        Scope::CounselorAppointments,
        Scope::AdminAppointments,
        Scope::CounselorSlots,
        Scope::CounselorStats,
        Scope::Analytics,
        Scope::Counselors,
        Scope::Counselor,
        Scope::CounselorStudents,
        Scope::SessionNote,
        Scope::SessionNotes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Appointment => "appointment",
            Scope::StudentAppointments => "student_appointments",
            Scope::CounselorAppointments => "counselor_appointments",
            Scope::AdminAppointments => "admin_appointments",
            Scope::CounselorSlots => "counselor_slots",
            Scope::CounselorStats => "counselor_stats",
            Scope::Analytics => "analytics",
            Scope::Counselors => "counselors",
            Scope::Counselor => "counselor",
            Scope::CounselorStudents => "counselor_students",
            Scope::SessionNote => "session_note",
            Scope::SessionNotes => "session_notes",
        }
    }

    pub fn ttl(self) -> Duration {
        let secs = match self {
            Scope::Appointment | Scope::StudentAppointments | Scope::CounselorAppointments => 60,
            Scope::AdminAppointments | Scope::CounselorSlots | Scope::CounselorStats => 30,
            Scope::Analytics | Scope::CounselorStudents => 60,
            Scope::Counselors | Scope::Counselor | Scope::SessionNote | Scope::SessionNotes => 300,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: Scope,
    pub entity: Option<Ulid>,
    pub params: Option<String>,
}

impl CacheKey {
    pub fn global(scope: Scope) -> Self {
        Self {
            scope,
            entity: None,
            params: None,
        }
    }

    pub fn entity(scope: Scope, id: Ulid) -> Self {
        Self {
            scope,
            entity: Some(id),
            params: None,
        }
    }

    /// Attach the hash of a canonical parameter string.
    pub fn with_params(mut self, canonical: &str) -> Self {
        self.params = Some(hash_params(canonical));
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scope)?;
        match &self.entity {
            Some(id) => write!(f, "{id}:")?,
            None => f.write_str("_:")?,
        }
        f.write_str(self.params.as_deref().unwrap_or("-"))
    }
}

/// A set of keys to drop: a whole scope, or one entity within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvalidationScope {
    pub scope: Scope,
    pub entity: Option<Ulid>,
}

impl InvalidationScope {
    pub fn all(scope: Scope) -> Self {
        Self { scope, entity: None }
    }

    pub fn entity(scope: Scope, id: Ulid) -> Self {
        Self {
            scope,
            entity: Some(id),
        }
    }

    /// Key prefix matched by this scope.
    pub fn prefix(&self) -> String {
        match self.entity {
            Some(id) => format!("{}:{id}:", self.scope),
            None => format!("{}:", self.scope),
        }
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        key.scope == self.scope && self.entity.is_none_or(|id| key.entity == Some(id))
    }
}

/// Hex SHA-256 of a canonical parameter string.
pub fn hash_params(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Canonical form of a listing filter: fixed field order, empty for unset.
pub fn filter_params(filter: &AppointmentFilter) -> String {
    let order = match filter.order {
        SortOrder::Ascending => "asc",
        SortOrder::Descending => "desc",
    };
    format!(
        "student={}&counselor={}&status={}&from={}&to={}&order={order}&limit={}",
        opt(filter.student_id),
        opt(filter.counselor_id),
        opt(filter.status),
        opt(filter.from),
        opt(filter.to),
        opt(filter.limit),
    )
}

/// Canonical form of a session note filter.
pub fn note_filter_params(filter: &SessionNoteFilter) -> String {
    format!(
        "student={}&from={}&to={}",
        opt(filter.student_id),
        opt(filter.from),
        opt(filter.to),
    )
}

/// Canonical form of a time window query.
pub fn window_params(start: Option<Ms>, end: Option<Ms>) -> String {
    format!("start={}&end={}", opt(start), opt(end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppointmentStatus;

    #[test]
    fn key_rendering() {
        let id = Ulid::new();
        assert_eq!(CacheKey::global(Scope::Counselors).to_string(), "counselors:_:-");
        assert_eq!(
            CacheKey::entity(Scope::Appointment, id).to_string(),
            format!("appointment:{id}:-")
        );
        let hashed = CacheKey::entity(Scope::CounselorSlots, id).with_params("start=1&end=2");
        let rendered = hashed.to_string();
        let params = rendered.rsplit(':').next().unwrap();
        assert_eq!(params.len(), 64);
        assert!(params.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn params_hash_is_deterministic() {
        let filter = AppointmentFilter {
            status: Some(AppointmentStatus::Pending),
            from: Some(1_000),
            ..Default::default()
        };
        assert_eq!(hash_params(&filter_params(&filter)), hash_params(&filter_params(&filter.clone())));

        let other = AppointmentFilter {
            status: Some(AppointmentStatus::Confirmed),
            ..filter.clone()
        };
        assert_ne!(filter_params(&filter), filter_params(&other));
    }

    #[test]
    fn unset_bounds_differ_from_zero() {
        assert_ne!(window_params(None, Some(5)), window_params(Some(0), Some(5)));
    }

    #[test]
    fn scope_prefixes_do_not_collide() {
        // No scope's prefix may match another scope's keys.
        for a in Scope::ALL {
            let prefix = InvalidationScope::all(a).prefix();
            for b in Scope::ALL {
                if a == b {
                    continue;
                }
                let key = CacheKey::global(b).to_string();
                assert!(!key.starts_with(&prefix), "{prefix} matches {key}");
            }
        }
    }

    #[test]
    fn entity_prefix_covers_all_param_variants() {
        let id = Ulid::new();
        let inv = InvalidationScope::entity(Scope::StudentAppointments, id);
        for params in ["a", "b", "status=pending"] {
            let key = CacheKey::entity(Scope::StudentAppointments, id).with_params(params);
            assert!(key.to_string().starts_with(&inv.prefix()));
            assert!(inv.matches(&key));
        }
        let stranger = CacheKey::entity(Scope::StudentAppointments, Ulid::new());
        assert!(!stranger.to_string().starts_with(&inv.prefix()));
        assert!(!inv.matches(&stranger));
    }

    #[test]
    fn ttls_follow_volatility() {
        assert_eq!(Scope::AdminAppointments.ttl(), Duration::from_secs(30));
        assert_eq!(Scope::Appointment.ttl(), Duration::from_secs(60));
        assert_eq!(Scope::Counselors.ttl(), Duration::from_secs(300));
        assert_eq!(Scope::SessionNotes.ttl(), Duration::from_secs(300));
        assert_eq!(Scope::CounselorStudents.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn note_filters_hash_apart() {
        let student = Ulid::new();
        let narrowed = SessionNoteFilter {
            student_id: Some(student),
            ..Default::default()
        };
        assert_ne!(
            note_filter_params(&narrowed),
            note_filter_params(&SessionNoteFilter::default())
        );
        assert_ne!(
            note_filter_params(&SessionNoteFilter { from: Some(0), ..Default::default() }),
            note_filter_params(&SessionNoteFilter::default())
        );
    }
}
