//! Invalidation registry.
//!
//! Maps each kind of entity change to the cache scopes it makes stale. The
//! table is static: adding a cached read means adding its scope here, in one
//! place, rather than at every write site.

use ulid::Ulid;

use super::keys::{InvalidationScope, Scope};

/// A committed write, described by the ids that cached reads are keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityChange {
    Appointment {
        id: Ulid,
        student_id: Ulid,
        counselor_id: Ulid,
    },
    Counselor {
        id: Ulid,
    },
    SessionNote {
        id: Ulid,
        counselor_id: Ulid,
    },
}

/// Which id of the change narrows a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    /// Clear the whole scope.
    All,
    /// The changed entity's own id.
    Own,
    Student,
    Counselor,
}

struct Rule {
    scope: Scope,
    binding: Binding,
}

const APPOINTMENT_RULES: &[Rule] = &[
    Rule { scope: Scope::Appointment, binding: Binding::Own },
    Rule { scope: Scope::StudentAppointments, binding: Binding::Student },
    Rule { scope: Scope::CounselorAppointments, binding: Binding::Counselor },
    Rule { scope: Scope::CounselorSlots, binding: Binding::Counselor },
    Rule { scope: Scope::CounselorStats, binding: Binding::Counselor },
    // Counselor detail carries an appointment count.
    Rule { scope: Scope::Counselor, binding: Binding::Counselor },
    Rule { scope: Scope::CounselorStudents, binding: Binding::Counselor },
    Rule { scope: Scope::AdminAppointments, binding: Binding::All },
    Rule { scope: Scope::Analytics, binding: Binding::All },
];

const COUNSELOR_RULES: &[Rule] = &[
    Rule { scope: Scope::Counselors, binding: Binding::All },
    Rule { scope: Scope::Counselor, binding: Binding::Own },
    Rule { scope: Scope::CounselorSlots, binding: Binding::Own },
];

const SESSION_NOTE_RULES: &[Rule] = &[
    Rule { scope: Scope::SessionNote, binding: Binding::Own },
    Rule { scope: Scope::SessionNotes, binding: Binding::Counselor },
];

impl EntityChange {
    fn rules(&self) -> &'static [Rule] {
        match self {
            EntityChange::Appointment { .. } => APPOINTMENT_RULES,
            EntityChange::Counselor { .. } => COUNSELOR_RULES,
            EntityChange::SessionNote { .. } => SESSION_NOTE_RULES,
        }
    }

    fn bind(&self, binding: Binding) -> Option<Ulid> {
        match (self, binding) {
            (_, Binding::All) => None,
            (EntityChange::Appointment { id, .. }, Binding::Own) => Some(*id),
            (EntityChange::Appointment { student_id, .. }, Binding::Student) => Some(*student_id),
            (EntityChange::Appointment { counselor_id, .. }, Binding::Counselor) => Some(*counselor_id),
            (EntityChange::Counselor { id }, Binding::Own | Binding::Counselor) => Some(*id),
            (EntityChange::SessionNote { id, .. }, Binding::Own) => Some(*id),
            (EntityChange::SessionNote { counselor_id, .. }, Binding::Counselor) => Some(*counselor_id),
            // Counselor and note rules never bind a student.
            (EntityChange::Counselor { .. } | EntityChange::SessionNote { .. }, Binding::Student) => None,
        }
    }

    /// Scopes to clear after this change commits.
    pub fn scopes(&self) -> Vec<InvalidationScope> {
        self.rules()
            .iter()
            .map(|rule| InvalidationScope {
                scope: rule.scope,
                entity: self.bind(rule.binding),
            })
            .collect()
    }
}
