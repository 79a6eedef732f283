use crate::model::Ms;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single session may not run longer than a working day.
pub const MAX_APPOINTMENT_DURATION_MS: Ms = 12 * 3_600_000;
/// Slot windows are capped at 92 days. Analytics date ranges are not.
pub const MAX_QUERY_WINDOW_MS: Ms = 92 * 86_400_000;

pub const MAX_COUNSELORS: usize = 10_000;
pub const MAX_APPOINTMENTS_PER_COUNSELOR: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTES_LEN: usize = 4_096;
pub const MAX_SESSION_NOTES_PER_COUNSELOR: usize = 100_000;
pub const MAX_DEPARTMENTS: usize = 32;

/// Admin listings return at most this many rows.
pub const ADMIN_LIST_CAP: usize = 100;
pub const DEFAULT_UPCOMING_LIMIT: usize = 10;
pub const MAX_UPCOMING_LIMIT: usize = 100;
pub const TOP_COUNSELORS: usize = 10;
