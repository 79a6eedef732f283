use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Build a span from raw bounds, rejecting empty or inverted ranges.
pub(crate) fn validate_range(start: Ms, end: Ms) -> Result<Span, EngineError> {
    use crate::limits::*;
    if start >= end {
        return Err(EngineError::InvalidRange(Span { start, end }));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_APPOINTMENT_DURATION_MS {
        return Err(EngineError::LimitExceeded("appointment too long"));
    }
    Ok(span)
}

/// Slot windows may be wider than an appointment but stay inside the valid
/// timestamp range.
pub(crate) fn validate_window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    use crate::limits::*;
    if start >= end {
        return Err(EngineError::InvalidRange(Span { start, end }));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    match end.checked_sub(start) {
        Some(width) if width <= MAX_QUERY_WINDOW_MS => Ok(Span::new(start, end)),
        _ => Err(EngineError::LimitExceeded("query window too wide")),
    }
}

/// Reject `span` if it collides with any appointment of the counselor that
/// still holds its slot. Completed sessions count; cancelled and no-show do not.
/// `exclude` skips the appointment being moved during a reschedule.
pub(crate) fn check_no_conflict(
    cs: &CounselorState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for existing in cs.overlapping(span) {
        if Some(existing.id) == exclude || !existing.status.holds_slot() {
            continue;
        }
        if let Some(case) = existing.span.overlap_case(span) {
            tracing::debug!(
                counselor = %cs.id,
                appointment = %existing.id,
                ?case,
                "booking conflict"
            );
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::Conflict {
                appointment: existing.id,
                slot: existing.span,
            });
        }
    }
    Ok(())
}
