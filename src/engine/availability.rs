use crate::model::*;

// ── Slot computation ──────────────────────────────────────────────

/// Spans held by slot-holding appointments that start inside `window`, sorted by start.
///
/// Matches the booking view students see: an appointment that began before the
/// window is not listed even if it runs into it.
pub fn booked_spans(counselor: &CounselorState, window: &Span) -> Vec<Span> {
    counselor
        .overlapping(window)
        .filter(|a| a.status.holds_slot() && window.contains_instant(a.span.start))
        .map(|a| a.span)
        .collect()
}

/// Free time inside `window`: the window minus every slot-holding appointment
/// overlapping it (clamped to the window).
pub fn free_spans(counselor: &CounselorState, window: &Span) -> Vec<Span> {
    let mut busy: Vec<Span> = counselor
        .overlapping(window)
        .filter(|a| a.status.holds_slot())
        .map(|a| Span::new(a.span.start.max(window.start), a.span.end.min(window.end)))
        .collect();
    busy.sort_by_key(|s| s.start);
    let busy = merge_overlapping(&busy);
    subtract_intervals(&[*window], &busy)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Remove sorted, disjoint `to_remove` spans from sorted `base` spans.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
