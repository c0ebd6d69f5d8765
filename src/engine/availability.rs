use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Spans held by date-blocking bookings (Pending or Paid), clamped to the
/// query window, sorted and merged. Cancelled and Completed stays never
/// appear here.
pub fn blocked_spans(room: &RoomState, query: &Span) -> Vec<Span> {
    let mut blocked: Vec<Span> = room
        .overlapping(query)
        .filter(|b| b.status.blocks_room())
        .map(|b| {
            Span::new(
                b.span.start.max(query.start),
                b.span.end.min(query.end),
            )
        })
        .collect();
    blocked.sort_by_key(|s| s.start);
    merge_overlapping(&blocked)
}

/// Free sub-windows of `query`: the whole window minus every blocked span.
/// This is what a room-search front end renders as open dates.
pub fn free_spans(room: &RoomState, query: &Span) -> Vec<Span> {
    let blocked = blocked_spans(room, query);
    if blocked.is_empty() {
        return vec![*query];
    }
    subtract_intervals(std::slice::from_ref(query), &blocked)
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

/// Subtract `to_remove` (sorted, disjoint) from each span in `base`.
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
