use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before unix epoch")
        .as_millis() as Ms
}

/// Validate a requested stay and turn it into a Span.
/// A stay must start in the future; availability queries use
/// `validate_window` instead, which has no past restriction.
pub(crate) fn validate_stay(check_in: Ms, check_out: Ms, now: Ms) -> Result<Span, EngineError> {
    if check_out <= check_in {
        return Err(EngineError::InvalidDateRange(
            "check-out must be after check-in",
        ));
    }
    if check_in < MIN_VALID_TIMESTAMP_MS || check_out > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::InvalidDateRange("timestamp out of range"));
    }
    if check_in < now {
        return Err(EngineError::InvalidDateRange("check-in is in the past"));
    }
    if check_out - check_in > MAX_STAY_DURATION_MS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(Span::new(check_in, check_out))
}

pub(crate) fn validate_window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if end <= start {
        return Err(EngineError::InvalidDateRange("window end before start"));
    }
    if end - start > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(Span::new(start, end))
}

/// The overlap rule: two half-open stays conflict iff
/// `a.start < b.end && b.start < a.end`. Only Pending and Paid bookings
/// block; `exclude` skips one booking id (rebooking checks).
pub(crate) fn check_no_conflict(
    room: &RoomState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for booking in room.overlapping(span) {
        if exclude == Some(booking.id) {
            continue;
        }
        if booking.status.blocks_room() {
            return Err(EngineError::DateConflict(booking.id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn room_with(status: BookingStatus, start: Ms, end: Ms) -> (RoomState, Ulid) {
        let mut room = RoomState::new(
            Ulid::new(),
            None,
            "standard".into(),
            Decimal::new(100000, 2),
            2,
        );
        let id = Ulid::new();
        room.insert_booking(BookingRecord {
            id,
            customer_id: Ulid::new(),
            span: Span::new(start, end),
            guests: 2,
            total: Decimal::new(100000, 2),
            status,
            addons: Vec::new(),
            payments: Vec::new(),
        });
        (room, id)
    }

    #[test]
    fn validate_stay_rejects_inverted_range() {
        let now = MIN_VALID_TIMESTAMP_MS + DAY_MS;
        let r = validate_stay(now + 2 * DAY_MS, now + DAY_MS, now);
        assert!(matches!(r, Err(EngineError::InvalidDateRange(_))));
    }

    #[test]
    fn validate_stay_rejects_past_check_in() {
        let now = MIN_VALID_TIMESTAMP_MS + 10 * DAY_MS;
        let r = validate_stay(now - DAY_MS, now + DAY_MS, now);
        assert!(matches!(r, Err(EngineError::InvalidDateRange(_))));
    }

    #[test]
    fn validate_stay_rejects_marathon() {
        let now = MIN_VALID_TIMESTAMP_MS + DAY_MS;
        let r = validate_stay(now, now + MAX_STAY_DURATION_MS + DAY_MS, now);
        assert!(matches!(r, Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn conflict_with_pending() {
        let (room, existing) = room_with(BookingStatus::Pending, DAY_MS, 3 * DAY_MS);
        let r = check_no_conflict(&room, &Span::new(2 * DAY_MS, 4 * DAY_MS), None);
        assert!(matches!(r, Err(EngineError::DateConflict(id)) if id == existing));
    }

    #[test]
    fn no_conflict_with_cancelled() {
        let (room, _) = room_with(BookingStatus::Cancelled, DAY_MS, 3 * DAY_MS);
        check_no_conflict(&room, &Span::new(2 * DAY_MS, 4 * DAY_MS), None).unwrap();
    }

    #[test]
    fn back_to_back_is_not_a_conflict() {
        let (room, _) = room_with(BookingStatus::Paid, DAY_MS, 3 * DAY_MS);
        check_no_conflict(&room, &Span::new(3 * DAY_MS, 5 * DAY_MS), None).unwrap();
    }

    #[test]
    fn exclude_skips_own_booking() {
        let (room, existing) = room_with(BookingStatus::Paid, DAY_MS, 3 * DAY_MS);
        check_no_conflict(&room, &Span::new(2 * DAY_MS, 4 * DAY_MS), Some(existing)).unwrap();
    }
}
