use chrono::{Duration, NaiveDate};

use crate::model::*;

use super::EngineError;

// ── Slot grid ─────────────────────────────────────────────

/// Tile `day` from `hours.open` with back-to-back slots of `duration_minutes`.
///
/// A slot is emitted only if it fits entirely before `hours.close`, so the
/// grid has `floor((close - open) / duration)` entries. A slot is unavailable
/// when any pending/confirmed interval in `intervals` overlaps it; cancelled
/// and completed intervals are ignored. `intervals` need not be sorted.
///
/// Rejects a non-positive duration before doing anything else: stepping by
/// zero would never reach `close`. Any positive duration is accepted; one
/// longer than the working window just yields an empty grid.
pub fn slot_grid(
    intervals: &[Interval],
    day: NaiveDate,
    hours: WorkingHours,
    duration_minutes: i64,
) -> Result<Vec<Slot>, EngineError> {
    if duration_minutes <= 0 {
        return Err(EngineError::InvalidDuration(duration_minutes));
    }
    let Some(step) = Duration::try_minutes(duration_minutes) else {
        return Ok(Vec::new());
    };
    let close = day.and_time(hours.close);
    let mut current = day.and_time(hours.open);
    let mut slots = Vec::new();

    while let Some(end) = current.checked_add_signed(step)
        && end <= close
    {
        let span = Span::new(naive_to_ms(&current), naive_to_ms(&end));
        let available = !intervals
            .iter()
            .any(|i| i.state.is_occupying() && i.span.overlaps(&span));
        slots.push(Slot {
            start: current,
            end,
            available,
        });
        current = end;
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use ulid::Ulid;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
    }

    fn at(h: u32, m: u32) -> Ms {
        naive_to_ms(&day().and_hms_opt(h, m, 0).unwrap())
    }

    fn hours(open: (u32, u32), close: (u32, u32)) -> WorkingHours {
        WorkingHours {
            open: NaiveTime::from_hms_opt(open.0, open.1, 0).unwrap(),
            close: NaiveTime::from_hms_opt(close.0, close.1, 0).unwrap(),
        }
    }

    fn booked(start: Ms, end: Ms, state: BookingState) -> Interval {
        Interval {
            id: Ulid::new(),
            salon_id: 1,
            span: Span::new(start, end),
            state,
        }
    }

    #[test]
    fn empty_day_full_grid() {
        let slots = slot_grid(&[], day(), hours((10, 0), (18, 0)), 60).unwrap();
        assert_eq!(slots.len(), 8);
        assert!(slots.iter().all(|s| s.available));
        assert_eq!(slots[0].start, day().and_hms_opt(10, 0, 0).unwrap());
        assert_eq!(slots[7].end, day().and_hms_opt(18, 0, 0).unwrap());
    }

    #[test]
    fn slots_are_contiguous() {
        let slots = slot_grid(&[], day(), hours((9, 0), (12, 0)), 45).unwrap();
        for pair in slots.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn trailing_partial_slot_dropped() {
        // 8h / 45min = 10.67 → 10 slots, last ends 17:30
        let slots = slot_grid(&[], day(), hours((10, 0), (18, 0)), 45).unwrap();
        assert_eq!(slots.len(), 10);
        assert_eq!(slots[9].end, day().and_hms_opt(17, 30, 0).unwrap());
    }

    #[test]
    fn booking_marks_overlapping_slots() {
        // 11:30–12:30 straddles the 11:00 and 12:00 slots
        let intervals = vec![booked(at(11, 30), at(12, 30), BookingState::Confirmed)];
        let slots = slot_grid(&intervals, day(), hours((10, 0), (18, 0)), 60).unwrap();
        let taken: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.available)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(taken, vec![1, 2]);
    }

    #[test]
    fn adjacent_booking_leaves_slot_free() {
        let intervals = vec![booked(at(10, 0), at(11, 0), BookingState::Confirmed)];
        let slots = slot_grid(&intervals, day(), hours((10, 0), (18, 0)), 60).unwrap();
        assert!(!slots[0].available);
        assert!(slots[1].available);
    }

    #[test]
    fn released_intervals_do_not_block() {
        let intervals = vec![
            booked(at(10, 0), at(11, 0), BookingState::Cancelled),
            booked(at(11, 0), at(12, 0), BookingState::Completed),
            booked(at(12, 0), at(13, 0), BookingState::Pending),
        ];
        let slots = slot_grid(&intervals, day(), hours((10, 0), (18, 0)), 60).unwrap();
        assert!(slots[0].available);
        assert!(slots[1].available);
        assert!(!slots[2].available);
    }

    #[test]
    fn zero_and_negative_duration_rejected() {
        assert!(matches!(
            slot_grid(&[], day(), WorkingHours::default(), 0),
            Err(EngineError::InvalidDuration(0))
        ));
        assert!(matches!(
            slot_grid(&[], day(), WorkingHours::default(), -15),
            Err(EngineError::InvalidDuration(-15))
        ));
    }

    #[test]
    fn close_not_after_open_is_empty() {
        assert!(slot_grid(&[], day(), hours((18, 0), (10, 0)), 30).unwrap().is_empty());
        assert!(slot_grid(&[], day(), hours((12, 0), (12, 0)), 30).unwrap().is_empty());
    }

    #[test]
    fn duration_longer_than_day_window_is_empty() {
        let slots = slot_grid(&[], day(), hours((10, 0), (11, 0)), 90).unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn duration_over_a_day_is_empty_not_an_error() {
        let slots = slot_grid(&[], day(), WorkingHours::default(), 25 * 60).unwrap();
        assert!(slots.is_empty());
        let slots = slot_grid(&[], day(), hours((0, 0), (23, 59)), i64::MAX).unwrap();
        assert!(slots.is_empty());
    }
}
