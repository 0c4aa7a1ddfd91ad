use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds (UTC). The only instant type inside the engine.
pub type Ms = i64;

pub type SalonId = u64;
pub type ServiceId = u64;
pub type UserId = u64;

pub const MINUTE_MS: Ms = 60_000;
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Back-to-back spans (one ends where the other starts) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

}

/// Lifecycle state of a booking and of the interval it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingState {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingState {
    /// Only pending and confirmed intervals block new admissions.
    pub fn is_occupying(self) -> bool {
        matches!(self, BookingState::Pending | BookingState::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingState::Cancelled | BookingState::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingState::Pending => "pending",
            BookingState::Confirmed => "confirmed",
            BookingState::Cancelled => "cancelled",
            BookingState::Completed => "completed",
        }
    }
}

impl std::fmt::Display for BookingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A salon's occupied period. The id doubles as the interval handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub id: Ulid,
    pub salon_id: SalonId,
    pub span: Span,
    pub state: BookingState,
}

#[derive(Debug, Clone)]
pub struct SalonState {
    pub id: SalonId,
    /// All intervals ever admitted for this salon, sorted by `span.start`.
    /// Mutate only through `insert_interval` / `set_state` so `occupying` stays exact.
    pub intervals: Vec<Interval>,
    occupying: usize,
}

impl SalonState {
    pub fn new(id: SalonId) -> Self {
        Self {
            id,
            intervals: Vec::new(),
            occupying: 0,
        }
    }

    /// Insert interval maintaining sort order by span.start.
    pub fn insert_interval(&mut self, interval: Interval) {
        if interval.state.is_occupying() {
            self.occupying += 1;
        }
        let pos = self
            .intervals
            .partition_point(|i| i.span.start <= interval.span.start);
        self.intervals.insert(pos, interval);
    }

    pub fn get(&self, id: Ulid) -> Option<&Interval> {
        self.intervals.iter().find(|i| i.id == id)
    }

    /// Set the state of an interval. Returns the previous state, or None if absent.
    pub fn set_state(&mut self, id: Ulid, state: BookingState) -> Option<BookingState> {
        let interval = self.intervals.iter_mut().find(|i| i.id == id)?;
        let prev = std::mem::replace(&mut interval.state, state);
        match (prev.is_occupying(), state.is_occupying()) {
            (true, false) => self.occupying -= 1,
            (false, true) => self.occupying += 1,
            _ => {}
        }
        Some(prev)
    }

    /// Return only intervals whose span overlaps the query window.
    /// Uses binary search to skip intervals starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Interval> {
        let right_bound = self
            .intervals
            .partition_point(|i| i.span.start < query.end);
        self.intervals[..right_bound]
            .iter()
            .filter(move |i| i.span.end > query.start)
    }

    /// First pending/confirmed interval overlapping `span`, if any.
    pub fn first_conflict(&self, span: &Span) -> Option<&Interval> {
        self.overlapping(span).find(|i| i.state.is_occupying())
    }

    /// Intervals whose start falls inside `window`, in start order.
    pub fn starting_within(&self, window: &Span) -> &[Interval] {
        let lo = self
            .intervals
            .partition_point(|i| i.span.start < window.start);
        let hi = self
            .intervals
            .partition_point(|i| i.span.start < window.end);
        &self.intervals[lo..hi]
    }

    /// Pending/confirmed intervals. Terminal ones are history and not counted.
    pub fn occupying_count(&self) -> usize {
        self.occupying
    }

    /// Apply a WAL event belonging to this salon.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::IntervalAdmitted { id, salon_id, span, .. } => {
                self.insert_interval(Interval {
                    id: *id,
                    salon_id: *salon_id,
                    span: *span,
                    state: BookingState::Confirmed,
                });
            }
            Event::IntervalReleased { id, .. } => {
                self.set_state(*id, BookingState::Cancelled);
            }
            Event::BookingCompleted { id, .. } => {
                self.set_state(*id, BookingState::Completed);
            }
        }
    }
}

/// Booking fields carried alongside an admitted interval in the WAL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub customer_id: UserId,
    pub service_id: ServiceId,
    pub price_cents: i64,
    pub created_at: Ms,
}

/// A booking as the rest of the system sees it.
///
/// `span.end` and `price_cents` are captured from the service when the
/// booking is created and never re-derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: Ulid,
    pub customer_id: UserId,
    pub salon_id: SalonId,
    pub service_id: ServiceId,
    pub span: Span,
    pub state: BookingState,
    pub price_cents: i64,
    pub created_at: Ms,
}

impl Booking {
    pub fn from_record(id: Ulid, salon_id: SalonId, span: Span, record: &BookingRecord) -> Self {
        Self {
            id,
            customer_id: record.customer_id,
            salon_id,
            service_id: record.service_id,
            span,
            state: BookingState::Confirmed,
            price_cents: record.price_cents,
            created_at: record.created_at,
        }
    }

    pub fn record(&self) -> BookingRecord {
        BookingRecord {
            customer_id: self.customer_id,
            service_id: self.service_id,
            price_cents: self.price_cents,
            created_at: self.created_at,
        }
    }
}

/// A salon's business day. Either bound falls back independently when unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl WorkingHours {
    pub fn default_open() -> NaiveTime {
        NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn default_close() -> NaiveTime {
        NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn from_options(open: Option<NaiveTime>, close: Option<NaiveTime>) -> Self {
        Self {
            open: open.unwrap_or_else(Self::default_open),
            close: close.unwrap_or_else(Self::default_close),
        }
    }
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self::from_options(None, None)
    }
}

/// One fixed-length candidate window of a day. Computed, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub available: bool,
}

// ── Wall-clock conversions (all UTC) ─────────────────────────────

pub fn naive_to_ms(dt: &NaiveDateTime) -> Ms {
    dt.and_utc().timestamp_millis()
}

pub fn ms_to_naive(ms: Ms) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// The calendar day `[00:00, next 00:00)` as a span.
pub fn day_span(day: NaiveDate) -> Span {
    let start = naive_to_ms(&day.and_time(NaiveTime::MIN));
    Span::new(start, start + DAY_MS)
}

/// The WAL record format. A booking and its interval are written by one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    IntervalAdmitted {
        id: Ulid,
        salon_id: SalonId,
        span: Span,
        booking: Option<BookingRecord>,
    },
    IntervalReleased {
        id: Ulid,
        salon_id: SalonId,
    },
    BookingCompleted {
        id: Ulid,
        salon_id: SalonId,
    },
}

impl Event {
    pub fn salon_id(&self) -> SalonId {
        match self {
            Event::IntervalAdmitted { salon_id, .. }
            | Event::IntervalReleased { salon_id, .. }
            | Event::BookingCompleted { salon_id, .. } => *salon_id,
        }
    }
}
