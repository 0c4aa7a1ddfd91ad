use chrono::NaiveDate;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::{Engine, EngineError, IntervalHandle};

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::InvalidSpan);
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_BOOKING_SPAN_MS {
        return Err(EngineError::LimitExceeded("booking longer than a day"));
    }
    Ok(())
}

/// Any pending/confirmed interval overlapping `span` is a conflict.
pub(crate) fn check_no_overlap(ss: &SalonState, span: &Span) -> Result<(), EngineError> {
    match ss.first_conflict(span) {
        Some(existing) => Err(EngineError::Overlap(existing.id)),
        None => Ok(()),
    }
}

impl Engine {
    /// Admit `span` for `salon_id` if nothing occupying overlaps it.
    pub async fn try_admit(&self, salon_id: SalonId, span: Span) -> Result<IntervalHandle, EngineError> {
        self.admit(salon_id, span, None).await
    }

    /// Scan, log and insert under one hold of the salon's write lock, so two
    /// overlapping candidates for the same salon can never both succeed.
    pub(super) async fn admit(
        &self,
        salon_id: SalonId,
        span: Span,
        booking: Option<BookingRecord>,
    ) -> Result<IntervalHandle, EngineError> {
        validate_span(&span)?;
        let _gate = self.commit_gate.read().await;
        let salon = self.store.get_or_create(salon_id)?;
        let mut guard = salon.write().await;
        if guard.occupying_count() >= MAX_INTERVALS_PER_SALON {
            return Err(EngineError::LimitExceeded("too many active intervals on salon"));
        }

        if let Err(e) = check_no_overlap(&guard, &span) {
            warn!("salon {salon_id}: rejected [{}, {}): {e}", span.start, span.end);
            metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => "overlap").increment(1);
            return Err(e);
        }

        let id = Ulid::new();
        let event = Event::IntervalAdmitted { id, salon_id, span, booking };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);

        metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => "admitted").increment(1);
        metrics::gauge!(observability::SALONS_ACTIVE).set(self.store.salon_count() as f64);
        Ok(id)
    }

    /// Mark an interval cancelled. Releasing a non-occupying interval is a no-op.
    pub async fn release(&self, handle: IntervalHandle) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let (salon_id, mut guard) = self.store.resolve_write(&handle).await?;
        let state = guard
            .get(handle)
            .map(|i| i.state)
            .ok_or(EngineError::NotFound(handle))?;
        if !state.is_occupying() {
            debug!("release of {handle} is a no-op: already {state}");
            return Ok(());
        }
        let event = Event::IntervalReleased { id: handle, salon_id };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Every interval of `salon_id` whose start falls on `day`, in start order.
    pub async fn query_day(&self, salon_id: SalonId, day: NaiveDate) -> Vec<Interval> {
        let Some(salon) = self.store.get(&salon_id) else {
            return Vec::new();
        };
        let guard = salon.read().await;
        guard.starting_within(&day_span(day)).to_vec()
    }
}
