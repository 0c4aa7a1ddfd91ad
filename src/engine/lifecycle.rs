use tracing::{error, info};
use ulid::Ulid;

use crate::auth::Actor;
use crate::catalog::{SalonInfo, ServiceInfo};
use crate::limits::MAX_SERVICE_DURATION_MINUTES;
use crate::model::*;
use crate::observability;
use crate::payments::PaymentStatus;

use super::{now_ms, Engine, EngineError};

impl Engine {
    pub(super) async fn resolve_salon(&self, salon_id: SalonId) -> Result<SalonInfo, EngineError> {
        self.catalog
            .salon(salon_id)
            .await
            .map_err(|e| EngineError::CatalogUnavailable(e.to_string()))?
            .ok_or(EngineError::SalonNotFound(salon_id))
    }

    pub(super) async fn resolve_service(
        &self,
        salon_id: SalonId,
        service_id: ServiceId,
    ) -> Result<ServiceInfo, EngineError> {
        self.catalog
            .service(salon_id, service_id)
            .await
            .map_err(|e| EngineError::CatalogUnavailable(e.to_string()))?
            .ok_or(EngineError::ServiceNotFound { salon_id, service_id })
    }

    /// Owner of a salon, or None if the catalog no longer knows it.
    pub async fn salon_owner(&self, salon_id: SalonId) -> Result<Option<UserId>, EngineError> {
        match self.resolve_salon(salon_id).await {
            Ok(salon) => Ok(Some(salon.owner_id)),
            Err(EngineError::SalonNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Book `service_id` at `start` for a customer.
    ///
    /// The end time and price are snapshotted from the service now and never
    /// re-derived. The interval and the booking record are committed as one
    /// WAL event; on overlap nothing is written. The default cash-on-delivery
    /// payment is created afterwards, and its failure leaves the booking
    /// confirmed but unpaid.
    pub async fn create_booking(
        &self,
        actor: &Actor,
        salon_id: SalonId,
        service_id: ServiceId,
        start: Ms,
    ) -> Result<Booking, EngineError> {
        if !actor.can_book() {
            return Err(EngineError::NotCustomer);
        }
        self.resolve_salon(salon_id).await?;
        let service = self.resolve_service(salon_id, service_id).await?;
        let minutes = service.duration_minutes;
        if minutes <= 0 {
            return Err(EngineError::InvalidDuration(minutes));
        }
        if minutes > MAX_SERVICE_DURATION_MINUTES {
            return Err(EngineError::LimitExceeded("service duration longer than a day"));
        }
        let end = start
            .checked_add(minutes * MINUTE_MS)
            .ok_or(EngineError::LimitExceeded("timestamp out of range"))?;
        let span = Span { start, end };

        let record = BookingRecord {
            customer_id: actor.id,
            service_id,
            price_cents: service.price_cents,
            created_at: now_ms(),
        };
        let id = self.admit(salon_id, span, Some(record.clone())).await?;
        let booking = Booking::from_record(id, salon_id, span, &record);
        info!("booking {id} confirmed: salon {salon_id}, customer {}", actor.id);

        if let Err(e) = self.payments.create_pending(&booking, booking.price_cents).await {
            error!("booking {id} confirmed without payment record: {e}");
            metrics::counter!(observability::PAYMENT_FAILURES_TOTAL, "op" => "create_pending")
                .increment(1);
        }
        Ok(booking)
    }

    /// Cancel a booking on behalf of its customer or the salon owner.
    ///
    /// An already-cancelled booking yields `AlreadyCancelled`, distinct from
    /// success. A still-pending payment is marked failed afterwards; a ledger
    /// failure there does not undo the cancellation.
    pub async fn cancel_booking(&self, booking_id: Ulid, actor: &Actor) -> Result<(), EngineError> {
        let booking = self.booking(booking_id)?;
        let owner = self.salon_owner(booking.salon_id).await?;
        if !actor.may_cancel(&booking, owner) {
            return Err(EngineError::Forbidden);
        }

        self.transition(booking_id, BookingState::Cancelled).await?;
        info!("booking {booking_id} cancelled by user {}", actor.id);
        metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);

        self.fail_pending_payment(booking_id).await;
        Ok(())
    }

    /// Mark a confirmed booking completed. Completed intervals stop blocking
    /// new admissions but stay on record.
    pub async fn complete_booking(&self, booking_id: Ulid) -> Result<(), EngineError> {
        self.booking(booking_id)?;
        self.transition(booking_id, BookingState::Completed).await?;
        info!("booking {booking_id} completed");
        metrics::counter!(observability::COMPLETIONS_TOTAL).increment(1);
        Ok(())
    }

    /// `complete_booking` restricted to the salon's owner or a superadmin.
    pub async fn complete_booking_as(&self, booking_id: Ulid, actor: &Actor) -> Result<(), EngineError> {
        let booking = self.booking(booking_id)?;
        let owner = self.salon_owner(booking.salon_id).await?;
        if !actor.may_manage(owner) {
            return Err(EngineError::Forbidden);
        }
        self.complete_booking(booking_id).await
    }

    /// Move a booking into a terminal state. The current state is re-read
    /// under the salon's write lock so concurrent transitions serialize.
    async fn transition(&self, booking_id: Ulid, target: BookingState) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let (salon_id, mut guard) = self.store.resolve_write(&booking_id).await?;
        let current = guard
            .get(booking_id)
            .map(|i| i.state)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        match current {
            BookingState::Cancelled => return Err(EngineError::AlreadyCancelled(booking_id)),
            BookingState::Completed => {
                return Err(EngineError::AlreadyTerminal(booking_id, current));
            }
            BookingState::Pending | BookingState::Confirmed => {}
        }
        let event = match target {
            BookingState::Cancelled => Event::IntervalReleased { id: booking_id, salon_id },
            BookingState::Completed => Event::BookingCompleted { id: booking_id, salon_id },
            BookingState::Pending | BookingState::Confirmed => {
                return Err(EngineError::AlreadyTerminal(booking_id, current));
            }
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    async fn fail_pending_payment(&self, booking_id: Ulid) {
        let payment = match self.payments.payment_for(booking_id).await {
            Ok(Some(p)) if p.status == PaymentStatus::Pending => p,
            Ok(_) => return,
            Err(e) => {
                error!("booking {booking_id} cancelled but payment lookup failed: {e}");
                metrics::counter!(observability::PAYMENT_FAILURES_TOTAL, "op" => "lookup")
                    .increment(1);
                return;
            }
        };
        if let Err(e) = self.payments.mark_failed(payment.id).await {
            error!("booking {booking_id} cancelled but payment {} not marked failed: {e}", payment.id);
            metrics::counter!(observability::PAYMENT_FAILURES_TOTAL, "op" => "mark_failed")
                .increment(1);
        }
    }
}
