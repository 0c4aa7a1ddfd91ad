use chrono::NaiveDate;
use ulid::Ulid;

use crate::auth::{Actor, Role};
use crate::model::*;
use crate::observability;
use crate::payments::Payment;

use super::availability::slot_grid;
use super::{Engine, EngineError};

impl Engine {
    /// Current record of a booking, without access checks.
    pub fn booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        self.bookings
            .get(&booking_id)
            .map(|b| b.value().clone())
            .ok_or(EngineError::BookingNotFound(booking_id))
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    /// A booking as seen by `actor`: its customer, the salon's owner, or a superadmin.
    pub async fn get_booking(&self, booking_id: Ulid, actor: &Actor) -> Result<Booking, EngineError> {
        let booking = self.booking(booking_id)?;
        if actor.role == Role::SuperAdmin {
            return Ok(booking);
        }
        let owner = self.salon_owner(booking.salon_id).await?;
        if !actor.may_view(&booking, owner) {
            return Err(EngineError::Forbidden);
        }
        Ok(booking)
    }

    /// Role-scoped listing, latest start first.
    ///
    /// Customers see their own bookings, salon owners see bookings at the
    /// salons they own, superadmins see everything.
    pub async fn list_bookings(&self, actor: &Actor) -> Result<Vec<Booking>, EngineError> {
        let mut out: Vec<Booking> = match actor.role {
            Role::SuperAdmin => self.bookings.iter().map(|b| b.value().clone()).collect(),
            Role::Customer => self
                .bookings
                .iter()
                .filter(|b| b.customer_id == actor.id)
                .map(|b| b.value().clone())
                .collect(),
            Role::SalonOwner => {
                let owned = self
                    .catalog
                    .salons_owned_by(actor.id)
                    .await
                    .map_err(|e| EngineError::CatalogUnavailable(e.to_string()))?;
                self.bookings
                    .iter()
                    .filter(|b| owned.contains(&b.salon_id))
                    .map(|b| b.value().clone())
                    .collect()
            }
        };
        out.sort_by(|a, b| b.span.start.cmp(&a.span.start).then_with(|| b.id.cmp(&a.id)));
        Ok(out)
    }

    /// Slot grid for `service_id` at `salon_id` on `day`, using the salon's
    /// working hours. Only bookings starting on `day` are considered.
    pub async fn availability(
        &self,
        salon_id: SalonId,
        service_id: ServiceId,
        day: NaiveDate,
    ) -> Result<Vec<Slot>, EngineError> {
        let salon = self.resolve_salon(salon_id).await?;
        let service = self.resolve_service(salon_id, service_id).await?;
        metrics::counter!(observability::AVAILABILITY_QUERIES_TOTAL).increment(1);

        let intervals = self.query_day(salon_id, day).await;
        slot_grid(&intervals, day, salon.working_hours(), service.duration_minutes)
    }

    pub async fn payment_for(&self, booking_id: Ulid) -> Option<Payment> {
        match self.payments.payment_for(booking_id).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("payment lookup for booking {booking_id} failed: {e}");
                None
            }
        }
    }
}
