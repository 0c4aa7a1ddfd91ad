use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use ulid::Ulid;

use crate::engine::now_ms;
use crate::model::{Booking, Ms, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Cash on delivery. The only method the engine ever records.
    Cod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub customer_id: UserId,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
}

#[derive(Debug)]
pub enum PaymentError {
    AlreadyExists(Ulid),
    NotFound(Ulid),
    Unavailable(String),
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentError::AlreadyExists(booking) => {
                write!(f, "payment already exists for booking {booking}")
            }
            PaymentError::NotFound(id) => write!(f, "payment not found: {id}"),
            PaymentError::Unavailable(e) => write!(f, "payment ledger unavailable: {e}"),
        }
    }
}

impl std::error::Error for PaymentError {}

/// Payment bookkeeping collaborator. The engine only creates default
/// records and fails pending ones; it never settles money.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Record a cash-on-delivery payment in `Pending` for a fresh booking.
    async fn create_pending(&self, booking: &Booking, amount_cents: i64) -> Result<Payment, PaymentError>;

    async fn payment_for(&self, booking_id: Ulid) -> Result<Option<Payment>, PaymentError>;

    async fn mark_failed(&self, payment_id: Ulid) -> Result<Payment, PaymentError>;
}

#[derive(Default)]
pub struct InMemoryPayments {
    payments: DashMap<Ulid, Payment>,
    by_booking: DashMap<Ulid, Ulid>,
}

impl InMemoryPayments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryPayments {
    async fn create_pending(&self, booking: &Booking, amount_cents: i64) -> Result<Payment, PaymentError> {
        // One payment per booking
        let entry = match self.by_booking.entry(booking.id) {
            Entry::Occupied(_) => return Err(PaymentError::AlreadyExists(booking.id)),
            Entry::Vacant(v) => v,
        };
        let now = now_ms();
        let payment = Payment {
            id: Ulid::new(),
            booking_id: booking.id,
            customer_id: booking.customer_id,
            amount_cents,
            method: PaymentMethod::Cod,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.payments.insert(payment.id, payment.clone());
        entry.insert(payment.id);
        Ok(payment)
    }

    async fn payment_for(&self, booking_id: Ulid) -> Result<Option<Payment>, PaymentError> {
        let Some(pid) = self.by_booking.get(&booking_id).map(|e| *e.value()) else {
            return Ok(None);
        };
        Ok(self.payments.get(&pid).map(|e| e.value().clone()))
    }

    async fn mark_failed(&self, payment_id: Ulid) -> Result<Payment, PaymentError> {
        let mut payment = self
            .payments
            .get_mut(&payment_id)
            .ok_or(PaymentError::NotFound(payment_id))?;
        payment.status = PaymentStatus::Failed;
        payment.updated_at = now_ms();
        Ok(payment.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookingState, Span};

    fn booking() -> Booking {
        Booking {
            id: Ulid::new(),
            customer_id: 5,
            salon_id: 1,
            service_id: 2,
            span: Span::new(0, 1000),
            state: BookingState::Confirmed,
            price_cents: 4200,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn create_pending_defaults_to_cod() {
        let ledger = InMemoryPayments::new();
        let b = booking();
        let p = ledger.create_pending(&b, b.price_cents).await.unwrap();
        assert_eq!(p.method, PaymentMethod::Cod);
        assert_eq!(p.status, PaymentStatus::Pending);
        assert_eq!(p.amount_cents, 4200);
        assert_eq!(ledger.payment_for(b.id).await.unwrap(), Some(p));
    }

    #[tokio::test]
    async fn second_payment_for_booking_rejected() {
        let ledger = InMemoryPayments::new();
        let b = booking();
        ledger.create_pending(&b, 1).await.unwrap();
        let err = ledger.create_pending(&b, 1).await.unwrap_err();
        assert!(matches!(err, PaymentError::AlreadyExists(id) if id == b.id));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn mark_failed_updates_status() {
        let ledger = InMemoryPayments::new();
        let b = booking();
        let p = ledger.create_pending(&b, 1).await.unwrap();
        let failed = ledger.mark_failed(p.id).await.unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(
            ledger.payment_for(b.id).await.unwrap().map(|p| p.status),
            Some(PaymentStatus::Failed)
        );
        assert!(matches!(
            ledger.mark_failed(Ulid::new()).await,
            Err(PaymentError::NotFound(_))
        ));
    }
}
