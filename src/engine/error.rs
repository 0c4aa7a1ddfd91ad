use ulid::Ulid;

use crate::model::{BookingState, SalonId, ServiceId};

#[derive(Debug)]
pub enum EngineError {
    // ── Validation ──
    NotCustomer,
    SalonNotFound(SalonId),
    ServiceNotFound { salon_id: SalonId, service_id: ServiceId },
    InvalidDuration(i64),
    InvalidSpan,
    LimitExceeded(&'static str),
    // ── Admission ──
    Overlap(Ulid),
    // ── Authorization ──
    Forbidden,
    // ── Lifecycle ──
    AlreadyCancelled(Ulid),
    AlreadyTerminal(Ulid, BookingState),
    BookingNotFound(Ulid),
    NotFound(Ulid),
    // ── Infrastructure ──
    CatalogUnavailable(String),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotCustomer => write!(f, "only customers can create bookings"),
            EngineError::SalonNotFound(id) => write!(f, "salon {id} does not exist"),
            EngineError::ServiceNotFound { salon_id, service_id } => {
                write!(f, "service {service_id} does not exist for salon {salon_id}")
            }
            EngineError::InvalidDuration(m) => {
                write!(f, "service duration must be positive, got {m} minutes")
            }
            EngineError::InvalidSpan => write!(f, "interval start must be before its end"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Overlap(id) => write!(f, "time overlaps with booking {id}"),
            EngineError::Forbidden => write!(f, "not allowed"),
            EngineError::AlreadyCancelled(id) => write!(f, "booking {id} already cancelled"),
            EngineError::AlreadyTerminal(id, state) => write!(f, "booking {id} already {state}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::NotFound(id) => write!(f, "interval not found: {id}"),
            EngineError::CatalogUnavailable(e) => write!(f, "catalog unavailable: {e}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
