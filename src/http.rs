use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use ulid::Ulid;

use crate::auth::{Actor, Role};
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::payments::Payment;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/bookings", get(list_bookings).post(create_booking))
        .route("/api/bookings/availability", get(availability))
        .route("/api/bookings/:id", get(get_booking))
        .route("/api/bookings/:id/cancel", post(cancel_booking))
        .route("/api/bookings/:id/complete", post(complete_booking))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

// ── Errors ────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "Authentication credentials were not provided.",
        )
    }

    fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found.")
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotCustomer => Self::bad_request("Only customers can create bookings"),
            EngineError::SalonNotFound(_) => Self::bad_request("Salon does not exist"),
            EngineError::ServiceNotFound { .. } => {
                Self::bad_request("Service does not exist for this salon")
            }
            EngineError::InvalidDuration(_) => {
                Self::bad_request("Service duration must be positive")
            }
            EngineError::InvalidSpan | EngineError::LimitExceeded(_) => {
                Self::bad_request(e.to_string())
            }
            EngineError::Overlap(_) => Self::bad_request("Time overlaps with another booking"),
            EngineError::Forbidden => Self::new(StatusCode::FORBIDDEN, "Not allowed"),
            EngineError::AlreadyCancelled(_) => Self::bad_request("Booking already cancelled"),
            EngineError::AlreadyTerminal(_, state) => {
                Self::bad_request(format!("Booking already {state}"))
            }
            EngineError::BookingNotFound(_) | EngineError::NotFound(_) => Self::not_found(),
            EngineError::CatalogUnavailable(_) => {
                tracing::error!("{e}");
                Self::new(StatusCode::BAD_GATEWAY, "Catalog unavailable")
            }
            EngineError::WalError(_) => {
                tracing::error!("{e}");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.detail });
        (self.status, Json(body)).into_response()
    }
}

// ── Identity ──────────────────────────────────────────────

/// The caller as asserted by the upstream authentication proxy.
fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let id: UserId = header(USER_ID_HEADER)
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(ApiError::unauthorized)?;
    let role: Role = header(USER_ROLE_HEADER)
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(ApiError::unauthorized)?;
    Ok(Actor::new(id, role))
}

fn parse_booking_id(raw: &str) -> Result<Ulid, ApiError> {
    Ulid::from_string(raw).map_err(|_| ApiError::not_found())
}

/// Accepts RFC 3339 (converted to UTC) or a naive ISO timestamp taken as UTC.
fn parse_start_time(raw: &str) -> Option<Ms> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    raw.parse::<NaiveDateTime>().ok().map(|dt| naive_to_ms(&dt))
}

// ── Views ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct BookingView {
    pub id: Ulid,
    pub customer_id: UserId,
    pub salon_id: SalonId,
    pub service_id: ServiceId,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub status: BookingState,
    pub price_cents: i64,
    pub created_at: Option<NaiveDateTime>,
    pub payment: Option<Payment>,
}

impl BookingView {
    fn new(booking: Booking, payment: Option<Payment>) -> Self {
        Self {
            id: booking.id,
            customer_id: booking.customer_id,
            salon_id: booking.salon_id,
            service_id: booking.service_id,
            start_time: ms_to_naive(booking.span.start),
            end_time: ms_to_naive(booking.span.end),
            status: booking.state,
            price_cents: booking.price_cents,
            created_at: ms_to_naive(booking.created_at),
            payment,
        }
    }
}

async fn view(engine: &Engine, booking: Booking) -> BookingView {
    let payment = engine.payment_for(booking.id).await;
    BookingView::new(booking, payment)
}

// ── Handlers ──────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub salon_id: SalonId,
    pub service_id: ServiceId,
    pub start_time: String,
}

async fn create_booking(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    body: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingView>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let Json(req) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let start = parse_start_time(&req.start_time)
        .ok_or_else(|| ApiError::bad_request("Invalid start_time"))?;

    let booking = engine
        .create_booking(&actor, req.salon_id, req.service_id, start)
        .await?;
    Ok((StatusCode::CREATED, Json(view(&engine, booking).await)))
}

async fn list_bookings(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let bookings = engine.list_bookings(&actor).await?;
    let mut out = Vec::with_capacity(bookings.len());
    for b in bookings {
        out.push(view(&engine, b).await);
    }
    Ok(Json(out))
}

async fn get_booking(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingView>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let id = parse_booking_id(&id)?;
    let booking = engine.get_booking(id, &actor).await?;
    Ok(Json(view(&engine, booking).await))
}

async fn cancel_booking(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let id = parse_booking_id(&id)?;
    engine.cancel_booking(id, &actor).await?;
    Ok(Json(serde_json::json!({ "status": "cancelled" })))
}

async fn complete_booking(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let id = parse_booking_id(&id)?;
    engine.complete_booking_as(id, &actor).await?;
    Ok(Json(serde_json::json!({ "status": "completed" })))
}

#[derive(Deserialize)]
pub struct AvailabilityParams {
    pub salon_id: Option<String>,
    pub service_id: Option<String>,
    pub date: Option<String>,
}

async fn availability(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Query(params): Query<AvailabilityParams>,
) -> Result<Json<Vec<Slot>>, ApiError> {
    actor_from_headers(&headers)?;
    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
    let (Some(salon), Some(service), Some(date)) = (
        non_empty(params.salon_id),
        non_empty(params.service_id),
        non_empty(params.date),
    ) else {
        return Err(ApiError::bad_request("Missing params"));
    };

    let invalid = || ApiError::bad_request("Invalid salon or service");
    let salon_id: SalonId = salon.parse().map_err(|_| invalid())?;
    let service_id: ServiceId = service.parse().map_err(|_| invalid())?;
    let day = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request("Invalid date format"))?;

    match engine.availability(salon_id, service_id, day).await {
        Ok(slots) => Ok(Json(slots)),
        Err(EngineError::SalonNotFound(_) | EngineError::ServiceNotFound { .. }) => Err(invalid()),
        Err(e) => Err(e.into()),
    }
}
