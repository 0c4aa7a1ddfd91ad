use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use ulid::Ulid;

use salonbook::catalog::InMemoryCatalog;
use salonbook::engine::Engine;
use salonbook::http::router;
use salonbook::payments::InMemoryPayments;

// ── Helpers ──

const CATALOG: &str = r#"{
    "salons": [
        {"id": 1, "owner_id": 100, "name": "Downtown"},
        {"id": 2, "owner_id": 200, "name": "Uptown", "open_time": "09:00:00", "close_time": "12:00:00"}
    ],
    "services": [
        {"id": 10, "salon_id": 1, "name": "Haircut", "duration_minutes": 60, "price_cents": 2500},
        {"id": 11, "salon_id": 1, "name": "Broken", "duration_minutes": 0, "price_cents": 0},
        {"id": 20, "salon_id": 2, "name": "Nails", "duration_minutes": 45, "price_cents": 3000}
    ]
}"#;

fn test_app() -> Router {
    let dir = std::env::temp_dir().join(format!("salonbook_http_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let wal: PathBuf = dir.join("bookings.wal");
    let catalog = InMemoryCatalog::from_json(CATALOG).unwrap();
    let engine = Engine::new(wal, Arc::new(catalog), Arc::new(InMemoryPayments::new())).unwrap();
    router(Arc::new(engine))
}

fn request(method: &str, uri: &str, who: Option<(u64, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = who {
        builder = builder
            .header("X-User-Id", id.to_string())
            .header("X-User-Role", role);
    }
    match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn book(app: &Router, customer: u64, service_id: u64, start: &str) -> (StatusCode, Value) {
    let salon_id = if service_id >= 20 { 2 } else { 1 };
    send(
        app,
        request(
            "POST",
            "/api/bookings",
            Some((customer, "customer")),
            Some(serde_json::json!({
                "salon_id": salon_id,
                "service_id": service_id,
                "start_time": start,
            })),
        ),
    )
    .await
}

// ── Health & identity ──

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_requires_identity() {
    let app = test_app();
    let (status, body) = send(&app, request("GET", "/api/bookings", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].is_string());

    let (status, _) = send(&app, request("GET", "/api/bookings", Some((1, "admin")), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ── Create ──

#[tokio::test]
async fn test_create_booking() {
    let app = test_app();
    let (status, body) = book(&app, 7, 10, "2025-06-16T10:00:00").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["customer_id"], 7);
    assert_eq!(body["salon_id"], 1);
    assert_eq!(body["start_time"], "2025-06-16T10:00:00");
    assert_eq!(body["end_time"], "2025-06-16T11:00:00");
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["price_cents"], 2500);
    assert_eq!(body["payment"]["method"], "cod");
    assert_eq!(body["payment"]["status"], "pending");
}

#[tokio::test]
async fn test_create_booking_rejections() {
    let app = test_app();

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/bookings",
            Some((100, "salon_owner")),
            Some(serde_json::json!({"salon_id": 1, "service_id": 10, "start_time": "2025-06-16T10:00:00"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Only customers can create bookings");

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/bookings",
            Some((7, "customer")),
            Some(serde_json::json!({"salon_id": 9, "service_id": 10, "start_time": "2025-06-16T10:00:00"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Salon does not exist");

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/bookings",
            Some((7, "customer")),
            Some(serde_json::json!({"salon_id": 1, "service_id": 20, "start_time": "2025-06-16T10:00:00"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Service does not exist for this salon");

    let (status, body) = book(&app, 7, 10, "not a time").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Invalid start_time");
}

#[tokio::test]
async fn test_overlap_rejected() {
    let app = test_app();
    let (status, _) = book(&app, 1, 10, "2025-06-16T10:00:00").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = book(&app, 2, 10, "2025-06-16T10:30:00").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Time overlaps with another booking");

    let (status, _) = book(&app, 2, 10, "2025-06-16T11:00:00Z").await;
    assert_eq!(status, StatusCode::CREATED);
}

// ── Cancel / complete ──

#[tokio::test]
async fn test_cancel_flow() {
    let app = test_app();
    let (_, created) = book(&app, 1, 10, "2025-06-16T10:00:00").await;
    let id = created["id"].as_str().unwrap().to_string();
    let uri = format!("/api/bookings/{id}/cancel");

    let (status, body) = send(&app, request("POST", &uri, Some((2, "customer")), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "Not allowed");

    let (status, body) = send(&app, request("POST", &uri, Some((1, "customer")), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, body) = send(&app, request("POST", &uri, Some((1, "customer")), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Booking already cancelled");

    let (_, fetched) = send(
        &app,
        request("GET", &format!("/api/bookings/{id}"), Some((1, "customer")), None),
    )
    .await;
    assert_eq!(fetched["status"], "cancelled");
    assert_eq!(fetched["payment"]["status"], "failed");

    // The slot is free again
    let (status, _) = book(&app, 2, 10, "2025-06-16T10:00:00").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_cancel_unknown_booking() {
    let app = test_app();
    let uri = format!("/api/bookings/{}/cancel", Ulid::new());
    let (status, _) = send(&app, request("POST", &uri, Some((1, "customer")), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        request("POST", "/api/bookings/not-an-id/cancel", Some((1, "customer")), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_complete_by_owner_only() {
    let app = test_app();
    let (_, created) = book(&app, 1, 10, "2025-06-16T10:00:00").await;
    let uri = format!("/api/bookings/{}/complete", created["id"].as_str().unwrap());

    let (status, _) = send(&app, request("POST", &uri, Some((1, "customer")), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, request("POST", &uri, Some((200, "salon_owner")), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, request("POST", &uri, Some((100, "salon_owner")), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (status, body) = send(&app, request("POST", &uri, Some((100, "salon_owner")), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Booking already completed");
}

// ── Listing ──

#[tokio::test]
async fn test_list_is_role_scoped() {
    let app = test_app();
    book(&app, 1, 10, "2025-06-16T10:00:00").await;
    book(&app, 2, 10, "2025-06-16T12:00:00").await;
    book(&app, 1, 20, "2025-06-16T09:00:00").await;

    let (_, mine) = send(&app, request("GET", "/api/bookings", Some((1, "customer")), None)).await;
    assert_eq!(mine.as_array().unwrap().len(), 2);

    let (_, owned) = send(&app, request("GET", "/api/bookings", Some((200, "salon_owner")), None)).await;
    let owned = owned.as_array().unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0]["salon_id"], 2);

    let (_, all) = send(&app, request("GET", "/api/bookings", Some((9, "superadmin")), None)).await;
    let all = all.as_array().unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0]["start_time"], "2025-06-16T12:00:00");
}

#[tokio::test]
async fn test_get_booking_forbidden_for_stranger() {
    let app = test_app();
    let (_, created) = book(&app, 1, 10, "2025-06-16T10:00:00").await;
    let uri = format!("/api/bookings/{}", created["id"].as_str().unwrap());
    let (status, _) = send(&app, request("GET", &uri, Some((3, "customer")), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, request("GET", &uri, Some((100, "salon_owner")), None)).await;
    assert_eq!(status, StatusCode::OK);
}

// ── Availability ──

#[tokio::test]
async fn test_availability_grid() {
    let app = test_app();
    book(&app, 1, 10, "2025-06-16T12:00:00").await;

    let (status, body) = send(
        &app,
        request(
            "GET",
            "/api/bookings/availability?salon_id=1&service_id=10&date=2025-06-16",
            Some((5, "customer")),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let slots = body.as_array().unwrap();
    assert_eq!(slots.len(), 8);
    assert_eq!(slots[0]["start"], "2025-06-16T10:00:00");
    assert_eq!(slots[0]["end"], "2025-06-16T11:00:00");
    assert_eq!(slots[2]["available"], false);
    assert_eq!(slots.iter().filter(|s| s["available"] == true).count(), 7);
}

#[tokio::test]
async fn test_availability_param_errors() {
    let app = test_app();
    let cases = [
        ("/api/bookings/availability?salon_id=1&service_id=10", "Missing params"),
        ("/api/bookings/availability?salon_id=1&service_id=10&date=", "Missing params"),
        ("/api/bookings/availability?salon_id=9&service_id=10&date=2025-06-16", "Invalid salon or service"),
        ("/api/bookings/availability?salon_id=1&service_id=20&date=2025-06-16", "Invalid salon or service"),
        ("/api/bookings/availability?salon_id=x&service_id=10&date=2025-06-16", "Invalid salon or service"),
        ("/api/bookings/availability?salon_id=1&service_id=10&date=16/06/2025", "Invalid date format"),
        ("/api/bookings/availability?salon_id=1&service_id=11&date=2025-06-16", "Service duration must be positive"),
    ];
    for (uri, detail) in cases {
        let (status, body) = send(&app, request("GET", uri, Some((5, "customer")), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["detail"], detail, "{uri}");
    }
}
