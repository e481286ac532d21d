//! Common test utilities for revenue-service integration tests.

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::{Days, NaiveDate, Utc};
use http_body_util::BodyExt;
use revenue_service::models::Assignment;
use revenue_service::services::{MemoryStorage, MemoryStore};
use revenue_service::startup::{build_router, AppState};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, Once};
use tower::ServiceExt;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,revenue_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const BOUNDARY_ASSIGNMENT: &str = "ASG-BND-1";
pub const BOUNDARY_TRIP: &str = "TRIP-BND-1";
pub const PERCENTAGE_ASSIGNMENT: &str = "ASG-PCT-1";
pub const PERCENTAGE_TRIP: &str = "TRIP-PCT-1";

/// Test application over the in-memory store and attachment storage.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub storage: MemoryStorage,
    pub boundary_category: Uuid,
    pub percentage_category: Uuid,
    pub other_category: Uuid,
    pub cash: Uuid,
    pub pending: Uuid,
    pub paid: Uuid,
    pub partially_paid: Uuid,
    pub overpaid: Uuid,
    pub refunded: Uuid,
}

fn assignment(
    assignment_id: &str,
    bus_trip_id: &str,
    assignment_type: &str,
    value: Decimal,
    trip_revenue: Decimal,
) -> Assignment {
    Assignment {
        assignment_id: assignment_id.to_string(),
        bus_trip_id: bus_trip_id.to_string(),
        assignment_type: assignment_type.to_string(),
        assignment_value: value,
        trip_revenue,
        date_assigned: Some(today()),
        driver_id: Some("EMP-DRV-1".to_string()),
        driver_name: Some("Juan Dela Cruz".to_string()),
        conductor_id: Some("EMP-CON-1".to_string()),
        conductor_name: Some("Pedro Santos".to_string()),
        synced_utc: Utc::now(),
    }
}

/// Spawn a router with seeded reference data: categories, a cash method, the
/// revenue payment statuses, one Boundary and one Percentage assignment.
pub async fn spawn_app() -> TestApp {
    init_tracing();

    let store = MemoryStore::new();
    let storage = MemoryStorage::new();

    let boundary = store.add_category("Boundary").await;
    let percentage = store.add_category("Percentage").await;
    store.add_category("Bus_Rental").await;
    let other = store.add_category("Charter Services").await;
    let cash = store.add_payment_method("Cash").await;
    let pending = store.add_payment_status("Pending", true).await;
    let paid = store.add_payment_status("Paid", true).await;
    let partially_paid = store.add_payment_status("Partially Paid", true).await;
    let overpaid = store.add_payment_status("Overpaid", true).await;
    let refunded = store.add_payment_status("Refunded", false).await;

    store
        .add_assignment(assignment(
            BOUNDARY_ASSIGNMENT,
            BOUNDARY_TRIP,
            "Boundary",
            Decimal::from(2000),
            Decimal::from(2200),
        ))
        .await;
    store
        .add_assignment(assignment(
            PERCENTAGE_ASSIGNMENT,
            PERCENTAGE_TRIP,
            "Percentage",
            Decimal::from_str("0.22").unwrap(),
            Decimal::from(2200),
        ))
        .await;

    let state = AppState::new(Arc::new(store.clone()), Arc::new(storage.clone()), 3);

    TestApp {
        router: build_router(state),
        store,
        storage,
        boundary_category: boundary.category_id,
        percentage_category: percentage.category_id,
        other_category: other.category_id,
        cash: cash.payment_method_id,
        pending: pending.payment_status_id,
        paid: paid.payment_status_id,
        partially_paid: partially_paid.payment_status_id,
        overpaid: overpaid.payment_status_id,
        refunded: refunded.payment_status_id,
    }
}

/// Response status, headers and JSON body (Null when empty).
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Drive one request through a router. Takes the router by value so callers
/// can run requests from spawned tasks.
#[allow(dead_code)]
pub async fn send(router: Router, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

#[allow(dead_code)]
impl TestApp {
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        send(self.router.clone(), method, uri, body).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::PATCH, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.request(Method::DELETE, uri, None).await
    }

    /// Create a manual record under the non-trip category with status Pending.
    pub async fn create_manual(&self, amount: &str) -> Value {
        let response = self
            .post(
                "/revenues",
                serde_json::json!({
                    "category_id": self.other_category,
                    "total_amount": amount,
                    "collection_date": today(),
                    "payment_status_id": self.pending,
                    "remarks": "Charter for school field trip",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body
    }

    /// Create a receivable with the given installment amounts and no total.
    pub async fn create_receivable(&self, installments: &[&str]) -> Value {
        let lines: Vec<Value> = installments
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                serde_json::json!({
                    "due_date": days_from_today(7 * (i as u64 + 1)),
                    "amount_due": amount,
                })
            })
            .collect();
        let response = self
            .post(
                "/revenues",
                serde_json::json!({
                    "category_id": self.other_category,
                    "collection_date": today(),
                    "payment_status_id": self.pending,
                    "remarks": "Charter billed on account",
                    "is_receivable": true,
                    "due_date": days_from_today(30),
                    "payer_name": "Northside Academy",
                    "installments": lines,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[allow(dead_code)]
pub fn days_from_today(days: u64) -> NaiveDate {
    today().checked_add_days(Days::new(days)).unwrap()
}

#[allow(dead_code)]
pub fn days_ago(days: u64) -> NaiveDate {
    today().checked_sub_days(Days::new(days)).unwrap()
}

/// Decimal from a JSON string or number.
#[allow(dead_code)]
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap(),
        other => panic!("expected a decimal, got {}", other),
    }
}

#[allow(dead_code)]
pub fn uuid(value: &Value) -> Uuid {
    Uuid::from_str(value.as_str().unwrap()).unwrap()
}
