//! Integration tests for boundary shortage loans and the assignment cache.

mod common;

use axum::http::StatusCode;
use common::{decimal, spawn_app, today, TestApp, BOUNDARY_ASSIGNMENT, BOUNDARY_TRIP};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn create_boundary(app: &TestApp, remitted: &str) -> common::TestResponse {
    app.post(
        "/revenues",
        json!({
            "bus_trip_id": BOUNDARY_TRIP,
            "total_amount": remitted,
            "collection_date": today(),
            "payment_status_id": app.pending,
            "remarks": "Boundary remittance for trip",
        }),
    )
    .await
}

fn share_amounts(loan: &Value) -> Vec<Decimal> {
    loan["shares"]
        .as_array()
        .unwrap()
        .iter()
        .map(|share| decimal(&share["share_amount"]))
        .collect()
}

#[tokio::test]
async fn test_short_boundary_remittance_creates_split_loan() {
    let app = spawn_app().await;

    let response = create_boundary(&app, "1800").await;

    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    let body = &response.body;
    assert_eq!(body["assignment_id"], BOUNDARY_ASSIGNMENT);
    assert_eq!(body["category_kind"], "Boundary");
    assert_eq!(decimal(&body["total_amount"]), dec!(2000));
    assert_eq!(decimal(&body["remitted_amount"]), dec!(1800));
    assert_eq!(decimal(&body["outstanding_balance"]), dec!(200));
    assert_eq!(body["payment_status_name"], "Partially Paid");
    assert_eq!(body["boundary_loss"]["is_loss"], false);
    assert_eq!(body["warnings"].as_array().unwrap().len(), 0);

    let loan = &body["loan"];
    assert_eq!(decimal(&loan["shortage"]), dec!(200));
    assert_eq!(decimal(&loan["principal"]), dec!(200));
    assert_eq!(share_amounts(loan), vec![dec!(100), dec!(100)]);
    assert_eq!(loan["shares"][0]["role"], "driver");
    assert_eq!(loan["shares"][0]["employee_name"], "Juan Dela Cruz");
    assert_eq!(loan["shares"][1]["role"], "conductor");

    let schedule = loan["shares"][0]["installments"].as_array().unwrap();
    assert_eq!(schedule.len(), 3);
    let amounts: Vec<Decimal> = schedule.iter().map(|i| decimal(&i["amount_due"])).collect();
    assert_eq!(amounts, vec![dec!(33.33), dec!(33.33), dec!(33.34)]);
    let first_due: chrono::NaiveDate = schedule[0]["due_date"].as_str().unwrap().parse().unwrap();
    assert_eq!(first_due, today() + chrono::Days::new(7));
}

#[tokio::test]
async fn test_full_boundary_remittance_has_no_loan() {
    let app = spawn_app().await;

    let response = create_boundary(&app, "2000").await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(decimal(&response.body["outstanding_balance"]), dec!(0));
    assert!(response.body["loan"].is_null());

    let loan = app
        .get(&format!(
            "/revenues/{}/loan",
            response.body["revenue_id"].as_str().unwrap()
        ))
        .await;
    assert_eq!(loan.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_boundary_remittance_conflicts() {
    let app = spawn_app().await;

    assert_eq!(create_boundary(&app, "1800").await.status, StatusCode::CREATED);
    let duplicate = create_boundary(&app, "1900").await;

    assert_eq!(duplicate.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_payment_clamps_loan_to_outstanding() {
    let app = spawn_app().await;
    let created = create_boundary(&app, "1800").await;
    let revenue_id = created.body["revenue_id"].as_str().unwrap().to_string();

    let payment = app
        .post(
            &format!("/revenues/{}/payments", revenue_id),
            json!({
                "payments": [
                    { "amount": "50", "payment_method_id": app.cash, "payment_status_id": app.paid }
                ]
            }),
        )
        .await;
    assert_eq!(payment.status, StatusCode::CREATED, "{}", payment.body);
    assert_eq!(decimal(&payment.body["outstanding_balance"]), dec!(150));

    let loan = app.get(&format!("/revenues/{}/loan", revenue_id)).await;
    assert_eq!(loan.status, StatusCode::OK);
    assert_eq!(decimal(&loan.body["principal"]), dec!(150));
    assert_eq!(decimal(&loan.body["shortage"]), dec!(200));
    assert_eq!(share_amounts(&loan.body), vec![dec!(75), dec!(75)]);
    let schedule_total: Decimal = loan.body["shares"][0]["installments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| decimal(&i["amount_due"]))
        .sum();
    assert_eq!(schedule_total, dec!(75));
}

#[tokio::test]
async fn test_edit_regenerates_loan_keeping_split() {
    let app = spawn_app().await;
    let created = create_boundary(&app, "1800").await;
    let revenue_id = created.body["revenue_id"].as_str().unwrap().to_string();

    let manual = app
        .post(
            &format!("/revenues/{}/loan", revenue_id),
            json!({
                "shares": [
                    { "employee_id": "EMP-DRV-1", "employee_name": "Juan Dela Cruz", "role": "driver", "share_amount": "150" },
                    { "employee_id": "EMP-CON-1", "employee_name": "Pedro Santos", "role": "conductor", "share_amount": "50" }
                ]
            }),
        )
        .await;
    assert_eq!(manual.status, StatusCode::OK, "{}", manual.body);

    let updated = app
        .patch(
            &format!("/revenues/{}", revenue_id),
            json!({ "total_amount": "1900" }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK, "{}", updated.body);
    assert_eq!(decimal(&updated.body["outstanding_balance"]), dec!(100));

    let loan = &updated.body["loan"];
    assert_eq!(decimal(&loan["principal"]), dec!(100));
    assert_eq!(share_amounts(loan), vec![dec!(75), dec!(25)]);
    assert_eq!(loan["loan_id"], manual.body["loan"]["loan_id"]);
}

#[tokio::test]
async fn test_manual_shares_must_cover_shortfall() {
    let app = spawn_app().await;
    let created = create_boundary(&app, "1800").await;
    let uri = format!(
        "/revenues/{}/loan",
        created.body["revenue_id"].as_str().unwrap()
    );

    let mismatch = app
        .post(
            &uri,
            json!({
                "shares": [
                    { "employee_name": "Juan Dela Cruz", "role": "driver", "share_amount": "100" },
                    { "employee_name": "Pedro Santos", "role": "conductor", "share_amount": "50" }
                ]
            }),
        )
        .await;
    assert_eq!(mismatch.status, StatusCode::BAD_REQUEST);
    assert!(mismatch.body["error"].as_str().unwrap().contains("shares"));

    let three_way = app
        .post(
            &uri,
            json!({
                "shares": [
                    { "employee_name": "Juan Dela Cruz", "role": "driver", "share_amount": "120" },
                    { "employee_name": "Pedro Santos", "role": "conductor", "share_amount": "50" },
                    { "employee_name": "Ramon Reyes", "share_amount": "30.005" }
                ]
            }),
        )
        .await;
    assert_eq!(three_way.status, StatusCode::OK, "{}", three_way.body);
    let loan = &three_way.body["loan"];
    assert_eq!(loan["shares"].as_array().unwrap().len(), 3);
    assert_eq!(loan["shares"][2]["role"], "other");
    let total: Decimal = share_amounts(loan).into_iter().sum();
    assert_eq!(total, dec!(200));
}

#[tokio::test]
async fn test_loan_requires_boundary_record() {
    let app = spawn_app().await;
    let manual = app.create_manual("1500").await;

    let response = app
        .post(
            &format!("/revenues/{}/loan", manual["revenue_id"].as_str().unwrap()),
            json!({}),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("Boundary"));

    let missing = app
        .post(&format!("/revenues/{}/loan", uuid::Uuid::new_v4()), json!({}))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_loan_write_is_reported_as_warning() {
    let app = spawn_app().await;
    app.store.fail_loan_writes(true).await;

    let response = create_boundary(&app, "1800").await;

    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    assert_eq!(decimal(&response.body["outstanding_balance"]), dec!(200));
    assert!(response.body["loan"].is_null());
    let warnings = response.body["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].as_str().unwrap().contains("Loan"));

    // The revenue survived; a later refresh generates the loan.
    app.store.fail_loan_writes(false).await;
    let revenue_id = response.body["revenue_id"].as_str().unwrap();
    let refreshed = app
        .request(
            axum::http::Method::POST,
            &format!("/revenues/{}/loan", revenue_id),
            None,
        )
        .await;
    assert_eq!(refreshed.status, StatusCode::OK, "{}", refreshed.body);
    assert_eq!(decimal(&refreshed.body["loan"]["principal"]), dec!(200));
}

#[tokio::test]
async fn test_sync_assignment_and_structural_loss() {
    let app = spawn_app().await;

    let synced = app
        .post(
            "/assignments/sync",
            json!({
                "assignment_id": "ASG-LOSS-1",
                "bus_trip_id": "TRIP-LOSS-1",
                "assignment_type": "Boundary",
                "assignment_value": "2500",
                "trip_revenue": 2200,
                "driver_id": "EMP-DRV-2",
                "driver_name": "Ana Lopez",
            }),
        )
        .await;
    assert_eq!(synced.status, StatusCode::OK, "{}", synced.body);
    assert_eq!(decimal(&synced.body["assignment_value"]), dec!(2500));
    assert_eq!(decimal(&synced.body["trip_revenue"]), dec!(2200));

    let created = app
        .post(
            "/revenues",
            json!({
                "bus_trip_id": "TRIP-LOSS-1",
                "total_amount": "2200",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Boundary above trip revenue",
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(created.body["boundary_loss"]["is_loss"], true);
    assert_eq!(decimal(&created.body["boundary_loss"]["loss_amount"]), dec!(300));

    // No conductor on this trip: the driver carries the whole shortfall.
    let loan = &created.body["loan"];
    assert_eq!(decimal(&loan["principal"]), dec!(300));
    assert_eq!(share_amounts(loan), vec![dec!(300)]);
}

#[tokio::test]
async fn test_trip_derived_boundary_books_full_fee_without_loan() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/revenues",
            json!({
                "bus_trip_id": BOUNDARY_TRIP,
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Boundary remittance for trip",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    assert_eq!(decimal(&response.body["total_amount"]), dec!(2000));
    assert_eq!(decimal(&response.body["remitted_amount"]), dec!(2000));
    assert_eq!(decimal(&response.body["outstanding_balance"]), dec!(0));
    assert!(response.body["loan"].is_null());
}

#[tokio::test]
async fn test_trip_derived_structural_loss_is_reported_not_rejected() {
    let app = spawn_app().await;
    let synced = app
        .post(
            "/assignments/sync",
            json!({
                "assignment_id": "ASG-LOSS-2",
                "bus_trip_id": "TRIP-LOSS-2",
                "assignment_type": "Boundary",
                "assignment_value": 2500,
                "trip_revenue": 2200,
                "driver_name": "Ana Lopez",
            }),
        )
        .await;
    assert_eq!(synced.status, StatusCode::OK, "{}", synced.body);

    let created = app
        .post(
            "/revenues",
            json!({
                "bus_trip_id": "TRIP-LOSS-2",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Boundary above trip revenue",
            }),
        )
        .await;

    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);
    assert_eq!(decimal(&created.body["remitted_amount"]), dec!(2200));
    assert_eq!(created.body["boundary_loss"]["is_loss"], true);
    assert_eq!(decimal(&created.body["boundary_loss"]["loss_amount"]), dec!(300));
}

#[tokio::test]
async fn test_sync_assignment_parses_amounts_leniently() {
    let app = spawn_app().await;

    let synced = app
        .post(
            "/assignments/sync",
            json!({
                "assignment_id": "ASG-LENIENT",
                "bus_trip_id": "TRIP-LENIENT",
                "assignment_type": "Percentage",
                "assignment_value": "not a number",
                "trip_revenue": null,
            }),
        )
        .await;

    assert_eq!(synced.status, StatusCode::OK);
    assert_eq!(decimal(&synced.body["assignment_value"]), dec!(0));
    assert_eq!(decimal(&synced.body["trip_revenue"]), dec!(0));

    let invalid = app
        .post(
            "/assignments/sync",
            json!({ "assignment_id": "", "bus_trip_id": "T", "assignment_type": "Boundary" }),
        )
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
}
