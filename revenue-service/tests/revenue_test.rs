//! Integration tests for revenue creation, updates, listing and deletion.

mod common;

use axum::http::StatusCode;
use common::{days_ago, days_from_today, decimal, spawn_app, today, uuid, PERCENTAGE_TRIP};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn test_create_manual_revenue() {
    let app = spawn_app().await;

    let body = app.create_manual("1500.00").await;

    assert_eq!(body["revenue_code"], "REV-00001");
    assert_eq!(decimal(&body["total_amount"]), dec!(1500));
    assert_eq!(decimal(&body["outstanding_balance"]), dec!(1500));
    assert_eq!(uuid(&body["payment_status_id"]), app.pending);
    assert_eq!(body["category_name"], "Charter Services");
    assert_eq!(body["category_kind"], "Other");
    assert_eq!(body["warnings"].as_array().unwrap().len(), 0);

    let second = app.create_manual("1750").await;
    assert_eq!(second["revenue_code"], "REV-00002");
}

#[tokio::test]
async fn test_paid_manual_revenue_is_settled() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "800",
                "collection_date": today(),
                "payment_method_id": app.cash,
                "payment_status_id": app.paid,
                "remarks": "Cash charter payment",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(decimal(&response.body["outstanding_balance"]), dec!(0));
    assert_eq!(decimal(&response.body["total_paid"]), dec!(800));
    assert_eq!(response.body["payment_method_name"], "Cash");
}

#[tokio::test]
async fn test_paid_revenue_requires_payment_method() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "800",
                "collection_date": today(),
                "payment_status_id": app.paid,
                "remarks": "Cash charter payment",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("payment_method_id"));
    assert_eq!(app.store.revenue_count().await, 0);
}

#[tokio::test]
async fn test_duplicate_manual_revenue_conflicts() {
    let app = spawn_app().await;
    app.create_manual("1500").await;

    let response = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "1500.00",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Same charter entered twice",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("REV-00001"));

    // Same category and amount on another day is a different transaction.
    let response = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "1500",
                "collection_date": days_ago(1),
                "payment_status_id": app.pending,
                "remarks": "Yesterday's charter",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_remarks_length_is_enforced() {
    let app = spawn_app().await;

    for remarks in ["  abc  ".to_string(), "x".repeat(501)] {
        let response = app
            .post(
                "/revenues",
                json!({
                    "category_id": app.other_category,
                    "total_amount": "100",
                    "collection_date": today(),
                    "payment_status_id": app.pending,
                    "remarks": remarks,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.body["error"].as_str().unwrap().contains("remarks"));
    }
}

#[tokio::test]
async fn test_collection_date_window() {
    let app = spawn_app().await;

    for date in [days_from_today(1), days_ago(120)] {
        let response = app
            .post(
                "/revenues",
                json!({
                    "category_id": app.other_category,
                    "total_amount": "100",
                    "collection_date": date,
                    "payment_status_id": app.pending,
                    "remarks": "Out of window",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", date);
        assert!(response.body["error"]
            .as_str()
            .unwrap()
            .contains("collection_date"));
    }

    let response = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "100",
                "collection_date": days_ago(60),
                "payment_status_id": app.pending,
                "remarks": "Within the window",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_status_not_applicable_to_revenue_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "100",
                "collection_date": today(),
                "payment_status_id": app.refunded,
                "remarks": "Wrong status module",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("payment_status_id"));
}

#[tokio::test]
async fn test_unknown_category_is_not_found() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/revenues",
            json!({
                "category_id": uuid::Uuid::new_v4(),
                "total_amount": "100",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Missing category",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bus_trip_creation_derives_category_and_amount() {
    let app = spawn_app().await;

    let request = json!({
        "bus_trip_id": PERCENTAGE_TRIP,
        "collection_date": today(),
        "payment_status_id": app.pending,
        "remarks": "Percentage share for trip",
    });
    let response = app.post("/revenues", request.clone()).await;

    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    assert_eq!(uuid(&response.body["category_id"]), app.percentage_category);
    assert_eq!(decimal(&response.body["total_amount"]), dec!(484));
    assert_eq!(response.body["assignment_id"], common::PERCENTAGE_ASSIGNMENT);

    // Same assignment, date and category again.
    let duplicate = app.post("/revenues", request).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_trip_bound_amount_cap() {
    let app = spawn_app().await;

    let over = app
        .post(
            "/revenues",
            json!({
                "bus_trip_id": PERCENTAGE_TRIP,
                "total_amount": "2300",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "More than the trip earned",
            }),
        )
        .await;
    assert_eq!(over.status, StatusCode::BAD_REQUEST);
    assert!(over.body["error"].as_str().unwrap().contains("total_amount"));

    let at_cap = app
        .post(
            "/revenues",
            json!({
                "bus_trip_id": PERCENTAGE_TRIP,
                "total_amount": "2200",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Exactly the trip revenue",
            }),
        )
        .await;
    assert_eq!(at_cap.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_unknown_bus_trip_is_not_found() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/revenues",
            json!({
                "bus_trip_id": "TRIP-UNKNOWN",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Trip is not synced",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_receivable_fields_are_required() {
    let app = spawn_app().await;

    let missing_payer = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "1000",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Charter on account",
                "is_receivable": true,
                "due_date": days_from_today(30),
            }),
        )
        .await;
    assert_eq!(missing_payer.status, StatusCode::BAD_REQUEST);
    assert!(missing_payer.body["error"]
        .as_str()
        .unwrap()
        .contains("payer_name"));

    let due_before_collection = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "1000",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Charter on account",
                "is_receivable": true,
                "due_date": days_ago(1),
                "payer_name": "Northside Academy",
            }),
        )
        .await;
    assert_eq!(due_before_collection.status, StatusCode::BAD_REQUEST);
    assert!(due_before_collection.body["error"]
        .as_str()
        .unwrap()
        .contains("due_date"));

    let negative_rate = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "1000",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Charter on account",
                "is_receivable": true,
                "due_date": days_from_today(30),
                "payer_name": "Northside Academy",
                "interest_rate": "-1",
            }),
        )
        .await;
    assert_eq!(negative_rate.status, StatusCode::BAD_REQUEST);
    assert!(negative_rate.body["error"]
        .as_str()
        .unwrap()
        .contains("interest_rate"));
}

#[tokio::test]
async fn test_receivable_with_installments_takes_total_from_plan() {
    let app = spawn_app().await;

    let body = app.create_receivable(&["600", "400"]).await;

    assert_eq!(decimal(&body["total_amount"]), dec!(1000));
    assert_eq!(decimal(&body["outstanding_balance"]), dec!(1000));
    assert_eq!(body["is_receivable"], true);
    let installments = body["installments"].as_array().unwrap();
    assert_eq!(installments.len(), 2);
    assert_eq!(installments[0]["installment_number"], 1);
    assert_eq!(installments[0]["status"], "Pending");
    assert_eq!(installments[0]["effective_status"], "Pending");
}

#[tokio::test]
async fn test_installments_must_match_total() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "1000",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Charter on account",
                "is_receivable": true,
                "due_date": days_from_today(30),
                "payer_name": "Northside Academy",
                "installments": [
                    { "due_date": days_from_today(7), "amount_due": "500" },
                    { "due_date": days_from_today(14), "amount_due": "400" }
                ],
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("installments"));
}

#[tokio::test]
async fn test_installments_require_receivable() {
    let app = spawn_app().await;

    let response = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "1000",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Not on account",
                "installments": [
                    { "due_date": days_from_today(7), "amount_due": "1000" }
                ],
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_add_installments_to_receivable_once() {
    let app = spawn_app().await;

    let created = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "900",
                "collection_date": today(),
                "payment_status_id": app.pending,
                "remarks": "Charter on account",
                "is_receivable": true,
                "due_date": days_from_today(30),
                "payer_name": "Northside Academy",
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let revenue_id = created.body["revenue_id"].as_str().unwrap().to_string();
    let uri = format!("/revenues/{}/installments", revenue_id);
    let plan = json!({
        "installments": [
            { "due_date": days_from_today(7), "amount_due": "450" },
            { "due_date": days_from_today(14), "amount_due": "450" }
        ]
    });

    let added = app.post(&uri, plan.clone()).await;
    assert_eq!(added.status, StatusCode::CREATED, "{}", added.body);
    assert_eq!(added.body["installments"].as_array().unwrap().len(), 2);

    let again = app.post(&uri, plan).await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert!(again.body["error"].as_str().unwrap().contains("installments"));
}

#[tokio::test]
async fn test_add_installments_rejects_non_receivable() {
    let app = spawn_app().await;
    let created = app.create_manual("900").await;

    let response = app
        .post(
            &format!("/revenues/{}/installments", created["revenue_id"].as_str().unwrap()),
            json!({
                "installments": [ { "due_date": days_from_today(7), "amount_due": "900" } ]
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("receivable"));
}

#[tokio::test]
async fn test_update_revenue_recomputes_outstanding() {
    let app = spawn_app().await;
    let created = app.create_manual("1500").await;
    let uri = format!("/revenues/{}", created["revenue_id"].as_str().unwrap());

    let response = app
        .patch(
            &uri,
            json!({ "total_amount": "1800", "remarks": "Corrected charter amount" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(decimal(&response.body["total_amount"]), dec!(1800));
    assert_eq!(decimal(&response.body["outstanding_balance"]), dec!(1800));
    assert_eq!(response.body["remarks"], "Corrected charter amount");
    assert_eq!(response.body["revenue_code"], created["revenue_code"]);

    let settled = app
        .patch(
            &uri,
            json!({ "payment_status_id": app.paid, "payment_method_id": app.cash }),
        )
        .await;
    assert_eq!(settled.status, StatusCode::OK);
    assert_eq!(decimal(&settled.body["outstanding_balance"]), dec!(0));
}

#[tokio::test]
async fn test_update_rejects_collection_date_in_future() {
    let app = spawn_app().await;
    let created = app.create_manual("1500").await;

    let response = app
        .patch(
            &format!("/revenues/{}", created["revenue_id"].as_str().unwrap()),
            json!({ "collection_date": days_from_today(2) }),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_into_duplicate_conflicts() {
    let app = spawn_app().await;
    app.create_manual("1500").await;
    let second = app.create_manual("1600").await;

    let response = app
        .patch(
            &format!("/revenues/{}", second["revenue_id"].as_str().unwrap()),
            json!({ "total_amount": "1500" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_paginates_and_sorts() {
    let app = spawn_app().await;
    app.create_manual("300").await;
    app.create_manual("100").await;
    app.create_manual("200").await;

    let page = app.get("/revenues?page=1&limit=2&sort=amount&order=asc").await;

    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.headers["x-total-count"], "3");
    assert_eq!(page.body["total"], 3);
    assert_eq!(page.body["total_pages"], 2);
    let data = page.body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(decimal(&data[0]["total_amount"]), dec!(100));
    assert_eq!(decimal(&data[1]["total_amount"]), dec!(200));

    let second = app.get("/revenues?page=2&limit=2&sort=amount&order=asc").await;
    let data = second.body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(decimal(&data[0]["total_amount"]), dec!(300));
}

#[tokio::test]
async fn test_list_filters_by_period() {
    let app = spawn_app().await;
    app.create_manual("100").await;
    let yesterday = app
        .post(
            "/revenues",
            json!({
                "category_id": app.other_category,
                "total_amount": "250",
                "collection_date": days_ago(1),
                "payment_status_id": app.pending,
                "remarks": "Yesterday's charter",
            }),
        )
        .await;
    assert_eq!(yesterday.status, StatusCode::CREATED);

    let today_only = app
        .get(&format!("/revenues?period=Day&reference_date={}", today()))
        .await;
    assert_eq!(today_only.body["total"], 1);

    let range = app
        .get(&format!(
            "/revenues?date_from={}&date_to={}",
            days_ago(1),
            days_ago(1)
        ))
        .await;
    assert_eq!(range.body["total"], 1);
    assert_eq!(decimal(&range.body["data"][0]["total_amount"]), dec!(250));
}

#[tokio::test]
async fn test_soft_delete_hides_record() {
    let app = spawn_app().await;
    let created = app.create_manual("1500").await;
    app.create_manual("1600").await;
    let uri = format!("/revenues/{}", created["revenue_id"].as_str().unwrap());

    let deleted = app.delete(&uri).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    assert_eq!(app.get(&uri).await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.delete(&uri).await.status, StatusCode::NOT_FOUND);

    let listing = app.get("/revenues").await;
    assert_eq!(listing.body["total"], 1);
    assert_eq!(listing.headers["x-total-count"], "1");

    // The duplicate key is free again once the original is deleted.
    app.create_manual("1500").await;
}

#[tokio::test]
async fn test_health_and_metrics_endpoints() {
    let app = spawn_app().await;

    let health = app.get("/health").await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body["status"], "ok");

    assert_eq!(app.get("/ready").await.status, StatusCode::OK);

    app.create_manual("100").await;
    let metrics = app.get("/metrics").await;
    assert_eq!(metrics.status, StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = spawn_app().await;

    let response = app.get("/health").await;

    assert!(response.headers.contains_key("x-request-id"));
}
