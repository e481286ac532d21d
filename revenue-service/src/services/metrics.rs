//! Prometheus metrics for revenue-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for HTTP requests by method, route and status.
pub static HTTP_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "revenue_http_requests_total",
        "Total number of HTTP requests",
        &["method", "route", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS")
});

/// Histogram for HTTP request duration by method and route.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "revenue_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "route"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register HTTP_REQUEST_DURATION")
});

/// Histogram for database query duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "revenue_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for revenue record operations.
pub static REVENUE_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "revenue_operations_total",
        "Total number of revenue record operations",
        &["operation", "status"]
    )
    .expect("Failed to register REVENUE_OPERATIONS")
});

/// Counter for recorded payments.
pub static PAYMENTS_RECORDED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "revenue_payments_recorded_total",
        "Total number of recorded payments",
        &["target"]
    )
    .expect("Failed to register PAYMENTS_RECORDED")
});

/// Counter for shortage loan upserts.
pub static LOAN_UPSERTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "revenue_loan_upserts_total",
        "Total number of boundary loan upserts",
        &["trigger", "status"]
    )
    .expect("Failed to register LOAN_UPSERTS")
});

/// Counter for post-commit effects that failed and were reported as warnings.
pub static SECONDARY_EFFECT_FAILURES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "revenue_secondary_effect_failures_total",
        "Total number of failed post-commit effects",
        &["effect"]
    )
    .expect("Failed to register SECONDARY_EFFECT_FAILURES")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "revenue_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS);
    Lazy::force(&HTTP_REQUEST_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&REVENUE_OPERATIONS);
    Lazy::force(&PAYMENTS_RECORDED);
    Lazy::force(&LOAN_UPSERTS);
    Lazy::force(&SECONDARY_EFFECT_FAILURES);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS
        .with_label_values(&[method, route, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[method, route])
        .observe(duration_secs);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}

/// Record a revenue record operation.
pub fn record_revenue_operation(operation: &str, status: &str) {
    REVENUE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

/// Record a payment against an installment or a revenue record.
pub fn record_payment(target: &str) {
    PAYMENTS_RECORDED.with_label_values(&[target]).inc();
}

/// Record a loan upsert.
pub fn record_loan_upsert(trigger: &str, status: &str) {
    LOAN_UPSERTS.with_label_values(&[trigger, status]).inc();
}

/// Record a failed post-commit effect.
pub fn record_secondary_failure(effect: &str) {
    SECONDARY_EFFECT_FAILURES.with_label_values(&[effect]).inc();
}
