use crate::services::metrics::{record_error, record_http_request};
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Count and time requests, labelled by the matched route template so ids in
/// the path do not explode label cardinality.
pub async fn http_metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status();
    record_http_request(&method, &route, status.as_u16(), start.elapsed().as_secs_f64());
    if status.is_server_error() {
        record_error("http_5xx");
    }
    response
}
