//! Mapping of domain errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mavuno_core::{CashError, ErrorClass};
use serde_json::json;
use tracing::{error, warn};

/// Renders a [`CashError`] as `{"error": code, "message": text}`.
pub fn map_cash_error(e: &CashError) -> Response {
    let status =
        StatusCode::from_u16(e.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match e.class() {
        ErrorClass::Store => error!(error = %e, "Store failure"),
        ErrorClass::TransientStore => warn!(error = %e, "Store unavailable"),
        _ => {}
    }

    let mut body = json!({
        "error": e.error_code(),
        "message": e.to_string(),
    });
    if e.is_retryable() {
        body["retryable"] = json!(true);
    }
    (status, Json(body)).into_response()
}

/// Response for a request body the handler rejects before reaching the domain.
pub fn bad_request(error: &str, message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": error, "message": message })),
    )
        .into_response()
}
