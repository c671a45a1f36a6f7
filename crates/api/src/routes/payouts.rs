//! Picker payout routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use mavuno_shared::types::{CollectionId, PaymentBatchId, PickerId};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::error::map_cash_error;
use crate::{AppState, middleware::AuthUser};

/// Creates the payout routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/collections/{id}/payment-batches", post(pay_batch))
        .route("/collections/{id}/payouts", get(reconciliation))
        .route("/pickers/{id}/cash-paid", post(cash_paid))
}

/// Request body for a batch payout.
///
/// A retried request with the same `batch_id` replays the stored batch.
#[derive(Debug, Deserialize)]
pub struct PayBatchRequest {
    /// Client-chosen batch id.
    pub batch_id: PaymentBatchId,
    /// Pickers to pay; already-paid ones are skipped.
    pub picker_ids: Vec<PickerId>,
    /// Must equal the eligible pickers' pay.
    pub total_amount: Decimal,
}

async fn pay_batch(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<CollectionId>,
    Json(req): Json<PayBatchRequest>,
) -> impl IntoResponse {
    match state
        .payouts
        .mark_pickers_paid_in_batch(
            auth.company_id(),
            id,
            req.batch_id,
            req.picker_ids,
            req.total_amount,
            &auth.actor(),
        )
        .await
    {
        Ok(receipt) => {
            let status = if receipt.replayed {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            (status, Json(receipt)).into_response()
        }
        Err(e) => map_cash_error(&e),
    }
}

async fn cash_paid(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<PickerId>,
) -> impl IntoResponse {
    match state
        .payouts
        .mark_picker_cash_paid(auth.company_id(), id)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({ "picker_id": id, "outcome": outcome })),
        )
            .into_response(),
        Err(e) => map_cash_error(&e),
    }
}

async fn reconciliation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<CollectionId>,
) -> impl IntoResponse {
    match state
        .payouts
        .reconciliation(auth.company_id(), id)
        .await
    {
        Ok(rec) => (StatusCode::OK, Json(rec)).into_response(),
        Err(e) => map_cash_error(&e),
    }
}
