//! Project wallet routes.
//!
//! The wallet is the append-only cash ledger of one project. Balances are
//! always folded from entries; there is no stored balance to update.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use mavuno_core::ledger::{EntryType, LedgerEntryInput, RefType};
use mavuno_shared::types::{PageRequest, ProjectId};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::error::{bad_request, map_cash_error};
use crate::{AppState, middleware::AuthUser};

/// Creates the wallet routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects/{project_id}/wallet", get(get_summary))
        .route(
            "/projects/{project_id}/wallet/entries",
            get(list_entries).post(append_entry),
        )
        .route("/projects/{project_id}/wallet/migrate", post(migrate_wallet))
}

/// Request body for a manual wallet entry.
#[derive(Debug, Deserialize)]
pub struct AppendEntryRequest {
    /// CREDIT or DEBIT.
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Strictly positive amount.
    pub amount: Decimal,
    /// Reason shown in the wallet history.
    pub reason: String,
    /// MANUAL (default) or ADJUSTMENT.
    pub ref_type: Option<RefType>,
    /// Referenced record id.
    pub ref_id: Option<String>,
    /// Deduplication key for retries.
    pub idempotency_key: Option<String>,
    /// Opaque metadata.
    #[serde(default)]
    pub meta: Map<String, Value>,
}

async fn get_summary(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<ProjectId>,
) -> impl IntoResponse {
    match state
        .ledger
        .summary(auth.scope(project_id), &auth.actor())
        .await
    {
        Ok(summary) => (StatusCode::OK, Json(json!({ "summary": summary }))).into_response(),
        Err(e) => map_cash_error(&e),
    }
}

async fn list_entries(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<ProjectId>,
    Query(page): Query<PageRequest>,
) -> impl IntoResponse {
    match state
        .ledger
        .entries(auth.scope(project_id), &auth.actor())
        .await
    {
        Ok(entries) => (StatusCode::OK, Json(page.paginate(entries))).into_response(),
        Err(e) => map_cash_error(&e),
    }
}

async fn append_entry(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<ProjectId>,
    Json(req): Json<AppendEntryRequest>,
) -> impl IntoResponse {
    let ref_type = req.ref_type.unwrap_or(RefType::Manual);
    if !matches!(ref_type, RefType::Manual | RefType::Adjustment) {
        return bad_request(
            "invalid_ref_type",
            "Only MANUAL and ADJUSTMENT entries can be posted directly",
        );
    }

    let mut input = match req.entry_type {
        EntryType::Credit => LedgerEntryInput::credit(req.amount, req.reason),
        EntryType::Debit => LedgerEntryInput::debit(req.amount, req.reason),
    }
    .with_ref_type(ref_type);
    input.ref_id = req.ref_id;
    input.idempotency_key = req.idempotency_key;
    input.meta = req.meta;

    let scope = auth.scope(project_id);
    match state.ledger.append(scope, &auth.actor(), input).await {
        Ok(outcome) => {
            let status = if outcome.is_duplicate() {
                StatusCode::OK
            } else {
                info!(scope = %scope, entry_id = %outcome.id(), "Manual wallet entry posted");
                StatusCode::CREATED
            };
            (
                status,
                Json(json!({ "id": outcome.id(), "duplicate": outcome.is_duplicate() })),
            )
                .into_response()
        }
        Err(e) => map_cash_error(&e),
    }
}

async fn migrate_wallet(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<ProjectId>,
) -> impl IntoResponse {
    match state
        .ledger
        .ensure_migrated(auth.scope(project_id), &auth.actor())
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(json!({ "migration": outcome }))).into_response(),
        Err(e) => map_cash_error(&e),
    }
}
