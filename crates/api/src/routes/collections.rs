//! Harvest collection routes: opening, weighing, settlement and harvest sync.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use mavuno_core::CashError;
use mavuno_core::collection::NewCollection;
use mavuno_shared::types::{CollectionId, PickerId, ProjectId};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::error::map_cash_error;
use crate::{AppState, middleware::AuthUser};

/// Creates the collection routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects/{project_id}/collections", post(open_collection))
        .route(
            "/projects/{project_id}/collections/harvest-sync",
            post(sync_project),
        )
        .route("/collections/{id}", get(get_collection))
        .route("/collections/{id}/pickers", post(register_picker))
        .route("/collections/{id}/weigh-entries", post(record_weigh_entry))
        .route("/collections/{id}/recalculate", post(recalculate))
        .route("/collections/{id}/settlement", post(settle))
        .route("/collections/{id}/harvest-sync", post(sync_collection))
        .route("/collections/{id}/payout-complete", post(payout_complete))
}

/// Request body for registering a picker.
#[derive(Debug, Deserialize)]
pub struct RegisterPickerRequest {
    /// Number printed on the picker's card.
    pub picker_number: u32,
    /// Display name.
    pub picker_name: String,
}

/// Request body for a weighing.
#[derive(Debug, Deserialize)]
pub struct WeighEntryRequest {
    /// Picker being weighed.
    pub picker_id: PickerId,
    /// Net weight in kilograms.
    pub weight_kg: Decimal,
    /// Trip to the scale, starting at 1.
    #[serde(default = "first_trip")]
    pub trip_number: u32,
}

const fn first_trip() -> u32 {
    1
}

/// Request body for pricing and optionally closing a collection.
#[derive(Debug, Deserialize)]
pub struct SettlementRequest {
    /// Price the buyer pays per kilogram.
    pub price_per_kg_buyer: Decimal,
    /// Close the collection once the buyer has paid.
    #[serde(default)]
    pub mark_buyer_paid: bool,
}

async fn open_collection(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<ProjectId>,
    Json(req): Json<NewCollection>,
) -> impl IntoResponse {
    match state
        .collections
        .open_collection(auth.scope(project_id), &auth.actor(), req)
        .await
    {
        Ok(collection) => (StatusCode::CREATED, Json(collection)).into_response(),
        Err(e) => map_cash_error(&e),
    }
}

async fn get_collection(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<CollectionId>,
) -> impl IntoResponse {
    match state.collections.detail(auth.company_id(), id).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => map_cash_error(&e),
    }
}

async fn register_picker(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<CollectionId>,
    Json(req): Json<RegisterPickerRequest>,
) -> impl IntoResponse {
    match state
        .collections
        .register_picker(auth.company_id(), id, req.picker_number, &req.picker_name)
        .await
    {
        Ok(picker) => (StatusCode::CREATED, Json(picker)).into_response(),
        Err(e) => map_cash_error(&e),
    }
}

async fn record_weigh_entry(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<CollectionId>,
    Json(req): Json<WeighEntryRequest>,
) -> impl IntoResponse {
    let company_id = auth.company_id();

    // The picker must belong to the collection named in the path
    let snapshot = match state.collections.detail(company_id, id).await {
        Ok(snapshot) => snapshot,
        Err(e) => return map_cash_error(&e),
    };
    if !snapshot.pickers.iter().any(|p| p.id == req.picker_id) {
        return map_cash_error(&CashError::PickerNotFound(req.picker_id));
    }

    match state
        .collections
        .record_weigh_entry(company_id, req.picker_id, req.weight_kg, req.trip_number)
        .await
    {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => map_cash_error(&e),
    }
}

async fn recalculate(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<CollectionId>,
) -> impl IntoResponse {
    match state
        .collections
        .recalculate_totals(auth.company_id(), id)
        .await
    {
        Ok(totals) => (StatusCode::OK, Json(totals)).into_response(),
        Err(e) => map_cash_error(&e),
    }
}

async fn settle(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<CollectionId>,
    Json(req): Json<SettlementRequest>,
) -> impl IntoResponse {
    match state
        .collections
        .set_buyer_price_and_maybe_close(
            auth.company_id(),
            id,
            req.price_per_kg_buyer,
            req.mark_buyer_paid,
            &auth.actor(),
        )
        .await
    {
        Ok(outcome) => {
            if outcome.degraded {
                info!(collection_id = %id, "Settlement answered from the offline path");
            }
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Err(e) => map_cash_error(&e),
    }
}

async fn sync_collection(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<CollectionId>,
) -> impl IntoResponse {
    match state
        .collections
        .sync_closed_collection_to_harvest_sale(auth.company_id(), id, &auth.actor())
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => map_cash_error(&e),
    }
}

async fn sync_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<ProjectId>,
) -> impl IntoResponse {
    match state
        .collections
        .sync_all(auth.scope(project_id), &auth.actor())
        .await
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => map_cash_error(&e),
    }
}

async fn payout_complete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<CollectionId>,
) -> impl IntoResponse {
    match state
        .collections
        .mark_payout_complete(auth.company_id(), id)
        .await
    {
        Ok(collection) => (StatusCode::OK, Json(collection)).into_response(),
        Err(e) => map_cash_error(&e),
    }
}
