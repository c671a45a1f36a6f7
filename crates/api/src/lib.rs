//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes over the cash ledger, collections and payouts
//! - Bearer-token authentication middleware
//! - Mapping of domain errors onto JSON error responses
//!
//! The router is store-agnostic: it holds the services over
//! `dyn CashStore`, so the server wires in Postgres and tests the
//! in-memory store.

pub mod error;
pub mod middleware;
pub mod routes;

use axum::Router;
use mavuno_core::collection::{CollectionCache, CollectionService, HarvestSalePolicy};
use mavuno_core::ledger::{LedgerService, WalletProjection};
use mavuno_core::payout::PayoutBatcher;
use mavuno_core::store::CashStore;
use mavuno_shared::{AppConfig, JwtService};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cash ledger service.
    pub ledger: LedgerService<dyn CashStore>,
    /// Harvest collection service.
    pub collections: CollectionService<dyn CashStore>,
    /// Picker payout service.
    pub payouts: PayoutBatcher<dyn CashStore>,
    /// JWT service for token validation.
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    /// Wires the services over one store using the configured cache sizes
    /// and Harvest/Sale crop list.
    #[must_use]
    pub fn new(store: Arc<dyn CashStore>, config: &AppConfig, jwt_service: Arc<JwtService>) -> Self {
        let projection = WalletProjection::with_config(
            config.wallet.projection_capacity,
            config.wallet.projection_ttl_secs,
        );
        let cache = CollectionCache::with_config(
            config.settlement.collection_cache_capacity,
            config.settlement.collection_cache_ttl_secs,
        );
        let policy = HarvestSalePolicy::new(&config.settlement.harvest_sale_crop_types);
        Self::with_parts(store, projection, cache, policy, jwt_service)
    }

    /// Wires the services from explicit parts.
    #[must_use]
    pub fn with_parts(
        store: Arc<dyn CashStore>,
        projection: WalletProjection,
        cache: CollectionCache,
        policy: HarvestSalePolicy,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        let ledger = LedgerService::new(Arc::clone(&store), projection);
        let collections = CollectionService::new(Arc::clone(&store), ledger.clone(), cache, policy);
        let payouts = PayoutBatcher::new(store, ledger.clone(), collections.clone());
        Self {
            ledger,
            collections,
            payouts,
            jwt_service,
        }
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
