//! HTTP API server with observability for the order saga service.
//!
//! Provides REST endpoints for order creation, listing, and state
//! transitions, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use clients::{InMemoryEventSink, InMemoryInventory, InMemoryUserDirectory};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/pay", post(routes::orders::pay::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Handles to the in-memory service doubles behind the default state.
///
/// Lets the binary (and tests) seed users and products and inspect
/// published events without reaching through the orchestrator.
pub struct ServiceHandles {
    pub users: InMemoryUserDirectory,
    pub inventory: InMemoryInventory,
    pub events: InMemoryEventSink,
}

/// Creates the default application state wired to in-memory services.
pub fn create_default_state<S: OrderStore + Clone + 'static>(
    store: S,
) -> (Arc<AppState<S>>, ServiceHandles) {
    use saga::OrderOrchestrator;

    let users = InMemoryUserDirectory::new();
    let inventory = InMemoryInventory::new();
    let events = InMemoryEventSink::new();

    let orchestrator =
        OrderOrchestrator::new(store, users.clone(), inventory.clone(), events.clone());

    let state = Arc::new(AppState { orchestrator });

    (
        state,
        ServiceHandles {
            users,
            inventory,
            events,
        },
    )
}
