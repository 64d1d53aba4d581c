//! API server entry point.

use api::ServiceHandles;
use api::config::Config;
use common::{Money, ProductId, UserId};
use order_store::{InMemoryOrderStore, PostgresOrderStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Seeds a demo user and two products so the service is usable out of the
/// box; their IDs are logged at startup.
fn seed_demo_data(handles: &ServiceHandles) {
    let user = UserId::new();
    handles.users.add_user_with_addresses(
        user,
        vec![serde_json::json!({
            "street": "123 Main St",
            "city": "Springfield",
            "zip": "12345"
        })],
    );
    handles
        .inventory
        .add_product(ProductId::new("P1"), "Widget", Money::from_cents(1000), 100);
    handles
        .inventory
        .add_product(ProductId::new("P2"), "Gadget", Money::from_cents(250), 50);

    tracing::info!(user_id = %user, "seeded demo user and products P1, P2");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the order store and build the application
    let app = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresOrderStore::new(pool);
            store.run_migrations().await.expect("migrations failed");
            tracing::info!("using PostgreSQL order store");

            let (state, handles) = api::create_default_state(store);
            seed_demo_data(&handles);
            api::create_app(state, metrics_handle)
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory order store");
            let (state, handles) = api::create_default_state(InMemoryOrderStore::new());
            seed_demo_data(&handles);
            api::create_app(state, metrics_handle)
        }
    };

    // 4. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
