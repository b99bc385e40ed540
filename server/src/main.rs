use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use eventhive_server::config::{Config, StoreBackend};
use eventhive_server::routes::create_routes;
use eventhive_server::services::SimulatedPaymentGateway;
use eventhive_server::state::AppState;
use eventhive_server::store::{InMemoryStore, PostgresStore};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");
    let settings = config.workflow_settings();
    let payments = SimulatedPaymentGateway::new(config.payment_delay);

    let state = match (config.store_backend, config.database_url.as_deref()) {
        (StoreBackend::Postgres, Some(database_url)) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .acquire_timeout(config.store_timeout)
                .connect(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Successfully connected to database");

            sqlx::migrate!()
                .run(&pool)
                .await
                .expect("Failed to run migrations");
            tracing::info!("Migrations run successfully");

            AppState::new(Arc::new(PostgresStore::new(pool)), settings, payments)
        }
        _ => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            let store = InMemoryStore::new().with_max_cas_attempts(config.max_cas_attempts);
            AppState::new(Arc::new(store), settings, payments)
        }
    };

    if let Some(path) = &config.seed_events_path {
        match state.catalog.import_file(path).await {
            Ok(imported) => tracing::info!(imported, "Seed events loaded"),
            Err(e) => tracing::error!(error = %e, "Failed to load seed events"),
        }
    }

    let app = create_routes(state, &config);

    tracing::info!("🚀 Server running at http://{}", config.bind_address);
    let listener = TcpListener::bind(config.bind_address)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
