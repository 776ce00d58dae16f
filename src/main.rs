use std::sync::Arc;

use fitness_trainer::{app, auth::PasswordService, db, AppConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Fitness Trainer API - Starting...");

    let config = AppConfig::from_env().expect("Invalid configuration");
    let credentials = Arc::new(
        config
            .credential_provider()
            .expect("Failed to load token signing keys"),
    );

    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("Failed to create database pool");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let service = app::postgres_service(db_pool, credentials, PasswordService::default());
    let router = app::create_router(Arc::new(service));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Fitness Trainer API is running on http://{}", addr);

    axum::serve(listener, router).await.expect("Server error");
}
