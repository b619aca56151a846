mod exercises;
mod handlers;
mod metrics;
mod routes;

use axum::Router;
use praxis_common::GraderConfig;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub registry: exercises::ExerciseRegistry,
    pub config: GraderConfig,
    pub start_time: std::time::Instant,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Praxis API booting...");

    // Initialize metrics
    metrics::init_metrics();
    info!("Metrics registry initialized");

    let config = GraderConfig::from_env();
    info!(
        budget_ms = config.budget_ms,
        fuel_limit = config.fuel_limit,
        "Grader configuration loaded"
    );

    // Load exercise definitions and gate them through the self-check
    let registry = exercises::ExerciseRegistry::load_from_file(&config.exercises_path)
        .unwrap_or_else(|e| {
            panic!(
                "Failed to load exercise definitions from {}: {}",
                config.exercises_path, e
            );
        });
    let loaded = registry.len();
    let registry = registry.verify(&config).await;
    info!(
        "Published {} of {} exercise definitions",
        registry.len(),
        loaded
    );
    if registry.is_empty() {
        tracing::warn!("No exercises passed their self-check; the API will serve none");
    }

    let state = Arc::new(AppState {
        registry,
        config,
        start_time: std::time::Instant::now(),
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    // Start server
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!("HTTP server listening on {}", addr);
    info!("Ready to grade submissions");

    axum::serve(listener, app).await.expect("Server error");
}
