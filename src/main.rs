use std::panic;
use std::sync::Arc;

use canvas_collab::collab::{service, Coordinator, TracingActivity};
use canvas_collab::config::Config;
use canvas_collab::routes::create_app;
use canvas_collab::services::auth_service::JwtVerifier;
use canvas_collab::state::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "canvas_collab=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    if config.auth_jwt_secret.is_none() {
        warn!("No JWT secret configured - every connection attempt will be rejected");
    }

    // Start the coordinator
    let coordinator = Coordinator::new(config.limits()).with_activity(TracingActivity);
    let (handle, coordinator_task) = service::spawn(
        coordinator,
        config.sweep_interval(),
        config.command_buffer,
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        coordinator: handle.clone(),
        verifier: Arc::new(JwtVerifier::new(config.auth_jwt_secret.clone())),
    };
    let app = create_app(state);

    // Start the HTTP/WebSocket server
    let listener = match tokio::net::TcpListener::bind(config.server_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.server_address(), e);
            return;
        }
    };

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    handle.shutdown().await;
    if let Err(e) = coordinator_task.await {
        error!("Coordinator task failed: {}", e);
    }
    info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
