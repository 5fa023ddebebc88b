mod clients;
mod config;
mod credentials;
mod dispatcher;
mod errors;
mod gateway;
mod models;
mod store;

use crate::clients::{setup_db_pool, setup_http_client};
use crate::config::Config;
use crate::dispatcher::dispatch_due_messages;
use crate::gateway::RocketChatGateway;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use actix_web::{App, HttpResponse, HttpServer, Responder, get};
use tokio::time;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[get("/health")]
async fn health_check() -> impl Responder {
    // Just return a 200 OK response
    HttpResponse::Ok().body("OK")
}

// Graceful shutdown signal future
async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = signal::ctrl_c();
    #[cfg(unix)]
    let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("Failed to install SIGTERM handler");
    #[cfg(unix)]
    let terminate = term_signal.recv();
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received. Exiting dispatch loop.");
}

async fn run_dispatcher_logic(config: Config) {
    // 1. Connect to the Database
    info!("Connecting to database...");
    let db_pool = setup_db_pool(&config)
        .await
        .expect("failed to create database connection.");
    info!("Database connection established.");

    // 2. Build the chat gateway client
    let http_client = setup_http_client(&config).expect("failed to build HTTP client.");
    let gateway = Arc::new(RocketChatGateway::new(http_client));
    info!(
        timeout_secs = config.gateway_timeout_secs,
        "Chat gateway client ready."
    );

    // 3. Fire a dispatch run on every tick
    info!(
        interval_ms = config.dispatch_interval_ms,
        batch_size = config.batch_size,
        "Starting scheduled message dispatch timer..."
    );
    let mut interval = time::interval(Duration::from_millis(config.dispatch_interval_ms));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let db_pool_clone = db_pool.clone();
                let gateway_clone = gateway.clone();
                let batch_size = config.batch_size;

                tokio::spawn(async move {
                    match dispatch_due_messages(&db_pool_clone, gateway_clone.as_ref(), Utc::now(), batch_size).await {
                        Ok(summary) => {
                            if summary.sent > 0 || summary.failed > 0 {
                                info!(sent = summary.sent, failed = summary.failed, "Dispatch run finished.");
                            }
                        }
                        Err(e) => error!("Error during dispatch run: {}", e),
                    }
                });
            },
            _ = shutdown_signal() => {
                break;
            }
        }
    }
    info!("Dispatcher shutting down.");
}

/// The main function sets up our application's state and runs the timer.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    // --- Configuration ---
    info!("Loading configuration...");
    let config = Config::load().expect("Failed to load configuration");
    info!("Configuration loaded.");
    let health_port = config.health_port;

    let dispatcher_handle = tokio::spawn(async move {
        run_dispatcher_logic(config).await;
    });

    // Spawn the health check server
    let health_server = HttpServer::new(|| {
        App::new().service(health_check)
    })
    .bind(("0.0.0.0", health_port))?
    .run();

    info!("Health check server running on http://0.0.0.0:{health_port}");

    // Keep both tasks running
    // This will error out if either the server or the dispatcher task fails
    let _ = tokio::try_join!(
        async { health_server.await },
        async { dispatcher_handle.await.map_err(std::io::Error::other) }
    )?;

    Ok(())
}
