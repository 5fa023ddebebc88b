use crate::config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

/// Creates and returns a new database connection pool.
pub async fn setup_db_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(config.database_url())
        .await
}

/// Creates the HTTP client used for all gateway calls.
///
/// A single explicit timeout covers every request; the gateway has no
/// per-endpoint timeout of its own.
pub fn setup_http_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.gateway_timeout_secs))
        .build()
}
