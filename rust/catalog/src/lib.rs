pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod models;
pub mod params;
pub mod query;
pub mod schema;
pub mod server;
pub mod state;
pub mod store;
pub mod telemetry;

use crate::{config::AppConfig, server::Server};

/// Bootstraps the catalog service using environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    Server::new(config).await?.run().await
}
