//! Storage backends that execute query plans.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::{
    config::{AppConfig, StoreConfig},
    db,
    error::Result,
    media::MediaUrls,
    params::Entity,
    query::{Criteria, PageRequest, QueryPlan},
};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Records come back as JSON documents with media URLs already resolved.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Criteria, then sort, then the plan's skip/limit window.
    async fn find(&self, plan: &QueryPlan) -> Result<Vec<Value>>;

    async fn count_documents(&self, entity: Entity, criteria: &Criteria) -> Result<i64>;

    async fn find_by_id(&self, entity: Entity, id: Uuid) -> Result<Option<Value>>;

    /// Products with a discounted price below their list price, largest
    /// discount first.
    async fn find_on_sale(&self, page: PageRequest) -> Result<Vec<Value>>;

    async fn count_on_sale(&self) -> Result<i64>;

    /// Native query text for a plan, when the backend has one.
    fn explain(&self, plan: &QueryPlan) -> Result<Option<String>>;
}

pub async fn open(config: &AppConfig) -> anyhow::Result<Arc<dyn CatalogStore>> {
    let media = MediaUrls::new(&config.base_url);
    match &config.store {
        StoreConfig::Postgres(pg) => {
            let pool = db::connect_pool(pg).await?;
            Ok(Arc::new(PgStore::new(pool, media)))
        }
        StoreConfig::Fixture(path) => {
            let store = MemoryStore::from_fixture(path, media)
                .with_context(|| format!("failed to load fixture {}", path.display()))?;
            info!(path = %path.display(), "serving catalog from fixture");
            Ok(Arc::new(store))
        }
    }
}
