use crate::{
    config::AppConfig,
    error::Result,
    params::{parse_entity, Entity, QuerySpec},
    query::{ListResponse, QueryEngine, RecordResponse, Scope, TranslateResponse},
    state::CatalogState,
    store::{self, CatalogStore},
};
use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use http::{HeaderValue, Method};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

type Pairs = Query<Vec<(String, String)>>;

pub struct Server {
    config: Arc<AppConfig>,
    state: CatalogState,
    cors: Option<CorsLayer>,
}

impl Server {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store = store::open(&config).await?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn CatalogStore>) -> anyhow::Result<Self> {
        let cors = config.allowed_origins.as_deref().map(cors_layer).transpose()?;
        let config = Arc::new(config);
        let state = CatalogState::from(QueryEngine::new(store, Arc::clone(&config)));

        Ok(Self {
            config,
            state,
            cors,
        })
    }

    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/categories", get(Self::list_categories))
            .route("/categories/:id", get(Self::get_category))
            .route(
                "/categories/:id/subcategories",
                get(Self::list_category_subcategories),
            )
            .route("/subcategories", get(Self::list_subcategories))
            .route("/subcategories/:id", get(Self::get_subcategory))
            .route("/brands", get(Self::list_brands))
            .route("/brands/:id", get(Self::get_brand))
            .route("/products", get(Self::list_products))
            .route("/products/best-seller", get(Self::best_sellers))
            .route("/products/sales", get(Self::on_sale))
            .route("/products/:id", get(Self::get_product))
            .route("/translate/:entity", get(Self::translate));

        let mut router = Router::new()
            .route("/healthz", get(Self::health))
            .nest("/api/v1", api)
            .with_state(self.state.clone());

        if let Some(cors) = &self.cors {
            router = router.layer(cors.clone());
        }

        router
            .layer(TimeoutLayer::new(self.config.request_timeout))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "catalog listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn health() -> Json<serde_json::Value> {
        Json(json!({ "status": "ok" }))
    }

    async fn list_categories(
        State(state): State<CatalogState>,
        Query(pairs): Pairs,
    ) -> Result<Json<ListResponse>> {
        list(&state, Entity::Categories, pairs, None).await
    }

    async fn get_category(
        State(state): State<CatalogState>,
        Path(id): Path<String>,
    ) -> Result<Json<RecordResponse>> {
        Ok(Json(state.engine.get(Entity::Categories, &id).await?))
    }

    async fn list_category_subcategories(
        State(state): State<CatalogState>,
        Path(id): Path<String>,
        Query(pairs): Pairs,
    ) -> Result<Json<ListResponse>> {
        let scope = Scope::parent_category(&id);
        list(&state, Entity::SubCategories, pairs, Some(&scope)).await
    }

    async fn list_subcategories(
        State(state): State<CatalogState>,
        Query(pairs): Pairs,
    ) -> Result<Json<ListResponse>> {
        list(&state, Entity::SubCategories, pairs, None).await
    }

    async fn get_subcategory(
        State(state): State<CatalogState>,
        Path(id): Path<String>,
    ) -> Result<Json<RecordResponse>> {
        Ok(Json(state.engine.get(Entity::SubCategories, &id).await?))
    }

    async fn list_brands(
        State(state): State<CatalogState>,
        Query(pairs): Pairs,
    ) -> Result<Json<ListResponse>> {
        list(&state, Entity::Brands, pairs, None).await
    }

    async fn get_brand(
        State(state): State<CatalogState>,
        Path(id): Path<String>,
    ) -> Result<Json<RecordResponse>> {
        Ok(Json(state.engine.get(Entity::Brands, &id).await?))
    }

    async fn list_products(
        State(state): State<CatalogState>,
        Query(pairs): Pairs,
    ) -> Result<Json<ListResponse>> {
        list(&state, Entity::Products, pairs, None).await
    }

    async fn get_product(
        State(state): State<CatalogState>,
        Path(id): Path<String>,
    ) -> Result<Json<RecordResponse>> {
        Ok(Json(state.engine.get(Entity::Products, &id).await?))
    }

    async fn best_sellers(
        State(state): State<CatalogState>,
        Query(pairs): Pairs,
    ) -> Result<Json<ListResponse>> {
        let params = QuerySpec::from_pairs(pairs);
        Ok(Json(state.engine.best_sellers(&params).await?))
    }

    async fn on_sale(
        State(state): State<CatalogState>,
        Query(pairs): Pairs,
    ) -> Result<Json<ListResponse>> {
        let params = QuerySpec::from_pairs(pairs);
        Ok(Json(state.engine.on_sale(&params).await?))
    }

    async fn translate(
        State(state): State<CatalogState>,
        Path(entity): Path<String>,
        Query(pairs): Pairs,
    ) -> Result<Json<TranslateResponse>> {
        let entity = parse_entity(&entity)?;
        let params = QuerySpec::from_pairs(pairs);
        Ok(Json(state.engine.translate(entity, &params)?))
    }
}

async fn list(
    state: &CatalogState,
    entity: Entity,
    pairs: Vec<(String, String)>,
    scope: Option<&Scope>,
) -> Result<Json<ListResponse>> {
    let params = QuerySpec::from_pairs(pairs);
    Ok(Json(state.engine.list(entity, &params, scope).await?))
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("invalid CATALOG_ALLOWED_ORIGINS entry '{origin}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::OPTIONS]))
}
