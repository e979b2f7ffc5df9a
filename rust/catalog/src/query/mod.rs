mod criteria;
mod filter;
mod pagination;
mod projection;
mod search;
mod sort;

pub use criteria::{CompareOp, Constraint, Criteria, FilterPredicate, FilterValue};
pub use filter::{build_filter, RESERVED_PARAMS};
pub use pagination::{
    build_page_request, build_pagination, LimitPolicy, PageRequest, PaginationWindow,
};
pub use projection::{build_projection, Projection, REVISION_FIELD};
pub use search::{build_search, search_fields, SearchPredicate};
pub use sort::{build_sort, with_tie_break, OrderClause, OrderDirection};

pub(crate) use criteria::lookup;

use crate::{
    config::AppConfig,
    error::{Result, ServiceError},
    params::{Entity, QuerySpec},
    store::CatalogStore,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const SOLD_FIELD: &str = "sold";

/// Everything a store needs to run one list query. Sort and the skip/limit
/// window apply to the criteria's result set, in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub entity: Entity,
    pub criteria: Criteria,
    pub order: Vec<OrderClause>,
    pub projection: Projection,
    pub page: PageRequest,
}

impl QueryPlan {
    pub fn limit(&self) -> i64 {
        self.page.limit
    }

    pub fn offset(&self) -> i64 {
        self.page.skip()
    }
}

pub fn build_query_plan(
    entity: Entity,
    params: &QuerySpec,
    limits: LimitPolicy,
) -> Result<QueryPlan> {
    let filter = build_filter(params)?;
    let search = build_search(params, entity);

    Ok(QueryPlan {
        entity,
        criteria: Criteria::new(filter, search),
        order: build_sort(params),
        projection: build_projection(params),
        page: build_page_request(params, limits),
    })
}

/// Route-level filter that overrides any same-named query parameter, such as
/// the parent category of a nested subcategory listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub field: String,
    pub value: FilterValue,
}

impl Scope {
    pub fn parent_category(raw: &str) -> Self {
        let raw = raw.trim();
        Self {
            field: "category".to_string(),
            value: filter::identifier_or_text(raw),
        }
    }
}

#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn CatalogStore>,
    config: Arc<AppConfig>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn CatalogStore>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn list(
        &self,
        entity: Entity,
        params: &QuerySpec,
        scope: Option<&Scope>,
    ) -> Result<ListResponse> {
        let mut plan = build_query_plan(entity, params, self.config.list_limits)?;
        if let Some(scope) = scope {
            plan.criteria
                .filter
                .set(scope.field.clone(), Constraint::Equals(scope.value.clone()));
        }
        self.run(plan).await
    }

    pub async fn get(&self, entity: Entity, raw_id: &str) -> Result<RecordResponse> {
        let id = parse_id(entity, raw_id)?;
        match self.store.find_by_id(entity, id).await? {
            Some(document) => Ok(RecordResponse {
                data: Projection::default().apply(document),
            }),
            None => Err(ServiceError::NotFound(format!("{} {id}", entity.label()))),
        }
    }

    /// Products by units sold, highest first. Only paging and `fields` apply.
    pub async fn best_sellers(&self, params: &QuerySpec) -> Result<ListResponse> {
        let plan = QueryPlan {
            entity: Entity::Products,
            criteria: Criteria::default(),
            order: with_tie_break(vec![OrderClause::desc(SOLD_FIELD)]),
            projection: build_projection(params),
            page: build_page_request(params, self.config.ranking_limits),
        };
        self.run(plan).await
    }

    /// Discounted products, largest discount first.
    pub async fn on_sale(&self, params: &QuerySpec) -> Result<ListResponse> {
        let page = build_page_request(params, self.config.ranking_limits);
        let projection = build_projection(params);

        let total = self.store.count_on_sale().await?;
        let rows = self.store.find_on_sale(page).await?;

        Ok(ListResponse::new(
            rows.into_iter().map(|row| projection.apply(row)).collect(),
            PaginationWindow::compute(page, total),
        ))
    }

    pub fn translate(&self, entity: Entity, params: &QuerySpec) -> Result<TranslateResponse> {
        let plan = build_query_plan(entity, params, self.config.list_limits)?;
        let sql = self.store.explain(&plan)?;

        Ok(TranslateResponse {
            entity,
            filter: plan.criteria.to_document(),
            sort: plan.order.clone(),
            projection: plan.projection.clone(),
            page: plan.page.page,
            limit: plan.limit(),
            skip: plan.offset(),
            sql,
        })
    }

    async fn run(&self, plan: QueryPlan) -> Result<ListResponse> {
        debug!(
            entity = plan.entity.collection(),
            criteria = %plan.criteria.to_document(),
            page = plan.page.page,
            limit = plan.limit(),
            "executing list query"
        );

        let total = self
            .store
            .count_documents(plan.entity, &plan.criteria)
            .await?;
        let rows = self.store.find(&plan).await?;

        Ok(ListResponse::new(
            rows.into_iter()
                .map(|row| plan.projection.apply(row))
                .collect(),
            PaginationWindow::compute(plan.page, total),
        ))
    }
}

fn parse_id(entity: Entity, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| {
        ServiceError::InvalidRequest(format!("invalid {} id '{raw}'", entity.label()))
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub results: usize,
    pub pagination_result: PaginationWindow,
    pub data: Vec<Value>,
}

impl ListResponse {
    fn new(data: Vec<Value>, pagination_result: PaginationWindow) -> Self {
        Self {
            results: data.len(),
            pagination_result,
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordResponse {
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslateResponse {
    pub entity: Entity,
    pub filter: Value,
    pub sort: Vec<OrderClause>,
    pub projection: Projection,
    pub page: i64,
    pub limit: i64,
    pub skip: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AppConfig, StoreConfig},
        media::MediaUrls,
        store::MemoryStore,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const LIST: LimitPolicy = LimitPolicy {
        default_limit: 50,
        max_limit: 100,
    };

    fn params(pairs: &[(&str, &str)]) -> QuerySpec {
        QuerySpec::from_pairs(pairs.iter().copied())
    }

    fn engine(products: Vec<Value>) -> QueryEngine {
        let config = AppConfig::embedded(StoreConfig::Fixture("unused.json".into()));
        let store = MemoryStore::new(MediaUrls::new(&config.base_url))
            .with_documents(Entity::Products, products);
        QueryEngine::new(Arc::new(store), Arc::new(config))
    }

    fn product(title: &str, category: &str, price: f64, sold: i64) -> Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "title": title,
            "description": format!("{title} description"),
            "category": category,
            "price": price,
            "sold": sold,
            "revision": 0,
            "createdAt": "2024-01-01T00:00:00Z",
        })
    }

    fn titles(response: &ListResponse) -> Vec<&str> {
        response
            .data
            .iter()
            .map(|row| row["title"].as_str().unwrap_or_default())
            .collect()
    }

    #[test]
    fn plan_combines_every_clause() {
        let plan = build_query_plan(
            Entity::Products,
            &params(&[
                ("price[gte]", "100"),
                ("keyword", "phone"),
                ("sort", "-price"),
                ("fields", "title,price"),
                ("page", "3"),
                ("limit", "20"),
            ]),
            LIST,
        )
        .unwrap();

        assert_eq!(
            plan.criteria.to_document(),
            json!({
                "$and": [
                    { "price": { "$gte": "100" } },
                    { "$or": [
                        { "title": { "$regex": "phone", "$options": "i" } },
                        { "description": { "$regex": "phone", "$options": "i" } }
                    ] }
                ]
            })
        );
        assert_eq!(
            plan.order,
            vec![OrderClause::desc("price"), OrderClause::asc("id")]
        );
        assert_eq!(
            plan.projection,
            Projection::Include(vec!["title".into(), "price".into()])
        );
        assert_eq!(plan.offset(), 40);
        assert_eq!(plan.limit(), 20);
    }

    #[test]
    fn search_without_filter_renders_alone() {
        let plan =
            build_query_plan(Entity::Brands, &params(&[("keyword", "acme")]), LIST).unwrap();
        assert_eq!(
            plan.criteria.to_document(),
            json!({ "name": { "$regex": "acme", "$options": "i" } })
        );
    }

    #[test]
    fn plan_rejects_unknown_operators() {
        let err = build_query_plan(Entity::Products, &params(&[("price[in]", "1")]), LIST)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn keyword_and_category_intersect() {
        let engine = engine(vec![
            product("Smart Phone", "phones", 300.0, 1),
            product("Phone Case", "accessories", 20.0, 1),
            product("Laptop", "phones", 900.0, 1),
        ]);

        let response = engine
            .list(
                Entity::Products,
                &params(&[("keyword", "phone"), ("category", "phones")]),
                None,
            )
            .await
            .unwrap();

        assert_eq!(titles(&response), vec!["Smart Phone"]);
        assert_eq!(response.pagination_result.number_of_pages, 1);
    }

    #[tokio::test]
    async fn empty_result_is_not_an_error() {
        let engine = engine(vec![product("Laptop", "computers", 900.0, 1)]);

        let response = engine
            .list(
                Entity::Products,
                &params(&[("keyword", "phone"), ("category", "nope")]),
                None,
            )
            .await
            .unwrap();

        assert_eq!(response.results, 0);
        assert_eq!(response.pagination_result.number_of_pages, 0);
        assert_eq!(response.pagination_result.next, None);
    }

    #[tokio::test]
    async fn equal_sort_keys_fall_back_to_next_field() {
        let engine = engine(vec![
            product("Beta", "c", 10.0, 0),
            product("Alpha", "c", 10.0, 0),
            product("Gamma", "c", 50.0, 0),
        ]);

        let response = engine
            .list(Entity::Products, &params(&[("sort", "-price,title")]), None)
            .await
            .unwrap();

        assert_eq!(titles(&response), vec!["Gamma", "Alpha", "Beta"]);
    }

    #[tokio::test]
    async fn pages_do_not_overlap_when_sort_keys_tie() {
        let engine = engine((0..7).map(|i| product(&format!("p{i}"), "c", 5.0, 0)).collect());

        let mut seen = Vec::new();
        for page in ["1", "2", "3"] {
            let response = engine
                .list(
                    Entity::Products,
                    &params(&[("sort", "price"), ("limit", "3"), ("page", page)]),
                    None,
                )
                .await
                .unwrap();
            for row in &response.data {
                seen.push(row["id"].as_str().unwrap().to_string());
            }
        }

        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(seen.len(), 7);
        assert_eq!(unique.len(), 7);
    }

    #[tokio::test]
    async fn scope_overrides_query_parameter() {
        let engine = engine(vec![
            product("Smart Phone", "phones", 300.0, 1),
            product("Laptop", "computers", 900.0, 1),
        ]);

        let response = engine
            .list(
                Entity::Products,
                &params(&[("category", "phones")]),
                Some(&Scope::parent_category("computers")),
            )
            .await
            .unwrap();

        assert_eq!(titles(&response), vec!["Laptop"]);
    }

    #[test]
    fn parent_category_parses_ids_like_category_params() {
        let id = Uuid::new_v4();
        assert_eq!(
            Scope::parent_category(&format!(" {id} ")).value,
            FilterValue::Id(id)
        );
        assert_eq!(
            Scope::parent_category("computers").value,
            FilterValue::Text("computers".into())
        );
    }

    #[tokio::test]
    async fn best_sellers_rank_by_sold_with_ranking_default() {
        let engine = engine(
            (0..12)
                .map(|i| product(&format!("p{i}"), "c", 1.0, i))
                .collect(),
        );

        let response = engine.best_sellers(&params(&[("category", "x")])).await.unwrap();

        assert_eq!(response.results, 10);
        assert_eq!(response.data[0]["sold"], json!(11));
        assert_eq!(response.pagination_result.limit, 10);
        assert_eq!(response.pagination_result.number_of_pages, 2);
    }

    #[tokio::test]
    async fn get_rejects_malformed_ids_and_reports_missing() {
        let engine = engine(vec![]);

        let malformed = engine.get(Entity::Products, "abc").await.unwrap_err();
        assert!(matches!(malformed, ServiceError::InvalidRequest(_)));

        let missing = engine
            .get(Entity::Products, &Uuid::new_v4().to_string())
            .await
            .unwrap_err();
        assert!(matches!(missing, ServiceError::NotFound(_)));
    }

    #[test]
    fn translate_reports_plan_without_sql_for_memory_store() {
        let engine = engine(vec![]);
        let response = engine
            .translate(Entity::Products, &params(&[("minPrice", "5"), ("page", "2")]))
            .unwrap();

        assert_eq!(response.filter, json!({ "price": { "$gte": 5.0 } }));
        assert_eq!(response.skip, 50);
        assert_eq!(response.sql, None);
    }
}
