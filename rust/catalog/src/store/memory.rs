use super::CatalogStore;
use crate::{
    error::Result,
    media::MediaUrls,
    params::Entity,
    query::{lookup, Criteria, OrderClause, OrderDirection, PageRequest, QueryPlan},
};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap, fs, path::Path};
use uuid::Uuid;

/// In-process store over JSON documents. Criteria are evaluated directly
/// against each record.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    collections: HashMap<Entity, Vec<Value>>,
    media: MediaUrls,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixture {
    categories: Vec<Value>,
    #[serde(alias = "subCategories")]
    subcategories: Vec<Value>,
    brands: Vec<Value>,
    products: Vec<Value>,
}

impl MemoryStore {
    pub fn new(media: MediaUrls) -> Self {
        Self {
            collections: HashMap::new(),
            media,
        }
    }

    /// Appends `documents` to the entity's collection, resolving media URLs.
    pub fn with_documents(mut self, entity: Entity, documents: Vec<Value>) -> Self {
        let media = &self.media;
        let collection = self.collections.entry(entity).or_default();
        collection.extend(documents.into_iter().map(|mut document| {
            media.resolve(entity, &mut document);
            document
        }));
        self
    }

    pub fn from_fixture(path: &Path, media: MediaUrls) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path).context("failed to read fixture file")?;
        Self::from_json(&raw, media)
    }

    pub fn from_json(raw: &str, media: MediaUrls) -> anyhow::Result<Self> {
        let fixture: Fixture = serde_json::from_str(raw).context("invalid fixture JSON")?;
        Ok(Self::new(media)
            .with_documents(Entity::Categories, fixture.categories)
            .with_documents(Entity::SubCategories, fixture.subcategories)
            .with_documents(Entity::Brands, fixture.brands)
            .with_documents(Entity::Products, fixture.products))
    }

    fn documents(&self, entity: Entity) -> &[Value] {
        self.collections
            .get(&entity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn on_sale(&self) -> impl Iterator<Item = (&Value, f64)> {
        self.documents(Entity::Products)
            .iter()
            .filter_map(|document| discount(document).map(|amount| (document, amount)))
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn find(&self, plan: &QueryPlan) -> Result<Vec<Value>> {
        let mut matched: Vec<&Value> = self
            .documents(plan.entity)
            .iter()
            .filter(|document| plan.criteria.matches(document))
            .collect();

        matched.sort_by(|a, b| compare_documents(a, b, &plan.order));

        Ok(window(matched.into_iter(), plan.page))
    }

    async fn count_documents(&self, entity: Entity, criteria: &Criteria) -> Result<i64> {
        let count = self
            .documents(entity)
            .iter()
            .filter(|document| criteria.matches(document))
            .count();
        Ok(count as i64)
    }

    async fn find_by_id(&self, entity: Entity, id: Uuid) -> Result<Option<Value>> {
        Ok(self
            .documents(entity)
            .iter()
            .find(|document| document_id(document) == Some(id))
            .cloned())
    }

    async fn find_on_sale(&self, page: PageRequest) -> Result<Vec<Value>> {
        let mut matched: Vec<(&Value, f64)> = self.on_sale().collect();
        matched.sort_by(|(a, a_discount), (b, b_discount)| {
            b_discount
                .partial_cmp(a_discount)
                .unwrap_or(Ordering::Equal)
                .then_with(|| compare_values(lookup(a, "id"), lookup(b, "id")))
        });

        Ok(window(matched.into_iter().map(|(document, _)| document), page))
    }

    async fn count_on_sale(&self) -> Result<i64> {
        Ok(self.on_sale().count() as i64)
    }

    fn explain(&self, _plan: &QueryPlan) -> Result<Option<String>> {
        Ok(None)
    }
}

fn window<'a>(documents: impl Iterator<Item = &'a Value>, page: PageRequest) -> Vec<Value> {
    documents
        .skip(usize::try_from(page.skip()).unwrap_or(usize::MAX))
        .take(usize::try_from(page.limit).unwrap_or(0))
        .cloned()
        .collect()
}

fn document_id(document: &Value) -> Option<Uuid> {
    lookup(document, "id")
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

fn discount(document: &Value) -> Option<f64> {
    let price = lookup(document, "price")?.as_f64()?;
    let discounted = lookup(document, "priceAfterDiscount")?.as_f64()?;
    (discounted < price).then_some(price - discounted)
}

fn compare_documents(a: &Value, b: &Value, order: &[OrderClause]) -> Ordering {
    order
        .iter()
        .map(|clause| {
            let ordering = compare_values(lookup(a, &clause.field), lookup(b, &clause.field));
            match clause.direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            }
        })
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Total order across JSON types: missing < null < bool < number < string <
/// anything else.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(_) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.total_cmp(&b)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(a @ (Value::Array(_) | Value::Object(_))), Some(b)) if rank(Some(b)) == 5 => {
            a.to_string().cmp(&b.to_string())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{build_query_plan, LimitPolicy};
    use crate::params::QuerySpec;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const LIST: LimitPolicy = LimitPolicy {
        default_limit: 50,
        max_limit: 100,
    };

    fn media() -> MediaUrls {
        MediaUrls::new("http://localhost:8000")
    }

    fn plan(entity: Entity, pairs: &[(&str, &str)]) -> QueryPlan {
        build_query_plan(entity, &QuerySpec::from_pairs(pairs.iter().copied()), LIST)
            .expect("plan should build")
    }

    fn sale_item(title: &str, price: f64, discounted: Option<f64>) -> Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "title": title,
            "price": price,
            "priceAfterDiscount": discounted,
        })
    }

    #[test]
    fn total_order_ranks_types() {
        let values = [
            None,
            Some(json!(null)),
            Some(json!(false)),
            Some(json!(3)),
            Some(json!("a")),
        ];
        for pair in values.windows(2) {
            assert_eq!(
                compare_values(pair[0].as_ref(), pair[1].as_ref()),
                Ordering::Less
            );
        }
        assert_eq!(
            compare_values(Some(&json!(2.5)), Some(&json!(10))),
            Ordering::Less
        );
    }

    #[tokio::test]
    async fn price_range_excludes_out_of_bounds() {
        let store = MemoryStore::new(media()).with_documents(
            Entity::Products,
            [99, 100, 300, 500, 501]
                .into_iter()
                .map(|price| json!({ "id": Uuid::new_v4().to_string(), "price": price }))
                .collect(),
        );

        let plan = plan(
            Entity::Products,
            &[("price[gte]", "100"), ("price[lte]", "500"), ("sort", "price")],
        );
        let prices: Vec<Value> = store
            .find(&plan)
            .await
            .unwrap()
            .into_iter()
            .map(|doc| doc["price"].clone())
            .collect();

        assert_eq!(prices, vec![json!(100), json!(300), json!(500)]);
        assert_eq!(
            store
                .count_documents(Entity::Products, &plan.criteria)
                .await
                .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn on_sale_orders_by_discount_amount() {
        let store = MemoryStore::new(media()).with_documents(
            Entity::Products,
            vec![
                sale_item("small", 100.0, Some(90.0)),
                sale_item("none", 100.0, None),
                sale_item("large", 200.0, Some(50.0)),
                sale_item("raised", 100.0, Some(120.0)),
            ],
        );

        let page = PageRequest { page: 1, limit: 10 };
        let titles: Vec<Value> = store
            .find_on_sale(page)
            .await
            .unwrap()
            .into_iter()
            .map(|doc| doc["title"].clone())
            .collect();

        assert_eq!(titles, vec![json!("large"), json!("small")]);
        assert_eq!(store.count_on_sale().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn fixture_documents_are_resolved_and_addressable() {
        let id = Uuid::new_v4();
        let raw = json!({
            "brands": [{ "id": id.to_string(), "name": "Acme", "image": "acme.png" }],
            "subCategories": [{ "id": Uuid::new_v4().to_string(), "name": "Phones" }]
        })
        .to_string();
        let store = MemoryStore::from_json(&raw, media()).unwrap();

        let brand = store
            .find_by_id(Entity::Brands, id)
            .await
            .unwrap()
            .expect("brand should exist");
        assert_eq!(brand["image"], json!("http://localhost:8000/brands/acme.png"));
        assert_eq!(
            store
                .count_documents(Entity::SubCategories, &Criteria::default())
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store.find_by_id(Entity::Categories, id).await.unwrap(),
            None
        );
    }

    #[test]
    fn explain_has_no_native_form() {
        let store = MemoryStore::new(media());
        assert_eq!(store.explain(&plan(Entity::Brands, &[])).unwrap(), None);
    }
}
