//! PostgreSQL backend. Each entity module maps predicate field names onto
//! typed diesel columns and builds boxed select statements from a plan.

/// Equality, "is one of" and comparison operators against a scalar column.
/// `$convert` turns the bound `&FilterValue` into the column's Rust type.
/// Conjunctions apply each part in turn.
macro_rules! apply_constraint {
    ($query:expr, $constraint:expr, $column:expr, |$value:ident| $convert:expr) => {{
        let mut __query = $query;
        for __part in $constraint.parts() {
            __query = match __part {
                crate::query::Constraint::Equals($value) => {
                    let operand = $convert?;
                    __query.filter($column.eq(operand))
                }
                crate::query::Constraint::OneOf(__values) => {
                    let operands = __values
                        .iter()
                        .map(|$value| $convert)
                        .collect::<crate::error::Result<Vec<_>>>()?;
                    __query.filter($column.eq_any(operands))
                }
                crate::query::Constraint::Compare(__ops) => {
                    for (op, $value) in __ops {
                        let operand = $convert?;
                        __query = match op {
                            crate::query::CompareOp::Eq => __query.filter($column.eq(operand)),
                            crate::query::CompareOp::Ne => __query.filter($column.ne(operand)),
                            crate::query::CompareOp::Gt => __query.filter($column.gt(operand)),
                            crate::query::CompareOp::Gte => __query.filter($column.ge(operand)),
                            crate::query::CompareOp::Lt => __query.filter($column.lt(operand)),
                            crate::query::CompareOp::Lte => __query.filter($column.le(operand)),
                        };
                    }
                    __query
                }
                crate::query::Constraint::All(_) => __query,
            };
        }
        Ok::<_, crate::error::ServiceError>(__query)
    }};
}

/// Identifier columns. Values that are not UUIDs match nothing; ordering
/// operators are rejected.
macro_rules! apply_id_constraint {
    ($query:expr, $field:expr, $constraint:expr, $column:expr) => {{
        let mut __query = $query;
        for __part in $constraint.parts() {
            __query = match __part {
                crate::query::Constraint::Equals(value) => match value.to_uuid() {
                    Some(id) => __query.filter($column.eq(id)),
                    None => __query.filter(diesel::dsl::sql::<diesel::sql_types::Bool>("FALSE")),
                },
                crate::query::Constraint::OneOf(values) => {
                    let ids: Vec<uuid::Uuid> =
                        values.iter().filter_map(|value| value.to_uuid()).collect();
                    if ids.is_empty() {
                        __query.filter(diesel::dsl::sql::<diesel::sql_types::Bool>("FALSE"))
                    } else {
                        __query.filter($column.eq_any(ids))
                    }
                }
                crate::query::Constraint::Compare(ops) => {
                    for (op, value) in ops {
                        __query = match (op, value.to_uuid()) {
                            (crate::query::CompareOp::Eq, Some(id)) => {
                                __query.filter($column.eq(id))
                            }
                            (crate::query::CompareOp::Eq, None) => __query
                                .filter(diesel::dsl::sql::<diesel::sql_types::Bool>("FALSE")),
                            (crate::query::CompareOp::Ne, Some(id)) => {
                                __query.filter($column.ne(id))
                            }
                            (crate::query::CompareOp::Ne, None) => __query,
                            _ => {
                                return Err(crate::error::ServiceError::InvalidRequest(format!(
                                    "{} only supports eq and ne",
                                    $field
                                )));
                            }
                        };
                    }
                    __query
                }
                crate::query::Constraint::All(_) => __query,
            };
        }
        Ok::<_, crate::error::ServiceError>(__query)
    }};
}

/// Array columns: equality is containment, "is one of" is overlap.
/// `$convert` yields `None` for values that can never be an element.
macro_rules! apply_array_constraint {
    ($query:expr, $field:expr, $constraint:expr, $column:expr, |$value:ident| $convert:expr) => {{
        let mut __query = $query;
        for __part in $constraint.parts() {
            __query = match __part {
                crate::query::Constraint::Equals($value) => match $convert {
                    Some(element) => __query.filter($column.contains(vec![element])),
                    None => __query.filter(diesel::dsl::sql::<diesel::sql_types::Bool>("FALSE")),
                },
                crate::query::Constraint::OneOf(__values) => {
                    let elements: Vec<_> = __values.iter().filter_map(|$value| $convert).collect();
                    if elements.is_empty() {
                        __query.filter(diesel::dsl::sql::<diesel::sql_types::Bool>("FALSE"))
                    } else {
                        __query.filter($column.overlaps_with(elements))
                    }
                }
                crate::query::Constraint::Compare(__ops) => {
                    for (op, $value) in __ops {
                        __query = match (op, $convert) {
                            (crate::query::CompareOp::Eq, Some(element)) => {
                                __query.filter($column.contains(vec![element]))
                            }
                            (crate::query::CompareOp::Eq, None) => __query
                                .filter(diesel::dsl::sql::<diesel::sql_types::Bool>("FALSE")),
                            (crate::query::CompareOp::Ne, Some(element)) => {
                                __query.filter(diesel::dsl::not($column.contains(vec![element])))
                            }
                            (crate::query::CompareOp::Ne, None) => __query,
                            _ => {
                                return Err(crate::error::ServiceError::InvalidRequest(format!(
                                    "{} only supports eq and ne",
                                    $field
                                )));
                            }
                        };
                    }
                    __query
                }
                crate::query::Constraint::All(_) => __query,
            };
        }
        Ok::<_, crate::error::ServiceError>(__query)
    }};
}

/// Case-insensitive keyword match OR-ed across the predicate's fields.
macro_rules! apply_search {
    ($query:expr, $search:expr, $table:ty, { $($name:literal => $column:expr),+ $(,)? }) => {{
        type __Clause = Box<
            dyn diesel::BoxableExpression<$table, diesel::pg::Pg, SqlType = diesel::sql_types::Bool>,
        >;
        let pattern = $search.like_pattern();
        let mut clause: Option<__Clause> = None;
        for field in $search.fields() {
            let next: __Clause = match field.as_str() {
                $($name => Box::new($column.ilike(pattern.clone())),)+
                other => {
                    return Err(crate::error::ServiceError::InvalidRequest(format!(
                        "unsupported search field '{other}'"
                    )));
                }
            };
            let combined: __Clause = match clause {
                Some(previous) => Box::new(previous.or(next)),
                None => next,
            };
            clause = Some(combined);
        }
        match clause {
            Some(clause) => $query.filter(clause),
            None => $query,
        }
    }};
}

/// First clause sets the ordering, later ones extend it.
macro_rules! order_by {
    ($query:expr, $first:expr, $direction:expr, $column:expr) => {
        match ($first, $direction) {
            (true, crate::query::OrderDirection::Asc) => $query.order($column.asc()),
            (true, crate::query::OrderDirection::Desc) => $query.order($column.desc()),
            (false, crate::query::OrderDirection::Asc) => $query.then_order_by($column.asc()),
            (false, crate::query::OrderDirection::Desc) => $query.then_order_by($column.desc()),
        }
    };
}

mod brands;
mod categories;
mod products;
mod subcategories;

use super::CatalogStore;
use crate::{
    db::{PgConnectionManager, PgPool},
    error::{Result, ServiceError},
    media::MediaUrls,
    params::Entity,
    query::{Criteria, FilterValue, PageRequest, QueryPlan},
};
use async_trait::async_trait;
use bb8::PooledConnection;
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

fn as_text(value: &FilterValue) -> Result<String> {
    Ok(value.to_string())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    media: MediaUrls,
}

impl PgStore {
    pub fn new(pool: PgPool, media: MediaUrls) -> Self {
        Self { pool, media }
    }

    async fn connection(&self) -> Result<PooledConnection<'_, PgConnectionManager>> {
        self.pool.get().await.map_err(|err| {
            error!(error = ?err, "failed to acquire database connection");
            ServiceError::Internal(anyhow::anyhow!("{err:?}"))
        })
    }

    fn resolve_all(&self, entity: Entity, mut rows: Vec<Value>) -> Vec<Value> {
        for row in rows.iter_mut() {
            self.media.resolve(entity, row);
        }
        rows
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn find(&self, plan: &QueryPlan) -> Result<Vec<Value>> {
        let mut conn = self.connection().await?;
        let rows = match plan.entity {
            Entity::Categories => categories::execute(&mut conn, plan).await?,
            Entity::SubCategories => subcategories::execute(&mut conn, plan).await?,
            Entity::Brands => brands::execute(&mut conn, plan).await?,
            Entity::Products => products::execute(&mut conn, plan).await?,
        };
        Ok(self.resolve_all(plan.entity, rows))
    }

    async fn count_documents(&self, entity: Entity, criteria: &Criteria) -> Result<i64> {
        let mut conn = self.connection().await?;
        match entity {
            Entity::Categories => categories::count(&mut conn, criteria).await,
            Entity::SubCategories => subcategories::count(&mut conn, criteria).await,
            Entity::Brands => brands::count(&mut conn, criteria).await,
            Entity::Products => products::count(&mut conn, criteria).await,
        }
    }

    async fn find_by_id(&self, entity: Entity, id: Uuid) -> Result<Option<Value>> {
        let mut conn = self.connection().await?;
        let row = match entity {
            Entity::Categories => categories::find_by_id(&mut conn, id).await?,
            Entity::SubCategories => subcategories::find_by_id(&mut conn, id).await?,
            Entity::Brands => brands::find_by_id(&mut conn, id).await?,
            Entity::Products => products::find_by_id(&mut conn, id).await?,
        };
        Ok(row.map(|mut row| {
            self.media.resolve(entity, &mut row);
            row
        }))
    }

    async fn find_on_sale(&self, page: PageRequest) -> Result<Vec<Value>> {
        let mut conn = self.connection().await?;
        let rows = products::execute_on_sale(&mut conn, page).await?;
        Ok(self.resolve_all(Entity::Products, rows))
    }

    async fn count_on_sale(&self) -> Result<i64> {
        let mut conn = self.connection().await?;
        products::count_on_sale(&mut conn).await
    }

    fn explain(&self, plan: &QueryPlan) -> Result<Option<String>> {
        let sql = match plan.entity {
            Entity::Categories => categories::to_debug_sql(plan)?,
            Entity::SubCategories => subcategories::to_debug_sql(plan)?,
            Entity::Brands => brands::to_debug_sql(plan)?,
            Entity::Products => products::to_debug_sql(plan)?,
        };
        Ok(Some(sql))
    }
}
