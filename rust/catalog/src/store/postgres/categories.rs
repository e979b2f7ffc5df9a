use super::as_text;
use crate::{
    error::{Result, ServiceError},
    models::CategoryRow,
    params::Entity,
    query::{Constraint, Criteria, OrderClause, QueryPlan},
    schema::categories::dsl::{
        categories, created_at as col_created_at, id as col_id, image as col_image,
        name as col_name, revision as col_revision, slug as col_slug,
        updated_at as col_updated_at,
    },
};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_builder::{AsQuery, BoxedSelectStatement, FromClause};
use diesel::PgTextExpressionMethods;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::Value;
use uuid::Uuid;

type CategoriesTable = crate::schema::categories::table;
type CategoryFromClause = FromClause<CategoriesTable>;
type CategoryQuery<'a> =
    BoxedSelectStatement<'a, <CategoriesTable as AsQuery>::SqlType, CategoryFromClause, Pg>;

pub(super) async fn execute(conn: &mut AsyncPgConnection, plan: &QueryPlan) -> Result<Vec<Value>> {
    ensure_entity(plan)?;
    let query = build_query(plan)?;
    let rows: Vec<CategoryRow> = query
        .limit(plan.limit())
        .offset(plan.offset())
        .load(conn)
        .await
        .map_err(|err| ServiceError::Internal(err.into()))?;

    Ok(rows.into_iter().map(CategoryRow::into_json).collect())
}

pub(super) async fn count(conn: &mut AsyncPgConnection, criteria: &Criteria) -> Result<i64> {
    base_query(criteria)?
        .count()
        .get_result(conn)
        .await
        .map_err(|err| ServiceError::Internal(err.into()))
}

pub(super) async fn find_by_id(conn: &mut AsyncPgConnection, id: Uuid) -> Result<Option<Value>> {
    let row: Option<CategoryRow> = categories
        .filter(col_id.eq(id))
        .first(conn)
        .await
        .optional()
        .map_err(|err| ServiceError::Internal(err.into()))?;

    Ok(row.map(CategoryRow::into_json))
}

pub(super) fn to_debug_sql(plan: &QueryPlan) -> Result<String> {
    ensure_entity(plan)?;
    let query = build_query(plan)?;
    let sql = diesel::debug_query::<Pg, _>(&query.limit(plan.limit()).offset(plan.offset()))
        .to_string();
    Ok(sql)
}

fn ensure_entity(plan: &QueryPlan) -> Result<()> {
    match plan.entity {
        Entity::Categories => Ok(()),
        _ => Err(ServiceError::InvalidRequest(
            "entity not supported by categories query".into(),
        )),
    }
}

fn build_query(plan: &QueryPlan) -> Result<CategoryQuery<'static>> {
    let query = base_query(&plan.criteria)?;
    Ok(apply_ordering(query, &plan.order))
}

fn base_query(criteria: &Criteria) -> Result<CategoryQuery<'static>> {
    let mut query = categories.into_boxed::<Pg>();

    for (field, constraint) in criteria.filter.iter() {
        query = apply_filter(query, field, constraint)?;
    }

    if let Some(search) = &criteria.search {
        query = apply_search!(query, search, CategoriesTable, { "name" => col_name });
    }

    Ok(query)
}

fn apply_filter<'a>(
    query: CategoryQuery<'a>,
    field: &str,
    constraint: &Constraint,
) -> Result<CategoryQuery<'a>> {
    let query = match field {
        "id" | "_id" => apply_id_constraint!(query, field, constraint, col_id)?,
        "name" => apply_constraint!(query, constraint, col_name, |value| as_text(value))?,
        "slug" => apply_constraint!(query, constraint, col_slug, |value| as_text(value))?,
        "image" => apply_constraint!(query, constraint, col_image, |value| as_text(value))?,
        "revision" => {
            apply_constraint!(query, constraint, col_revision, |value| value.to_i32(field))?
        }
        "createdAt" | "created_at" => {
            apply_constraint!(query, constraint, col_created_at, |value| value
                .to_timestamp(field))?
        }
        "updatedAt" | "updated_at" => {
            apply_constraint!(query, constraint, col_updated_at, |value| value
                .to_timestamp(field))?
        }
        other => {
            return Err(ServiceError::InvalidRequest(format!(
                "unsupported filter field '{other}'"
            )));
        }
    };

    Ok(query)
}

fn apply_ordering<'a>(mut query: CategoryQuery<'a>, order: &[OrderClause]) -> CategoryQuery<'a> {
    let mut applied = false;
    for clause in order {
        let first = !applied;
        query = match clause.field.as_str() {
            "id" | "_id" => order_by!(query, first, clause.direction, col_id),
            "name" => order_by!(query, first, clause.direction, col_name),
            "slug" => order_by!(query, first, clause.direction, col_slug),
            "createdAt" | "created_at" => {
                order_by!(query, first, clause.direction, col_created_at)
            }
            "updatedAt" | "updated_at" => {
                order_by!(query, first, clause.direction, col_updated_at)
            }
            _ => continue,
        };
        applied = true;
    }

    if !applied {
        query = query
            .order(col_created_at.desc())
            .then_order_by(col_id.asc());
    }

    query
}

#[cfg(test)]
mod tests {
    use super::super::test_support::plan;
    use super::*;

    #[test]
    fn keyword_searches_name_only() {
        let sql = to_debug_sql(&plan(Entity::Categories, &[("keyword", "elec")])).unwrap();
        assert!(sql.contains("\"categories\".\"name\" ILIKE $"), "sql: {sql}");
        assert!(sql.contains("%elec%"), "sql: {sql}");
    }

    #[test]
    fn default_order_is_newest_first() {
        let sql = to_debug_sql(&plan(Entity::Categories, &[])).unwrap();
        assert!(
            sql.contains("ORDER BY \"categories\".\"created_at\" DESC, \"categories\".\"id\" ASC"),
            "sql: {sql}"
        );
    }

    #[test]
    fn product_fields_are_rejected() {
        let err = to_debug_sql(&plan(Entity::Categories, &[("price[gte]", "1")])).unwrap_err();
        assert!(err.to_string().contains("unsupported filter field 'price'"));
    }
}
