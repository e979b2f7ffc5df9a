use crate::{
    error::{Result, ServiceError},
    models::ProductRow,
    params::Entity,
    query::{Constraint, Criteria, OrderClause, PageRequest, QueryPlan},
    schema::products::dsl::{
        brand_id as col_brand_id, category_id as col_category_id, colors as col_colors,
        created_at as col_created_at, description as col_description, id as col_id,
        price as col_price, price_after_discount as col_price_after_discount, products,
        quantity as col_quantity, ratings_average as col_ratings_average,
        ratings_quantity as col_ratings_quantity, revision as col_revision, slug as col_slug,
        sold as col_sold, subcategory_ids as col_subcategory_ids, title as col_title,
        updated_at as col_updated_at,
    },
};
use super::as_text;
use diesel::dsl::sql;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_builder::{AsQuery, BoxedSelectStatement, FromClause};
use diesel::sql_types::{Float8, Nullable};
use diesel::{PgArrayExpressionMethods, PgTextExpressionMethods};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::Value;
use uuid::Uuid;

type ProductsTable = crate::schema::products::table;
type ProductFromClause = FromClause<ProductsTable>;
type ProductQuery<'a> =
    BoxedSelectStatement<'a, <ProductsTable as AsQuery>::SqlType, ProductFromClause, Pg>;

pub(super) async fn execute(conn: &mut AsyncPgConnection, plan: &QueryPlan) -> Result<Vec<Value>> {
    ensure_entity(plan)?;
    let query = build_query(plan)?;
    let rows: Vec<ProductRow> = query
        .limit(plan.limit())
        .offset(plan.offset())
        .load(conn)
        .await
        .map_err(|err| ServiceError::Internal(err.into()))?;

    Ok(rows.into_iter().map(ProductRow::into_json).collect())
}

pub(super) async fn count(conn: &mut AsyncPgConnection, criteria: &Criteria) -> Result<i64> {
    base_query(criteria)?
        .count()
        .get_result(conn)
        .await
        .map_err(|err| ServiceError::Internal(err.into()))
}

pub(super) async fn find_by_id(conn: &mut AsyncPgConnection, id: Uuid) -> Result<Option<Value>> {
    let row: Option<ProductRow> = products
        .filter(col_id.eq(id))
        .first(conn)
        .await
        .optional()
        .map_err(|err| ServiceError::Internal(err.into()))?;

    Ok(row.map(ProductRow::into_json))
}

pub(super) async fn execute_on_sale(
    conn: &mut AsyncPgConnection,
    page: PageRequest,
) -> Result<Vec<Value>> {
    let rows: Vec<ProductRow> = on_sale_query()
        .limit(page.limit)
        .offset(page.skip())
        .load(conn)
        .await
        .map_err(|err| ServiceError::Internal(err.into()))?;

    Ok(rows.into_iter().map(ProductRow::into_json).collect())
}

pub(super) async fn count_on_sale(conn: &mut AsyncPgConnection) -> Result<i64> {
    on_sale_filter()
        .count()
        .get_result(conn)
        .await
        .map_err(|err| ServiceError::Internal(err.into()))
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
        Entity::Products => Ok(()),
        _ => Err(ServiceError::InvalidRequest(
            "entity not supported by products query".into(),
        )),
    }
}

fn build_query(plan: &QueryPlan) -> Result<ProductQuery<'static>> {
    let query = base_query(&plan.criteria)?;
    Ok(apply_ordering(query, &plan.order))
}

fn base_query(criteria: &Criteria) -> Result<ProductQuery<'static>> {
    let mut query = products.into_boxed::<Pg>();

    for (field, constraint) in criteria.filter.iter() {
        query = apply_filter(query, field, constraint)?;
    }

    if let Some(search) = &criteria.search {
        query = apply_search!(query, search, ProductsTable, {
            "title" => col_title,
            "description" => col_description,
        });
    }

    Ok(query)
}

fn on_sale_filter() -> ProductQuery<'static> {
    products
        .into_boxed::<Pg>()
        .filter(col_price_after_discount.lt(col_price.nullable()))
}

/// Largest absolute discount first.
fn on_sale_query() -> ProductQuery<'static> {
    on_sale_filter()
        .order(sql::<Nullable<Float8>>("price - price_after_discount").desc())
        .then_order_by(col_id.asc())
}

fn apply_filter<'a>(
    query: ProductQuery<'a>,
    field: &str,
    constraint: &Constraint,
) -> Result<ProductQuery<'a>> {
    let query = match field {
        "id" | "_id" => apply_id_constraint!(query, field, constraint, col_id)?,
        "title" => apply_constraint!(query, constraint, col_title, |value| as_text(value))?,
        "slug" => apply_constraint!(query, constraint, col_slug, |value| as_text(value))?,
        "description" => {
            apply_constraint!(query, constraint, col_description, |value| as_text(value))?
        }
        "quantity" => {
            apply_constraint!(query, constraint, col_quantity, |value| value.to_i32(field))?
        }
        "sold" => apply_constraint!(query, constraint, col_sold, |value| value.to_i32(field))?,
        "price" => apply_constraint!(query, constraint, col_price, |value| value.to_f64(field))?,
        "priceAfterDiscount" | "price_after_discount" => {
            apply_constraint!(query, constraint, col_price_after_discount, |value| value
                .to_f64(field))?
        }
        "ratingsAverage" | "ratings_average" => {
            apply_constraint!(query, constraint, col_ratings_average, |value| value
                .to_f64(field))?
        }
        "ratingsQuantity" | "ratings_quantity" => {
            apply_constraint!(query, constraint, col_ratings_quantity, |value| value
                .to_i32(field))?
        }
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
        "category" | "category_id" => {
            apply_id_constraint!(query, field, constraint, col_category_id)?
        }
        "brand" | "brand_id" => apply_id_constraint!(query, field, constraint, col_brand_id)?,
        "colors" | "color" => {
            apply_array_constraint!(query, field, constraint, col_colors, |value| Some(
                value.to_string()
            ))?
        }
        "subCategories" | "subcategories" | "subcategory_ids" => {
            apply_array_constraint!(query, field, constraint, col_subcategory_ids, |value| value
                .to_uuid())?
        }
        other => {
            return Err(ServiceError::InvalidRequest(format!(
                "unsupported filter field '{other}'"
            )));
        }
    };

    Ok(query)
}

fn apply_ordering<'a>(mut query: ProductQuery<'a>, order: &[OrderClause]) -> ProductQuery<'a> {
    let mut applied = false;
    for clause in order {
        let first = !applied;
        query = match clause.field.as_str() {
            "id" | "_id" => order_by!(query, first, clause.direction, col_id),
            "title" => order_by!(query, first, clause.direction, col_title),
            "slug" => order_by!(query, first, clause.direction, col_slug),
            "quantity" => order_by!(query, first, clause.direction, col_quantity),
            "sold" => order_by!(query, first, clause.direction, col_sold),
            "price" => order_by!(query, first, clause.direction, col_price),
            "priceAfterDiscount" | "price_after_discount" => {
                order_by!(query, first, clause.direction, col_price_after_discount)
            }
            "ratingsAverage" | "ratings_average" => {
                order_by!(query, first, clause.direction, col_ratings_average)
            }
            "ratingsQuantity" | "ratings_quantity" => {
                order_by!(query, first, clause.direction, col_ratings_quantity)
            }
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
