//! Row types for the catalog tables and their JSON record shapes.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::categories)]
pub struct CategoryRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CategoryRow {
    pub fn into_json(self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "slug": self.slug,
            "image": self.image,
            "revision": self.revision,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::subcategories)]
pub struct SubCategoryRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub category_id: Uuid,
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubCategoryRow {
    pub fn into_json(self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "slug": self.slug,
            "category": self.category_id,
            "revision": self.revision,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::brands)]
pub struct BrandRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BrandRow {
    pub fn into_json(self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "slug": self.slug,
            "image": self.image,
            "revision": self.revision,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::products)]
pub struct ProductRow {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub quantity: i32,
    pub sold: i32,
    pub price: f64,
    pub price_after_discount: Option<f64>,
    pub colors: Vec<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    pub category_id: Uuid,
    pub subcategory_ids: Vec<Uuid>,
    pub brand_id: Option<Uuid>,
    pub ratings_average: Option<f64>,
    pub ratings_quantity: i32,
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRow {
    pub fn into_json(self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "slug": self.slug,
            "description": self.description,
            "quantity": self.quantity,
            "sold": self.sold,
            "price": self.price,
            "priceAfterDiscount": self.price_after_discount,
            "colors": self.colors,
            "imageCover": self.image_cover,
            "images": self.images,
            "category": self.category_id,
            "subCategories": self.subcategory_ids,
            "brand": self.brand_id,
            "ratingsAverage": self.ratings_average,
            "ratingsQuantity": self.ratings_quantity,
            "revision": self.revision,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}
