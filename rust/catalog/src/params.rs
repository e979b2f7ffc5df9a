//! Query-string parameters as handed over by the HTTP layer.
//!
//! A [`QuerySpec`] is built once per request from the raw `(key, value)`
//! pairs of the query string. Repeated keys collapse into a list value in
//! order of appearance; nothing else is interpreted here.

use crate::error::{Result, ServiceError};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Categories,
    SubCategories,
    Brands,
    Products,
}

impl Entity {
    /// Collection name used in routes, fixtures and media URLs.
    pub fn collection(&self) -> &'static str {
        match self {
            Entity::Categories => "categories",
            Entity::SubCategories => "subcategories",
            Entity::Brands => "brands",
            Entity::Products => "products",
        }
    }

    /// Singular label used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Entity::Categories => "category",
            Entity::SubCategories => "subcategory",
            Entity::Brands => "brand",
            Entity::Products => "product",
        }
    }
}

pub fn parse_entity(raw: &str) -> Result<Entity> {
    let normalized = raw.trim().to_lowercase();
    match normalized.as_str() {
        "categories" | "category" => Ok(Entity::Categories),
        "subcategories" | "subcategory" | "sub-categories" | "sub_categories" => {
            Ok(Entity::SubCategories)
        }
        "brands" | "brand" => Ok(Entity::Brands),
        "products" | "product" => Ok(Entity::Products),
        other => Err(ServiceError::InvalidRequest(format!(
            "unsupported entity '{other}'"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    List(Vec<String>),
}

impl ParamValue {
    pub fn values(&self) -> &[String] {
        match self {
            ParamValue::Single(value) => std::slice::from_ref(value),
            ParamValue::List(values) => values.as_slice(),
        }
    }

    /// The value that wins when a scalar is expected: the last occurrence.
    pub fn last(&self) -> &str {
        self.values().last().map(String::as_str).unwrap_or_default()
    }

    fn push(&mut self, value: String) {
        match self {
            ParamValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = ParamValue::List(vec![first, value]);
            }
            ParamValue::List(values) => values.push(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    entries: BTreeMap<String, ParamValue>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut spec = Self::new();
        for (key, value) in pairs {
            spec.append(key, value);
        }
        spec
    }

    /// Adds one occurrence of `key`, turning the entry into a list on repeats.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into().trim().to_string();
        let value = value.into();
        match self.entries.get_mut(&key) {
            Some(existing) => existing.push(value),
            None => {
                self.entries.insert(key, ParamValue::Single(value));
            }
        }
    }

    /// Replaces every occurrence of `key`.
    pub fn set(&mut self, key: impl Into<String>, value: ParamValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.get(key)
    }

    /// Last trimmed value of `key`; empty strings count as absent.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.get(key)
            .map(|value| value.last().trim())
            .filter(|value| !value.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for QuerySpec
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}
