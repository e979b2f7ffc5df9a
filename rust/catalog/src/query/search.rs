use super::criteria::lookup;
use crate::params::{Entity, QuerySpec};
use serde::Serialize;
use serde_json::{json, Map, Value};

pub const KEYWORD_PARAM: &str = "keyword";

const PRODUCT_SEARCH_FIELDS: &[&str] = &["title", "description"];
const NAME_SEARCH_FIELDS: &[&str] = &["name"];

/// Case-insensitive substring match of `keyword` against any of `fields`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPredicate {
    keyword: String,
    fields: Vec<String>,
}

impl SearchPredicate {
    pub fn new(keyword: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            keyword: keyword.into(),
            fields: fields.iter().map(|field| field.to_string()).collect(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// `ILIKE` pattern with the keyword's wildcard characters escaped.
    pub fn like_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.keyword.len() + 2);
        pattern.push('%');
        for ch in self.keyword.chars() {
            if matches!(ch, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(ch);
        }
        pattern.push('%');
        pattern
    }

    pub fn to_document(&self) -> Value {
        let clauses: Vec<Value> = self
            .fields
            .iter()
            .map(|field| {
                let mut clause = Map::new();
                clause.insert(
                    field.clone(),
                    json!({ "$regex": self.keyword, "$options": "i" }),
                );
                Value::Object(clause)
            })
            .collect();

        match clauses.as_slice() {
            [single] => single.clone(),
            _ => json!({ "$or": clauses }),
        }
    }

    pub fn matches(&self, document: &Value) -> bool {
        let needle = self.keyword.to_lowercase();
        self.fields.iter().any(|field| {
            lookup(document, field)
                .and_then(Value::as_str)
                .is_some_and(|haystack| haystack.to_lowercase().contains(&needle))
        })
    }
}

pub fn search_fields(entity: Entity) -> &'static [&'static str] {
    match entity {
        Entity::Products => PRODUCT_SEARCH_FIELDS,
        Entity::Categories | Entity::SubCategories | Entity::Brands => NAME_SEARCH_FIELDS,
    }
}

pub fn build_search(params: &QuerySpec, entity: Entity) -> Option<SearchPredicate> {
    params
        .scalar(KEYWORD_PARAM)
        .map(|keyword| SearchPredicate::new(keyword, search_fields(entity)))
}
