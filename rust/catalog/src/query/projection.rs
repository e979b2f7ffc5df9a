use crate::params::QuerySpec;
use serde::Serialize;
use serde_json::Value;

pub const FIELDS_PARAM: &str = "fields";
/// Internal revision counter, hidden unless requested explicitly.
pub const REVISION_FIELD: &str = "revision";
const ID_FIELD: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "fields", rename_all = "snake_case")]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Exclude(vec![REVISION_FIELD.to_string()])
    }
}

impl Projection {
    pub fn apply(&self, document: Value) -> Value {
        let Value::Object(mut fields) = document else {
            return document;
        };

        match self {
            Projection::Include(keep) => {
                fields.retain(|name, _| name == ID_FIELD || keep.iter().any(|k| k == name));
            }
            Projection::Exclude(drop) => {
                fields.retain(|name, _| !drop.iter().any(|d| d == name));
            }
        }

        Value::Object(fields)
    }
}

/// `fields=title,price` keeps those fields (plus `id`); `fields=-description`
/// drops the listed ones instead.
pub fn build_projection(params: &QuerySpec) -> Projection {
    let Some(raw) = params.scalar(FIELDS_PARAM) else {
        return Projection::default();
    };

    let entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty() && *entry != "-")
        .collect();

    if entries.is_empty() {
        return Projection::default();
    }

    if entries.iter().all(|entry| entry.starts_with('-')) {
        Projection::Exclude(
            entries
                .iter()
                .map(|entry| entry.trim_start_matches('-').to_string())
                .collect(),
        )
    } else {
        Projection::Include(
            entries
                .iter()
                .map(|entry| entry.trim_start_matches('+').to_string())
                .filter(|entry| !entry.starts_with('-'))
                .collect(),
        )
    }
}
