//! Translation of query-string parameters into a [`FilterPredicate`].
//!
//! Supported shapes:
//!
//! * `field=value` equality (repeated keys become "is one of")
//! * `field[op]=value` with `op` in `gte|gt|lte|lt|eq|ne`
//! * `category`, `brand`, `color` single, comma-separated or repeated values
//! * `minPrice` / `maxPrice` numeric bounds on `price`
//!
//! Constraints landing on the same field are ANDed, except that `minPrice` /
//! `maxPrice` replace an explicit `price[gte]` / `price[lte]`.
//!
//! Empty values are treated as absent throughout. Unknown operators are
//! rejected with an invalid-request error naming the offending key.

use super::criteria::{CompareOp, Constraint, FilterPredicate, FilterValue};
use crate::{
    error::{Result, ServiceError},
    params::{ParamValue, QuerySpec},
};
use uuid::Uuid;

/// Parameters that drive paging, sorting, projection and search.
pub const RESERVED_PARAMS: &[&str] = &[
    "page", "sort", "limit", "fields", "keyword", "minPrice", "maxPrice",
];

const PRICE_FIELD: &str = "price";
const MIN_PRICE_PARAM: &str = "minPrice";
const MAX_PRICE_PARAM: &str = "maxPrice";

struct MultiValueParam {
    param: &'static str,
    field: &'static str,
    identifiers: bool,
}

const MULTI_VALUE_PARAMS: &[MultiValueParam] = &[
    MultiValueParam {
        param: "category",
        field: "category",
        identifiers: true,
    },
    MultiValueParam {
        param: "brand",
        field: "brand",
        identifiers: true,
    },
    MultiValueParam {
        param: "color",
        field: "colors",
        identifiers: false,
    },
];

pub fn build_filter(params: &QuerySpec) -> Result<FilterPredicate> {
    let mut filter = FilterPredicate::new();

    for (key, value) in params.iter() {
        if RESERVED_PARAMS.contains(&key) || multi_value_param(key).is_some() {
            continue;
        }

        if let Some((field, op)) = split_operator(key)? {
            if let Some(operand) = non_empty(value.last()) {
                filter.compare(field, op, FilterValue::Text(operand.to_string()));
            }
            continue;
        }

        let mut values = value.values().iter().filter_map(|raw| non_empty(raw));
        match (values.next(), values.next()) {
            (None, _) => {}
            (Some(single), None) => {
                filter.merge(key, Constraint::Equals(FilterValue::Text(single.to_string())));
            }
            (Some(first), Some(second)) => {
                let all = [first, second]
                    .into_iter()
                    .chain(values)
                    .map(|raw| FilterValue::Text(raw.to_string()))
                    .collect();
                filter.merge(key, Constraint::OneOf(all));
            }
        }
    }

    for spec in MULTI_VALUE_PARAMS {
        if let Some(value) = params.get(spec.param) {
            apply_multi_value(&mut filter, spec, value);
        }
    }

    apply_price_bound(&mut filter, params, MIN_PRICE_PARAM, CompareOp::Gte);
    apply_price_bound(&mut filter, params, MAX_PRICE_PARAM, CompareOp::Lte);

    Ok(filter)
}

fn multi_value_param(key: &str) -> Option<&'static MultiValueParam> {
    MULTI_VALUE_PARAMS.iter().find(|spec| spec.param == key)
}

/// Splits `field[op]`. Keys without brackets yield `None`.
fn split_operator(key: &str) -> Result<Option<(&str, CompareOp)>> {
    let Some(inner) = key.strip_suffix(']') else {
        return Ok(None);
    };
    let Some(open) = inner.rfind('[') else {
        return Ok(None);
    };

    let field = inner[..open].trim();
    let raw_op = inner[open + 1..].trim();
    if field.is_empty() {
        return Err(ServiceError::InvalidRequest(format!(
            "filter key '{key}' is missing a field name"
        )));
    }

    let op = CompareOp::parse(raw_op).ok_or_else(|| {
        ServiceError::InvalidRequest(format!(
            "unsupported filter operator '{raw_op}' in '{key}' (use gte|gt|lte|lt|eq|ne)"
        ))
    })?;

    Ok(Some((field, op)))
}

fn apply_multi_value(filter: &mut FilterPredicate, spec: &MultiValueParam, value: &ParamValue) {
    let mut candidates: Vec<&str> = Vec::new();
    for raw in value.values() {
        for part in raw.split(',') {
            if let Some(part) = non_empty(part) {
                if !candidates.contains(&part) {
                    candidates.push(part);
                }
            }
        }
    }

    let mut values: Vec<FilterValue> = candidates
        .into_iter()
        .map(|candidate| {
            if spec.identifiers {
                identifier_or_text(candidate)
            } else {
                FilterValue::Text(candidate.to_string())
            }
        })
        .collect();

    match values.len() {
        0 => {}
        1 => filter.merge(spec.field, Constraint::Equals(values.remove(0))),
        _ => filter.merge(spec.field, Constraint::OneOf(values)),
    }
}

/// Ids become native identifiers; anything else passes through untouched so
/// that non-id keyed lookups keep working (and simply match nothing on id
/// columns).
pub(super) fn identifier_or_text(raw: &str) -> FilterValue {
    match Uuid::parse_str(raw) {
        Ok(id) => FilterValue::Id(id),
        Err(_) => FilterValue::Text(raw.to_string()),
    }
}

fn apply_price_bound(
    filter: &mut FilterPredicate,
    params: &QuerySpec,
    param: &str,
    op: CompareOp,
) {
    let Some(raw) = params.scalar(param) else {
        return;
    };
    if let Some(bound) = raw.parse::<f64>().ok().filter(|value| value.is_finite()) {
        filter.compare(PRICE_FIELD, op, FilterValue::Number(bound));
    }
}

fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
