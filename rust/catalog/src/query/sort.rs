use crate::params::QuerySpec;
use serde::Serialize;

pub const SORT_PARAM: &str = "sort";
pub const DEFAULT_SORT_FIELD: &str = "createdAt";
/// Unique per record; appended last so equal keys never reorder across pages.
pub const TIE_BREAK_FIELD: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderClause {
    pub field: String,
    pub direction: OrderDirection,
}

impl OrderClause {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// `sort=-price,title` sorts by price descending, then title ascending.
pub fn build_sort(params: &QuerySpec) -> Vec<OrderClause> {
    let mut order: Vec<OrderClause> = params
        .scalar(SORT_PARAM)
        .map(parse_order)
        .unwrap_or_default();

    if order.is_empty() {
        order.push(OrderClause::desc(DEFAULT_SORT_FIELD));
    }

    with_tie_break(order)
}

pub fn with_tie_break(mut order: Vec<OrderClause>) -> Vec<OrderClause> {
    if !order.iter().any(|clause| clause.field == TIE_BREAK_FIELD) {
        order.push(OrderClause::asc(TIE_BREAK_FIELD));
    }
    order
}

fn parse_order(raw: &str) -> Vec<OrderClause> {
    let mut order: Vec<OrderClause> = Vec::new();
    for segment in raw.split(',') {
        let trimmed = segment.trim();
        let clause = match trimmed.strip_prefix('-') {
            Some(field) => OrderClause::desc(field.trim()),
            None => OrderClause::asc(trimmed.trim_start_matches('+').trim()),
        };
        if clause.field.is_empty() || order.iter().any(|seen| seen.field == clause.field) {
            continue;
        }
        order.push(clause);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sort_for(raw: Option<&str>) -> Vec<OrderClause> {
        let params = match raw {
            Some(value) => QuerySpec::from_pairs([("sort", value)]),
            None => QuerySpec::new(),
        };
        build_sort(&params)
    }

    #[test]
    fn defaults_to_newest_first() {
        assert_eq!(
            sort_for(None),
            vec![OrderClause::desc("createdAt"), OrderClause::asc("id")]
        );
        assert_eq!(sort_for(Some(" , ")), sort_for(None));
    }

    #[test]
    fn parses_prefixed_directions_in_priority_order() {
        assert_eq!(
            sort_for(Some("-price, title")),
            vec![
                OrderClause::desc("price"),
                OrderClause::asc("title"),
                OrderClause::asc("id"),
            ]
        );
    }

    #[test]
    fn explicit_id_is_not_duplicated() {
        assert_eq!(
            sort_for(Some("-id,price")),
            vec![OrderClause::desc("id"), OrderClause::asc("price")]
        );
    }

    #[test]
    fn repeated_fields_keep_first_direction() {
        assert_eq!(
            sort_for(Some("sold,-sold")),
            vec![OrderClause::asc("sold"), OrderClause::asc("id")]
        );
    }
}
