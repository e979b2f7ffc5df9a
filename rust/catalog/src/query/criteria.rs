//! Filter predicates produced by the translator.
//!
//! A [`Criteria`] is the conjunction of a [`FilterPredicate`] and an optional
//! [`SearchPredicate`]. Stores either compile it into SQL or evaluate it
//! directly against JSON documents with [`Criteria::matches`].

use super::search::SearchPredicate;
use crate::error::{Result, ServiceError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::{cmp::Ordering, collections::BTreeMap, fmt};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "eq" => Some(CompareOp::Eq),
            "ne" => Some(CompareOp::Ne),
            "gt" => Some(CompareOp::Gt),
            "gte" => Some(CompareOp::Gte),
            "lt" => Some(CompareOp::Lt),
            "lte" => Some(CompareOp::Lte),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Gt => "gt",
            CompareOp::Gte => "gte",
            CompareOp::Lt => "lt",
            CompareOp::Lte => "lte",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Gte => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Lte => ordering != Ordering::Greater,
        }
    }
}

/// A single operand. Query strings only ever produce text; numbers come from
/// the explicit price bounds and ids from identifier-typed fields.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Number(f64),
    Id(Uuid),
}

impl FilterValue {
    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Text(text) => Value::String(text.clone()),
            FilterValue::Number(number) => json!(number),
            FilterValue::Id(id) => Value::String(id.to_string()),
        }
    }

    pub fn to_f64(&self, field: &str) -> Result<f64> {
        match self {
            FilterValue::Number(number) => Ok(*number),
            FilterValue::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| {
                    ServiceError::InvalidRequest(format!("{field} must be a number"))
                }),
            FilterValue::Id(_) => Err(ServiceError::InvalidRequest(format!(
                "{field} must be a number"
            ))),
        }
    }

    pub fn to_i32(&self, field: &str) -> Result<i32> {
        let invalid = || ServiceError::InvalidRequest(format!("{field} must be an integer"));
        match self {
            FilterValue::Text(text) => text.trim().parse::<i32>().map_err(|_| invalid()),
            FilterValue::Number(number) if number.fract() == 0.0 => {
                i32::try_from(*number as i64).map_err(|_| invalid())
            }
            _ => Err(invalid()),
        }
    }

    /// RFC 3339 timestamps, or bare `YYYY-MM-DD` dates at midnight UTC.
    pub fn to_timestamp(&self, field: &str) -> Result<DateTime<Utc>> {
        let invalid = || {
            ServiceError::InvalidRequest(format!(
                "{field} must be an RFC 3339 timestamp or a YYYY-MM-DD date"
            ))
        };
        let FilterValue::Text(text) = self else {
            return Err(invalid());
        };
        let text = text.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|midnight| midnight.and_utc())
            .ok_or_else(invalid)
    }

    /// Native identifier, if the value is one or parses as one.
    pub fn to_uuid(&self) -> Option<Uuid> {
        match self {
            FilterValue::Id(id) => Some(*id),
            FilterValue::Text(text) => Uuid::parse_str(text.trim()).ok(),
            FilterValue::Number(_) => None,
        }
    }

    fn compare_to(&self, candidate: &Value) -> Option<Ordering> {
        match (candidate, self) {
            (Value::Number(number), operand) => {
                let lhs = number.as_f64()?;
                let rhs = match operand {
                    FilterValue::Number(rhs) => *rhs,
                    FilterValue::Text(text) => text.trim().parse::<f64>().ok()?,
                    FilterValue::Id(_) => return None,
                };
                lhs.partial_cmp(&rhs)
            }
            (Value::String(text), FilterValue::Id(id)) => {
                Uuid::parse_str(text).ok().map(|parsed| parsed.cmp(id))
            }
            (Value::String(text), FilterValue::Text(operand)) => Some(text.as_str().cmp(operand)),
            (Value::String(text), FilterValue::Number(operand)) => {
                text.trim().parse::<f64>().ok()?.partial_cmp(operand)
            }
            (Value::Bool(flag), FilterValue::Text(operand)) => {
                let parsed = match operand.trim() {
                    "true" => true,
                    "false" => false,
                    _ => return None,
                };
                Some(flag.cmp(&parsed))
            }
            _ => None,
        }
    }

    /// Applies `op` against a document value; arrays match when any element does.
    fn test(&self, op: CompareOp, candidate: Option<&Value>) -> bool {
        match candidate {
            None | Some(Value::Null) => op == CompareOp::Ne,
            Some(Value::Array(items)) if op == CompareOp::Ne => !items
                .iter()
                .any(|item| self.test(CompareOp::Eq, Some(item))),
            Some(Value::Array(items)) => items.iter().any(|item| self.test(op, Some(item))),
            Some(value) => match self.compare_to(value) {
                Some(ordering) => op.holds(ordering),
                None => op == CompareOp::Ne,
            },
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(text) => f.write_str(text),
            FilterValue::Number(number) => write!(f, "{number}"),
            FilterValue::Id(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Equals(FilterValue),
    OneOf(Vec<FilterValue>),
    Compare(BTreeMap<CompareOp, FilterValue>),
    /// Every part must hold. Never nested.
    All(Vec<Constraint>),
}

impl Constraint {
    /// The non-conjunctive constraints that make up `self`.
    pub fn parts(&self) -> &[Constraint] {
        match self {
            Constraint::All(parts) => parts,
            single => std::slice::from_ref(single),
        }
    }

    /// Conjunction of `self` and `other`, flattened.
    fn and(self, other: Constraint) -> Constraint {
        let mut parts = match self {
            Constraint::All(parts) => parts,
            single => vec![single],
        };
        match other {
            Constraint::All(more) => parts.extend(more),
            single => parts.push(single),
        }
        Constraint::All(parts)
    }

    fn to_document(&self) -> Value {
        match self {
            Constraint::Equals(value) => value.to_json(),
            Constraint::OneOf(values) => {
                json!({ "$in": values.iter().map(FilterValue::to_json).collect::<Vec<_>>() })
            }
            Constraint::Compare(ops) => Value::Object(
                ops.iter()
                    .map(|(op, value)| (format!("${}", op.as_str()), value.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            Constraint::All(parts) => {
                let mut merged = Map::new();
                for part in parts {
                    match part.to_document() {
                        Value::Object(ops) => merged.extend(ops),
                        literal => {
                            merged.insert("$eq".to_string(), literal);
                        }
                    }
                }
                Value::Object(merged)
            }
        }
    }

    fn matches(&self, candidate: Option<&Value>) -> bool {
        match self {
            Constraint::Equals(value) => value.test(CompareOp::Eq, candidate),
            Constraint::OneOf(values) => values
                .iter()
                .any(|value| value.test(CompareOp::Eq, candidate)),
            Constraint::Compare(ops) => ops.iter().all(|(op, value)| value.test(*op, candidate)),
            Constraint::All(parts) => parts.iter().all(|part| part.matches(candidate)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPredicate {
    fields: BTreeMap<String, Constraint>,
}

impl FilterPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, field: &str) -> Option<&Constraint> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Constraint)> {
        self.fields
            .iter()
            .map(|(field, constraint)| (field.as_str(), constraint))
    }

    /// Replaces whatever constraint `field` had.
    pub fn set(&mut self, field: impl Into<String>, constraint: Constraint) {
        self.fields.insert(field.into(), constraint);
    }

    /// ANDs `constraint` with whatever `field` already had.
    pub fn merge(&mut self, field: impl Into<String>, constraint: Constraint) {
        let field = field.into();
        let merged = match self.fields.remove(&field) {
            Some(existing) => existing.and(constraint),
            None => constraint,
        };
        self.fields.insert(field, merged);
    }

    /// Adds one operator to `field`, replacing the same operator if present.
    /// A prior equality is kept as its `eq` operator; a prior list stays
    /// alongside the operators.
    pub fn compare(&mut self, field: impl Into<String>, op: CompareOp, value: FilterValue) {
        let field = field.into();
        let next = match self.fields.remove(&field) {
            None => Constraint::Compare(BTreeMap::from([(op, value)])),
            Some(Constraint::Equals(existing)) if op != CompareOp::Eq => {
                Constraint::Compare(BTreeMap::from([(CompareOp::Eq, existing), (op, value)]))
            }
            Some(equals @ Constraint::Equals(_)) => {
                equals.and(Constraint::Compare(BTreeMap::from([(op, value)])))
            }
            Some(Constraint::Compare(mut ops)) => {
                ops.insert(op, value);
                Constraint::Compare(ops)
            }
            Some(Constraint::OneOf(values)) => Constraint::OneOf(values)
                .and(Constraint::Compare(BTreeMap::from([(op, value)]))),
            Some(Constraint::All(mut parts)) => {
                match parts.iter_mut().find_map(|part| match part {
                    Constraint::Compare(ops) => Some(ops),
                    _ => None,
                }) {
                    Some(ops) => {
                        ops.insert(op, value);
                    }
                    None => parts.push(Constraint::Compare(BTreeMap::from([(op, value)]))),
                }
                Constraint::All(parts)
            }
        };
        self.fields.insert(field, next);
    }

    pub fn to_document(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(field, constraint)| (field.clone(), constraint.to_document()))
                .collect(),
        )
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.fields
            .iter()
            .all(|(field, constraint)| constraint.matches(lookup(document, field)))
    }
}

/// Filter AND search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub filter: FilterPredicate,
    pub search: Option<SearchPredicate>,
}

impl Criteria {
    pub fn new(filter: FilterPredicate, search: Option<SearchPredicate>) -> Self {
        Self { filter, search }
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_empty() && self.search.is_none()
    }

    pub fn to_document(&self) -> Value {
        match &self.search {
            None => self.filter.to_document(),
            Some(search) if self.filter.is_empty() => search.to_document(),
            Some(search) => json!({
                "$and": [self.filter.to_document(), search.to_document()]
            }),
        }
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.filter.matches(document)
            && self
                .search
                .as_ref()
                .map_or(true, |search| search.matches(document))
    }
}

/// Resolves a dotted path such as `category.name` inside a document.
pub(crate) fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}
