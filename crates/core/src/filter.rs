//! Metadata filter expressions for the `content` tool.
//!
//! Filters are JSON documents evaluated against a document's metadata:
//!
//! ```text
//! {"document_type": "pdf"}                           equality shorthand
//! {"year": {"$gte": 2020}}                           comparison
//! {"tags": {"$overlap": ["ai", "ml"]}}               set overlap
//! {"$or": [{"lang": "en"}, {"lang": {"$in": ["de", "fr"]}}]}
//! {"$not": {"status": "draft"}}
//! ```
//!
//! Several keys in one object are combined with AND. An empty object
//! matches everything.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;

/// A parsed filter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum FilterExpr {
    /// Matches every document.
    All,
    /// A single field comparison.
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

/// Comparison operators, spelled `$eq`, `$ne`, ... on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    In,
    Nin,
    Overlap,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("filter must be a JSON object, got {0}")]
    NotAnObject(String),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("operator {op} expects {expected}")]
    InvalidOperand { op: String, expected: &'static str },
}

impl CompareOp {
    fn from_token(token: &str) -> Result<Self, FilterError> {
        Ok(match token {
            "$eq" => Self::Eq,
            "$ne" | "$neq" => Self::Ne,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$like" => Self::Like,
            "$ilike" => Self::ILike,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$overlap" => Self::Overlap,
            "$contains" => Self::Contains,
            other => return Err(FilterError::UnknownOperator(other.to_string())),
        })
    }

    pub fn token(&self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::Like => "$like",
            Self::ILike => "$ilike",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::Overlap => "$overlap",
            Self::Contains => "$contains",
        }
    }

    fn check_operand(&self, value: &Value) -> Result<(), FilterError> {
        let invalid = |expected| FilterError::InvalidOperand {
            op: self.token().to_string(),
            expected,
        };
        match self {
            Self::In | Self::Nin | Self::Overlap if !value.is_array() => Err(invalid("an array")),
            Self::Like | Self::ILike if !value.is_string() => Err(invalid("a string pattern")),
            Self::Gt | Self::Gte | Self::Lt | Self::Lte
                if !(value.is_number() || value.is_string()) =>
            {
                Err(invalid("a number or string"))
            }
            _ => Ok(()),
        }
    }
}

impl FilterExpr {
    /// Convenience constructor for `{field: {"$eq": value}}`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    /// Convenience constructor for `{field: {"$overlap": values}}`.
    pub fn overlap(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op: CompareOp::Overlap,
            value: Value::Array(values),
        }
    }

    /// Parse a filter from its JSON representation.
    pub fn parse(value: &Value) -> Result<Self, FilterError> {
        let Value::Object(map) = value else {
            return Err(FilterError::NotAnObject(kind_name(value).into()));
        };

        let mut clauses = Vec::with_capacity(map.len());
        for (key, inner) in map {
            clauses.push(match key.as_str() {
                "$and" => Self::And(parse_list("$and", inner)?),
                "$or" => Self::Or(parse_list("$or", inner)?),
                "$not" => Self::Not(Box::new(Self::parse(inner)?)),
                op if op.starts_with('$') => {
                    return Err(FilterError::UnknownOperator(op.to_string()));
                }
                field => parse_field(field, inner)?,
            });
        }

        Ok(match clauses.len() {
            0 => Self::All,
            1 => clauses.remove(0),
            _ => Self::And(clauses),
        })
    }

    /// Evaluate this filter against a metadata map.
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        match self {
            Self::All => true,
            Self::Compare { field, op, value } => compare(lookup(metadata, field), *op, value),
            Self::And(items) => items.iter().all(|f| f.matches(metadata)),
            Self::Or(items) => items.iter().any(|f| f.matches(metadata)),
            Self::Not(inner) => !inner.matches(metadata),
        }
    }

    /// Render back to the wire representation.
    pub fn to_value(&self) -> Value {
        match self {
            Self::All => Value::Object(Map::new()),
            Self::Compare { field, op, value } => {
                let mut inner = Map::new();
                inner.insert(op.token().to_string(), value.clone());
                let mut outer = Map::new();
                outer.insert(field.clone(), Value::Object(inner));
                Value::Object(outer)
            }
            Self::And(items) => single("$and", Value::Array(items.iter().map(Self::to_value).collect())),
            Self::Or(items) => single("$or", Value::Array(items.iter().map(Self::to_value).collect())),
            Self::Not(inner) => single("$not", inner.to_value()),
        }
    }
}

impl TryFrom<Value> for FilterExpr {
    type Error = FilterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FilterExpr> for Value {
    fn from(expr: FilterExpr) -> Self {
        expr.to_value()
    }
}

impl Default for FilterExpr {
    fn default() -> Self {
        Self::All
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn parse_list(op: &str, value: &Value) -> Result<Vec<FilterExpr>, FilterError> {
    let Value::Array(items) = value else {
        return Err(FilterError::InvalidOperand {
            op: op.to_string(),
            expected: "an array of filters",
        });
    };
    items.iter().map(FilterExpr::parse).collect()
}

fn parse_field(field: &str, value: &Value) -> Result<FilterExpr, FilterError> {
    let operators = match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => map,
        other => return Ok(FilterExpr::eq(field, other.clone())),
    };

    let mut clauses = Vec::with_capacity(operators.len());
    for (token, operand) in operators {
        let op = CompareOp::from_token(token)?;
        op.check_operand(operand)?;
        clauses.push(FilterExpr::Compare {
            field: field.to_string(),
            op,
            value: operand.clone(),
        });
    }

    Ok(if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        FilterExpr::And(clauses)
    })
}

/// Resolve a possibly dotted field path (`source.kind`).
fn lookup<'a>(metadata: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    if let Some(v) = metadata.get(field) {
        return Some(v);
    }
    let mut parts = field.split('.');
    let mut current = metadata.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}

fn compare(field: Option<&Value>, op: CompareOp, operand: &Value) -> bool {
    // Negated operators treat a missing field as "not equal / not in".
    let Some(actual) = field.filter(|v| !v.is_null()) else {
        return matches!(op, CompareOp::Ne | CompareOp::Nin);
    };

    match op {
        CompareOp::Eq => values_equal(actual, operand),
        CompareOp::Ne => !values_equal(actual, operand),
        CompareOp::Gt => order(actual, operand) == Some(Ordering::Greater),
        CompareOp::Gte => matches!(order(actual, operand), Some(Ordering::Greater | Ordering::Equal)),
        CompareOp::Lt => order(actual, operand) == Some(Ordering::Less),
        CompareOp::Lte => matches!(order(actual, operand), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Like => like(actual, operand, false),
        CompareOp::ILike => like(actual, operand, true),
        CompareOp::In => as_slice(operand).iter().any(|c| values_equal(actual, c)),
        CompareOp::Nin => !as_slice(operand).iter().any(|c| values_equal(actual, c)),
        CompareOp::Overlap => {
            let wanted = as_slice(operand);
            elements(actual).iter().any(|a| wanted.iter().any(|w| values_equal(a, w)))
        }
        CompareOp::Contains => match (actual, operand) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            _ => {
                let have = elements(actual);
                elements(operand)
                    .iter()
                    .all(|w| have.iter().any(|a| values_equal(a, w)))
            }
        },
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn as_slice(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn elements(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// SQL-style LIKE: `%` matches any run of characters, `_` exactly one.
fn like(actual: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let (Some(text), Some(pattern)) = (actual.as_str(), pattern.as_str()) else {
        return false;
    };

    let mut regex = String::from(if case_insensitive { "(?is)^" } else { "(?s)^" });
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            other => regex.push_str(&regex_lite::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    regex.push('$');

    Regex::new(&regex).is_ok_and(|re| re.is_match(text))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn equality_shorthand() {
        let filter = FilterExpr::parse(&json!({"lang": "en"})).unwrap();
        assert!(filter.matches(&meta(json!({"lang": "en"}))));
        assert!(!filter.matches(&meta(json!({"lang": "de"}))));
        assert!(!filter.matches(&meta(json!({}))));
    }

    #[test]
    fn set_overlap_against_array_field() {
        let filter = FilterExpr::parse(&json!({"tags": {"$overlap": ["ai", "ml"]}})).unwrap();
        assert!(filter.matches(&meta(json!({"tags": ["ml", "robotics"]}))));
        assert!(!filter.matches(&meta(json!({"tags": ["cooking"]}))));
        // Scalar fields behave as one-element sets.
        assert!(filter.matches(&meta(json!({"tags": "ai"}))));
    }

    #[test]
    fn boolean_composition() {
        let filter = FilterExpr::parse(&json!({
            "$or": [
                {"$and": [{"lang": "en"}, {"year": {"$gte": 2020}}]},
                {"$not": {"status": "draft"}}
            ]
        }))
        .unwrap();

        assert!(filter.matches(&meta(json!({"lang": "en", "year": 2021, "status": "draft"}))));
        assert!(!filter.matches(&meta(json!({"lang": "en", "year": 2019, "status": "draft"}))));
        assert!(filter.matches(&meta(json!({"lang": "fr", "status": "final"}))));
    }

    #[test]
    fn implicit_and_of_keys() {
        let filter = FilterExpr::parse(&json!({"lang": "en", "kind": "pdf"})).unwrap();
        assert!(matches!(filter, FilterExpr::And(ref v) if v.len() == 2));
        assert!(filter.matches(&meta(json!({"lang": "en", "kind": "pdf"}))));
        assert!(!filter.matches(&meta(json!({"lang": "en", "kind": "html"}))));
    }

    #[test]
    fn in_and_nin() {
        let within = FilterExpr::parse(&json!({"lang": {"$in": ["en", "de"]}})).unwrap();
        let outside = FilterExpr::parse(&json!({"lang": {"$nin": ["en", "de"]}})).unwrap();
        let doc = meta(json!({"lang": "de"}));
        assert!(within.matches(&doc));
        assert!(!outside.matches(&doc));
        // Missing field is never "in" but always "not in".
        assert!(!within.matches(&meta(json!({}))));
        assert!(outside.matches(&meta(json!({}))));
    }

    #[test]
    fn like_patterns() {
        let filter = FilterExpr::parse(&json!({"title": {"$like": "%Aristotle%"}})).unwrap();
        assert!(filter.matches(&meta(json!({"title": "On Aristotle's Logic"}))));
        assert!(!filter.matches(&meta(json!({"title": "on aristotle"}))));

        let filter = FilterExpr::parse(&json!({"title": {"$ilike": "on_aristotle%"}})).unwrap();
        assert!(filter.matches(&meta(json!({"title": "On Aristotle's Logic"}))));
    }

    #[test]
    fn numeric_equality_ignores_representation() {
        let filter = FilterExpr::parse(&json!({"year": 2020})).unwrap();
        assert!(filter.matches(&meta(json!({"year": 2020.0}))));
    }

    #[test]
    fn dotted_paths() {
        let filter = FilterExpr::parse(&json!({"source.kind": "web"})).unwrap();
        assert!(filter.matches(&meta(json!({"source": {"kind": "web"}}))));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = FilterExpr::parse(&json!({})).unwrap();
        assert_eq!(filter, FilterExpr::All);
        assert!(filter.matches(&meta(json!({"anything": 1}))));
    }

    #[test]
    fn rejects_bad_filters() {
        assert!(matches!(
            FilterExpr::parse(&json!(["lang"])),
            Err(FilterError::NotAnObject(_))
        ));
        assert!(matches!(
            FilterExpr::parse(&json!({"lang": {"$regex": "x"}})),
            Err(FilterError::UnknownOperator(_))
        ));
        assert!(matches!(
            FilterExpr::parse(&json!({"tags": {"$overlap": "ai"}})),
            Err(FilterError::InvalidOperand { .. })
        ));
        assert!(matches!(
            FilterExpr::parse(&json!({"$and": {"lang": "en"}})),
            Err(FilterError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn serde_uses_wire_format() {
        let filter: FilterExpr = serde_json::from_value(json!({"tags": {"$overlap": ["ai"]}})).unwrap();
        assert_eq!(filter, FilterExpr::overlap("tags", vec![json!("ai")]));

        let back = serde_json::to_value(&filter).unwrap();
        assert_eq!(back, json!({"tags": {"$overlap": ["ai"]}}));
    }
}
