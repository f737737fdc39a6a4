use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Error, Result};
use crate::model::{Payload, PointId};

/// Payload filter: boolean expression tree over payload fields.
///
/// A point matches when every `must` condition holds, no `must_not` condition
/// holds, and, if `should` is non-empty, at least one `should` condition
/// holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Match { key: String, value: MatchValue },
    MatchAny { key: String, any: AnyValues },
    MatchExcept { key: String, except: AnyValues },
    Range { key: String, range: Range },
    Text { key: String, text: String },
    IsEmpty { key: String },
    HasId { ids: Vec<PointId> },
    Filter(Filter),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchValue {
    Bool(bool),
    Integer(i64),
    Keyword(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnyValues {
    Integers(Vec<i64>),
    Keywords(Vec<String>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl Range {
    pub fn between(min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            gte: min,
            lte: max,
            ..Default::default()
        }
    }

    fn contains(&self, num: f64) -> bool {
        self.gt.map(|b| num > b).unwrap_or(true)
            && self.gte.map(|b| num >= b).unwrap_or(true)
            && self.lt.map(|b| num < b).unwrap_or(true)
            && self.lte.map(|b| num <= b).unwrap_or(true)
    }
}

impl Condition {
    pub fn matches(key: impl Into<String>, value: impl Into<MatchValue>) -> Self {
        Condition::Match {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn any(key: impl Into<String>, any: impl Into<AnyValues>) -> Self {
        Condition::MatchAny {
            key: key.into(),
            any: any.into(),
        }
    }

    pub fn except(key: impl Into<String>, except: impl Into<AnyValues>) -> Self {
        Condition::MatchExcept {
            key: key.into(),
            except: except.into(),
        }
    }

    pub fn range(key: impl Into<String>, range: Range) -> Self {
        Condition::Range {
            key: key.into(),
            range,
        }
    }

    pub fn text(key: impl Into<String>, text: impl Into<String>) -> Self {
        Condition::Text {
            key: key.into(),
            text: text.into(),
        }
    }

    pub fn is_empty(key: impl Into<String>) -> Self {
        Condition::IsEmpty { key: key.into() }
    }

    pub fn has_id(ids: impl IntoIterator<Item = impl Into<PointId>>) -> Self {
        Condition::HasId {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    fn evaluate(&self, id: &PointId, payload: &Payload) -> bool {
        match self {
            Condition::Match { key, value } => field_values(payload, key)
                .iter()
                .any(|v| value.matches(v)),
            Condition::MatchAny { key, any } => field_values(payload, key)
                .iter()
                .any(|v| any.contains(v)),
            Condition::MatchExcept { key, except } => !field_values(payload, key)
                .iter()
                .any(|v| except.contains(v)),
            Condition::Range { key, range } => field_values(payload, key)
                .iter()
                .filter_map(|v| v.as_f64())
                .any(|num| range.contains(num)),
            Condition::Text { key, text } => field_values(payload, key)
                .iter()
                .filter_map(|v| v.as_str())
                .any(|s| s.contains(text.as_str())),
            Condition::IsEmpty { key } => field_values(payload, key).is_empty(),
            Condition::HasId { ids } => ids.contains(id),
            Condition::Filter(filter) => filter.matches(id, payload),
        }
    }
}

impl MatchValue {
    fn matches(&self, value: &Value) -> bool {
        match self {
            MatchValue::Bool(b) => value.as_bool() == Some(*b),
            MatchValue::Integer(i) => value.as_i64() == Some(*i),
            MatchValue::Keyword(s) => value.as_str() == Some(s.as_str()),
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(MatchValue::Bool(*b)),
            Value::String(s) => Some(MatchValue::Keyword(s.clone())),
            Value::Number(n) => n.as_i64().map(MatchValue::Integer),
            _ => None,
        }
    }
}

impl From<bool> for MatchValue {
    fn from(value: bool) -> Self {
        MatchValue::Bool(value)
    }
}

impl From<i64> for MatchValue {
    fn from(value: i64) -> Self {
        MatchValue::Integer(value)
    }
}

impl From<&str> for MatchValue {
    fn from(value: &str) -> Self {
        MatchValue::Keyword(value.to_string())
    }
}

impl From<String> for MatchValue {
    fn from(value: String) -> Self {
        MatchValue::Keyword(value)
    }
}

impl AnyValues {
    fn contains(&self, value: &Value) -> bool {
        match self {
            AnyValues::Integers(ints) => value.as_i64().map(|i| ints.contains(&i)).unwrap_or(false),
            AnyValues::Keywords(words) => value
                .as_str()
                .map(|s| words.iter().any(|w| w == s))
                .unwrap_or(false),
        }
    }

    fn from_json(values: &[Value]) -> Option<Self> {
        if let Some(ints) = values.iter().map(|v| v.as_i64()).collect::<Option<Vec<_>>>() {
            return Some(AnyValues::Integers(ints));
        }
        values
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(AnyValues::Keywords)
    }
}

impl From<Vec<i64>> for AnyValues {
    fn from(values: Vec<i64>) -> Self {
        AnyValues::Integers(values)
    }
}

impl From<Vec<String>> for AnyValues {
    fn from(values: Vec<String>) -> Self {
        AnyValues::Keywords(values)
    }
}

impl From<Vec<&str>> for AnyValues {
    fn from(values: Vec<&str>) -> Self {
        AnyValues::Keywords(values.into_iter().map(str::to_string).collect())
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, condition: Condition) -> Self {
        self.must.push(condition);
        self
    }

    pub fn should(mut self, condition: Condition) -> Self {
        self.should.push(condition);
        self
    }

    pub fn must_not(mut self, condition: Condition) -> Self {
        self.must_not.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }

    /// Evaluate the filter against a point's id and payload.
    pub fn matches(&self, id: &PointId, payload: &Payload) -> bool {
        self.must.iter().all(|c| c.evaluate(id, payload))
            && !self.must_not.iter().any(|c| c.evaluate(id, payload))
            && (self.should.is_empty() || self.should.iter().any(|c| c.evaluate(id, payload)))
    }
}

/// Values stored under a dot-separated key. Arrays at the leaf are flattened
/// and nulls dropped, so a missing, null, or `[]` field yields nothing.
fn field_values<'a>(payload: &'a Payload, key: &str) -> Vec<&'a Value> {
    let mut parts = key.split('.');
    let Some(first) = parts.next() else {
        return Vec::new();
    };
    let mut current = match payload.get(first) {
        Some(v) => v,
        None => return Vec::new(),
    };

    for part in parts {
        current = match current.get(part) {
            Some(v) => v,
            None => return Vec::new(),
        };
    }

    match current {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
        other => vec![other],
    }
}

fn numeric(op: &str, val: &Value) -> Result<f64> {
    val.as_f64()
        .ok_or_else(|| Error::InvalidFilter(format!("{} requires numeric value", op)))
}

/// Parse a filter from the JSON operator format:
/// `{"category": "tech", "score": {"$gte": 0.8}, "$or": [{...}, {...}]}`.
impl TryFrom<Value> for Filter {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let mut filter = Filter::new();

        let Value::Object(map) = value else {
            return Err(Error::InvalidFilter("filter must be a JSON object".to_string()));
        };

        for (field, condition) in map {
            if field == "$or" {
                let Value::Array(branches) = condition else {
                    return Err(Error::InvalidFilter("$or requires array value".to_string()));
                };
                for branch in branches {
                    filter = filter.should(Condition::Filter(Filter::try_from(branch)?));
                }
                continue;
            }

            match &condition {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                    let value = MatchValue::from_json(&condition).ok_or_else(|| {
                        Error::InvalidFilter(format!("Cannot match on non-integer number for field: {}", field))
                    })?;
                    filter = filter.must(Condition::matches(field, value));
                }
                Value::Object(cond_map) => {
                    for (op, val) in cond_map {
                        filter = match op.as_str() {
                            "$eq" | "$ne" => {
                                let value = MatchValue::from_json(val).ok_or_else(|| {
                                    Error::InvalidFilter(format!("{} requires string, integer or bool value", op))
                                })?;
                                if op == "$eq" {
                                    filter.must(Condition::matches(field.clone(), value))
                                } else {
                                    filter.must_not(Condition::matches(field.clone(), value))
                                }
                            }
                            "$in" | "$nin" => {
                                let values = val
                                    .as_array()
                                    .and_then(|arr| AnyValues::from_json(arr))
                                    .ok_or_else(|| {
                                        Error::InvalidFilter(format!("{} requires array of strings or integers", op))
                                    })?;
                                if op == "$in" {
                                    filter.must(Condition::any(field.clone(), values))
                                } else {
                                    filter.must(Condition::except(field.clone(), values))
                                }
                            }
                            "$gt" => filter.must(Condition::range(
                                field.clone(),
                                Range { gt: Some(numeric(op, val)?), ..Default::default() },
                            )),
                            "$gte" => filter.must(Condition::range(
                                field.clone(),
                                Range { gte: Some(numeric(op, val)?), ..Default::default() },
                            )),
                            "$lt" => filter.must(Condition::range(
                                field.clone(),
                                Range { lt: Some(numeric(op, val)?), ..Default::default() },
                            )),
                            "$lte" => filter.must(Condition::range(
                                field.clone(),
                                Range { lte: Some(numeric(op, val)?), ..Default::default() },
                            )),
                            "$contains" => {
                                let s = val.as_str().ok_or_else(|| {
                                    Error::InvalidFilter("$contains requires string value".to_string())
                                })?;
                                filter.must(Condition::text(field.clone(), s))
                            }
                            "$exists" => {
                                if val.as_bool().unwrap_or(false) {
                                    filter.must_not(Condition::is_empty(field.clone()))
                                } else {
                                    filter.must(Condition::is_empty(field.clone()))
                                }
                            }
                            _ => return Err(Error::InvalidFilter(format!("Unknown filter operator: {}", op))),
                        };
                    }
                }
                _ => {
                    return Err(Error::InvalidFilter(format!(
                        "Invalid filter condition for field: {}",
                        field
                    )));
                }
            }
        }

        Ok(filter)
    }
}
