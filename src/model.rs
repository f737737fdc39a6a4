use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::Error;
use crate::metadata_filter::Filter;

/// Arbitrary JSON object attached to a point.
pub type Payload = Map<String, Value>;

/// Point identifier: either an unsigned integer or a UUID string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

impl PointId {
    /// Fresh random UUID id.
    pub fn random() -> Self {
        PointId::Uuid(uuid::Uuid::new_v4().to_string())
    }
}

impl From<u64> for PointId {
    fn from(id: u64) -> Self {
        PointId::Num(id)
    }
}

impl From<String> for PointId {
    fn from(id: String) -> Self {
        PointId::Uuid(id)
    }
}

impl From<&str> for PointId {
    fn from(id: &str) -> Self {
        PointId::Uuid(id.to_string())
    }
}

impl From<uuid::Uuid> for PointId {
    fn from(id: uuid::Uuid) -> Self {
        PointId::Uuid(id.to_string())
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Num(n) => write!(f, "{}", n),
            PointId::Uuid(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn new(indices: Vec<u32>, values: Vec<f32>) -> Self {
        Self { indices, values }
    }

    /// Dot product over the shared indices.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let rhs: BTreeMap<u32, f32> = other
            .indices
            .iter()
            .copied()
            .zip(other.values.iter().copied())
            .collect();
        self.indices
            .iter()
            .zip(self.values.iter())
            .filter_map(|(idx, value)| rhs.get(idx).map(|other| value * other))
            .sum()
    }
}

/// One stored vector inside a named-vector map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Vector {
    Dense(Vec<f32>),
    Sparse(SparseVector),
    /// Late-interaction multivector (one row per token).
    MultiDense(Vec<Vec<f32>>),
}

/// Vectors carried by a point: the collection's unnamed dense vector, or a
/// map of named dense/sparse vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Vectors {
    Single(Vec<f32>),
    Named(BTreeMap<String, Vector>),
}

impl Vectors {
    pub fn dense(&self, name: Option<&str>) -> Option<&[f32]> {
        match (self, name) {
            (Vectors::Single(v), None) => Some(v.as_slice()),
            (Vectors::Named(map), Some(name)) => match map.get(name) {
                Some(Vector::Dense(v)) => Some(v.as_slice()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn sparse(&self, name: &str) -> Option<&SparseVector> {
        match self {
            Vectors::Named(map) => match map.get(name) {
                Some(Vector::Sparse(v)) => Some(v),
                _ => None,
            },
            Vectors::Single(_) => None,
        }
    }
}

impl From<Vec<f32>> for Vectors {
    fn from(vector: Vec<f32>) -> Self {
        Vectors::Single(vector)
    }
}

impl From<BTreeMap<String, Vector>> for Vectors {
    fn from(vectors: BTreeMap<String, Vector>) -> Self {
        Vectors::Named(vectors)
    }
}

/// A point as submitted to `upsert`. Deserializes from `{"id": 1, "vector": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    #[serde(rename = "vector")]
    pub vectors: Vectors,
    #[serde(default)]
    pub payload: Payload,
}

impl Point {
    pub fn new(id: impl Into<PointId>, vectors: impl Into<Vectors>) -> Self {
        Self {
            id: id.into(),
            vectors: vectors.into(),
            payload: Payload::new(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }
}

/// Query vector for similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryVector {
    /// Against the collection's unnamed dense vector.
    Dense(Vec<f32>),
    /// Against a named dense vector of a multi-vector collection.
    Named { name: String, vector: Vec<f32> },
    /// Against a named sparse vector.
    Sparse { name: String, vector: SparseVector },
}

impl QueryVector {
    pub fn named(name: impl Into<String>, vector: Vec<f32>) -> Self {
        QueryVector::Named {
            name: name.into(),
            vector,
        }
    }

    pub fn sparse(name: impl Into<String>, indices: Vec<u32>, values: Vec<f32>) -> Self {
        QueryVector::Sparse {
            name: name.into(),
            vector: SparseVector::new(indices, values),
        }
    }

    pub fn vector_name(&self) -> Option<&str> {
        match self {
            QueryVector::Dense(_) => None,
            QueryVector::Named { name, .. } | QueryVector::Sparse { name, .. } => Some(name),
        }
    }
}

impl From<Vec<f32>> for QueryVector {
    fn from(vector: Vec<f32>) -> Self {
        QueryVector::Dense(vector)
    }
}

impl From<&[f32]> for QueryVector {
    fn from(vector: &[f32]) -> Self {
        QueryVector::Dense(vector.to_vec())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    #[default]
    Cosine,
    #[serde(alias = "euclidean", alias = "l2")]
    Euclid,
    Dot,
    Manhattan,
}

impl Distance {
    /// Higher score means closer for similarity metrics; lower for distances.
    pub fn higher_is_better(&self) -> bool {
        matches!(self, Distance::Cosine | Distance::Dot)
    }
}

impl FromStr for Distance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" | "angular" => Ok(Distance::Cosine),
            "euclid" | "euclidean" | "l2" => Ok(Distance::Euclid),
            "dot" | "dotproduct" | "ip" => Ok(Distance::Dot),
            "manhattan" | "l1" => Ok(Distance::Manhattan),
            other => Err(Error::InvalidConfig(format!("Unsupported distance: {}", other))),
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Distance::Cosine => "cosine",
            Distance::Euclid => "euclid",
            Distance::Dot => "dot",
            Distance::Manhattan => "manhattan",
        };
        f.write_str(name)
    }
}

/// Payload index schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Keyword,
    Integer,
    Float,
    Geo,
    Text,
    Bool,
    Datetime,
    Uuid,
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keyword" => Ok(FieldType::Keyword),
            "integer" => Ok(FieldType::Integer),
            "float" => Ok(FieldType::Float),
            "geo" => Ok(FieldType::Geo),
            "text" => Ok(FieldType::Text),
            "bool" => Ok(FieldType::Bool),
            "datetime" => Ok(FieldType::Datetime),
            "uuid" => Ok(FieldType::Uuid),
            other => Err(Error::InvalidConfig(format!("Unsupported field type: {}", other))),
        }
    }
}

/// Which points a delete applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointsSelector {
    Ids(Vec<PointId>),
    Filter(Filter),
}

impl From<Vec<PointId>> for PointsSelector {
    fn from(ids: Vec<PointId>) -> Self {
        PointsSelector::Ids(ids)
    }
}

impl From<Vec<u64>> for PointsSelector {
    fn from(ids: Vec<u64>) -> Self {
        PointsSelector::Ids(ids.into_iter().map(PointId::from).collect())
    }
}

impl From<Filter> for PointsSelector {
    fn from(filter: Filter) -> Self {
        PointsSelector::Filter(filter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: PointId,
    pub score: f32,
    #[serde(default)]
    pub vectors: Option<Vectors>,
    #[serde(default)]
    pub payload: Payload,
}

/// A point returned by a scroll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: PointId,
    #[serde(default)]
    pub vectors: Option<Vectors>,
    #[serde(default)]
    pub payload: Payload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Unknown,
    Acknowledged,
    Completed,
}

/// Outcome of a write as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub operation_id: Option<u64>,
    pub status: UpdateStatus,
}

impl fmt::Display for UpdateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operation_id {
            Some(id) => write!(f, "operation_id={} status={:?}", id, self.status),
            None => write!(f, "operation_id=None status={:?}", self.status),
        }
    }
}
