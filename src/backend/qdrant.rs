use async_trait::async_trait;
use qdrant_client::qdrant::{
    self as pb, point_id::PointIdOptions, r#match::MatchValue as PbMatchValue,
    vector_output::Vector as OutputVector, vectors_output::VectorsOptions, CreateCollectionBuilder,
    CreateFieldIndexCollectionBuilder, DeletePointsBuilder, NamedVectors, PointStruct, PointsIdsList,
    Query, QueryPointsBuilder, RepeatedIntegers, RepeatedStrings, ScrollPointsBuilder,
    UpsertPointsBuilder, VectorInput, VectorParamsBuilder,
};
use qdrant_client::{Payload as PbPayload, Qdrant, QdrantError};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::{code, BackendError, BackendResult, ScrollPage, ScrollRequest, SearchRequest, VectorBackend};
use crate::config::ClientConfig;
use crate::errors::{Error, Result};
use crate::metadata_filter::{AnyValues, Condition, Filter, MatchValue};
use crate::model::*;

/// [`VectorBackend`] over `qdrant_client::Qdrant` (gRPC).
pub struct QdrantBackend {
    client: Qdrant,
}

impl QdrantBackend {
    /// Build a client from config. The gRPC channel connects lazily, so this
    /// does not touch the network.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let endpoint = config.endpoint();
        let mut builder = Qdrant::from_url(&endpoint).skip_compatibility_check();
        if let Some(api_key) = &config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder
            .build()
            .map_err(|e| Error::Client(format!("Failed to build Qdrant client for {}: {}", endpoint, e)))?;

        tracing::debug!("Qdrant client configured for {}", endpoint);
        Ok(Self { client })
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Qdrant {
        &self.client
    }
}

#[async_trait]
impl VectorBackend for QdrantBackend {
    async fn create_collection(&self, name: &str, distance: Distance, vector_size: u64) -> BackendResult<()> {
        tracing::debug!("create_collection {} ({} dims, {})", name, vector_size, distance);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(vector_size, distance_to_pb(distance))),
            )
            .await
            .map_err(classify)
            .map_err(|err| match err {
                BackendError::UnexpectedResponse { code: status, message }
                    if status == code::ALREADY_EXISTS || message.contains("already exists") =>
                {
                    BackendError::AlreadyExists(name.to_string())
                }
                other => other,
            })?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> BackendResult<()> {
        tracing::debug!("delete_collection {}", name);
        self.client.delete_collection(name).await.map_err(classify)?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[Point], wait: bool) -> BackendResult<UpdateResult> {
        tracing::debug!("upsert {} points into {}", points.len(), collection);
        let points: Vec<PointStruct> = points
            .iter()
            .map(|p| {
                PointStruct::new(
                    point_id_to_pb(&p.id),
                    vectors_to_pb(&p.vectors),
                    PbPayload::from(p.payload.clone()),
                )
            })
            .collect();

        let response = self
            .client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(wait))
            .await
            .map_err(classify)?;
        Ok(update_result_from_pb(response.result))
    }

    async fn query(&self, collection: &str, request: &SearchRequest) -> BackendResult<Vec<ScoredPoint>> {
        tracing::debug!("query {} (limit {})", collection, request.limit);
        let input = match &request.vector {
            QueryVector::Dense(vector) | QueryVector::Named { vector, .. } => {
                VectorInput::new_dense(vector.clone())
            }
            QueryVector::Sparse { vector, .. } => {
                VectorInput::new_sparse(vector.indices.clone(), vector.values.clone())
            }
        };

        let mut builder = QueryPointsBuilder::new(collection)
            .query(Query::new_nearest(input))
            .limit(request.limit)
            .with_payload(true)
            .with_vectors(request.with_vectors);
        if let Some(name) = request.vector.vector_name() {
            builder = builder.using(name);
        }
        if let Some(filter) = &request.filter {
            builder = builder.filter(filter_to_pb(filter));
        }
        if let Some(threshold) = request.score_threshold {
            builder = builder.score_threshold(threshold);
        }

        let response = self.client.query(builder).await.map_err(classify)?;
        response
            .result
            .into_iter()
            .map(|point| {
                Ok(ScoredPoint {
                    id: point_id_from_pb(point.id)?,
                    score: point.score,
                    vectors: vectors_from_pb(point.vectors),
                    payload: payload_from_pb(point.payload),
                })
            })
            .collect()
    }

    async fn scroll(&self, collection: &str, request: &ScrollRequest) -> BackendResult<ScrollPage> {
        tracing::debug!("scroll {} (limit {})", collection, request.limit);
        let mut builder = ScrollPointsBuilder::new(collection)
            .limit(request.limit)
            .with_payload(true)
            .with_vectors(request.with_vectors);
        if let Some(filter) = &request.filter {
            builder = builder.filter(filter_to_pb(filter));
        }
        if let Some(offset) = &request.offset {
            builder = builder.offset(point_id_to_pb(offset));
        }

        let response = self.client.scroll(builder).await.map_err(classify)?;
        let records = response
            .result
            .into_iter()
            .map(|point| {
                Ok(Record {
                    id: point_id_from_pb(point.id)?,
                    vectors: vectors_from_pb(point.vectors),
                    payload: payload_from_pb(point.payload),
                })
            })
            .collect::<BackendResult<Vec<_>>>()?;
        let next_page_offset = match response.next_page_offset {
            Some(id) => Some(point_id_from_pb(Some(id))?),
            None => None,
        };

        Ok(ScrollPage {
            records,
            next_page_offset,
        })
    }

    async fn delete_points(
        &self,
        collection: &str,
        selector: &PointsSelector,
        wait: bool,
    ) -> BackendResult<UpdateResult> {
        tracing::debug!("delete points from {}", collection);
        let builder = DeletePointsBuilder::new(collection).wait(wait);
        let builder = match selector {
            PointsSelector::Ids(ids) => builder.points(PointsIdsList {
                ids: ids.iter().map(point_id_to_pb).collect(),
            }),
            PointsSelector::Filter(filter) => builder.points(filter_to_pb(filter)),
        };
        let response = self.client.delete_points(builder).await.map_err(classify)?;
        Ok(update_result_from_pb(response.result))
    }

    async fn create_field_index(
        &self,
        collection: &str,
        field_name: &str,
        field_type: FieldType,
        wait: bool,
    ) -> BackendResult<()> {
        tracing::debug!("create_field_index {}.{} ({:?})", collection, field_name, field_type);
        self.client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(collection, field_name, field_type_to_pb(field_type))
                    .wait(wait),
            )
            .await
            .map_err(classify)?;
        Ok(())
    }
}

/// Sort client errors into retryable and non-retryable classes.
fn classify(err: QdrantError) -> BackendError {
    match err {
        QdrantError::ResponseError { status } | QdrantError::ResourceExhaustedError { status, .. } => {
            let status_code = status.code() as i32;
            let message = status.message().to_string();
            if code::is_transient(status_code) {
                BackendError::Transient(message)
            } else {
                BackendError::UnexpectedResponse {
                    code: status_code,
                    message,
                }
            }
        }
        other => BackendError::Client(other.to_string()),
    }
}

fn distance_to_pb(distance: Distance) -> pb::Distance {
    match distance {
        Distance::Cosine => pb::Distance::Cosine,
        Distance::Euclid => pb::Distance::Euclid,
        Distance::Dot => pb::Distance::Dot,
        Distance::Manhattan => pb::Distance::Manhattan,
    }
}

fn field_type_to_pb(field_type: FieldType) -> pb::FieldType {
    match field_type {
        FieldType::Keyword => pb::FieldType::Keyword,
        FieldType::Integer => pb::FieldType::Integer,
        FieldType::Float => pb::FieldType::Float,
        FieldType::Geo => pb::FieldType::Geo,
        FieldType::Text => pb::FieldType::Text,
        FieldType::Bool => pb::FieldType::Bool,
        FieldType::Datetime => pb::FieldType::Datetime,
        FieldType::Uuid => pb::FieldType::Uuid,
    }
}

fn point_id_to_pb(id: &PointId) -> pb::PointId {
    match id {
        PointId::Num(n) => pb::PointId::from(*n),
        PointId::Uuid(s) => pb::PointId::from(s.clone()),
    }
}

fn point_id_from_pb(id: Option<pb::PointId>) -> BackendResult<PointId> {
    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Num(n)) => Ok(PointId::Num(n)),
        Some(PointIdOptions::Uuid(s)) => Ok(PointId::Uuid(s)),
        None => Err(BackendError::Client("point without id in response".to_string())),
    }
}

fn vector_to_pb(vector: &Vector) -> pb::Vector {
    match vector {
        Vector::Dense(v) => pb::Vector::new_dense(v.clone()),
        Vector::Sparse(s) => pb::Vector::new_sparse(s.indices.clone(), s.values.clone()),
        Vector::MultiDense(rows) => pb::Vector::new_multi(rows.clone()),
    }
}

fn vectors_to_pb(vectors: &Vectors) -> pb::Vectors {
    match vectors {
        Vectors::Single(v) => v.clone().into(),
        Vectors::Named(map) => map
            .iter()
            .fold(NamedVectors::default(), |named, (name, vector)| {
                named.add_vector(name.clone(), vector_to_pb(vector))
            })
            .into(),
    }
}

fn vector_from_output(output: pb::VectorOutput) -> Vector {
    match output.into_vector() {
        OutputVector::Dense(dense) => Vector::Dense(dense.data),
        OutputVector::Sparse(sparse) => Vector::Sparse(SparseVector::new(sparse.indices, sparse.values)),
        OutputVector::MultiDense(multi) => {
            Vector::MultiDense(multi.vectors.into_iter().map(|row| row.data).collect())
        }
    }
}

fn vectors_from_pb(vectors: Option<pb::VectorsOutput>) -> Option<Vectors> {
    match vectors?.vectors_options? {
        VectorsOptions::Vector(output) => match vector_from_output(output) {
            Vector::Dense(v) => Some(Vectors::Single(v)),
            sparse => Some(Vectors::Named(BTreeMap::from([(String::new(), sparse)]))),
        },
        VectorsOptions::Vectors(named) => Some(Vectors::Named(
            named
                .vectors
                .into_iter()
                .map(|(name, output)| (name, vector_from_output(output)))
                .collect(),
        )),
    }
}

fn payload_from_pb(payload: HashMap<String, pb::Value>) -> Payload {
    payload
        .into_iter()
        .map(|(key, value)| (key, value.into_json()))
        .collect()
}

fn update_result_from_pb(result: Option<pb::UpdateResult>) -> UpdateResult {
    let Some(result) = result else {
        return UpdateResult {
            operation_id: None,
            status: UpdateStatus::Unknown,
        };
    };
    let status = match result.status {
        s if s == pb::UpdateStatus::Acknowledged as i32 => UpdateStatus::Acknowledged,
        s if s == pb::UpdateStatus::Completed as i32 => UpdateStatus::Completed,
        _ => UpdateStatus::Unknown,
    };
    UpdateResult {
        operation_id: result.operation_id,
        status,
    }
}

fn filter_to_pb(filter: &Filter) -> pb::Filter {
    pb::Filter {
        must: filter.must.iter().map(condition_to_pb).collect(),
        should: filter.should.iter().map(condition_to_pb).collect(),
        must_not: filter.must_not.iter().map(condition_to_pb).collect(),
        ..Default::default()
    }
}

fn condition_to_pb(condition: &Condition) -> pb::Condition {
    match condition {
        Condition::Match { key, value } => match value {
            MatchValue::Bool(b) => pb::Condition::matches(key.clone(), *b),
            MatchValue::Integer(i) => pb::Condition::matches(key.clone(), *i),
            MatchValue::Keyword(s) => pb::Condition::matches(key.clone(), s.clone()),
        },
        Condition::MatchAny { key, any } => match any {
            AnyValues::Integers(ints) => pb::Condition::matches(key.clone(), ints.clone()),
            AnyValues::Keywords(words) => pb::Condition::matches(key.clone(), words.clone()),
        },
        Condition::MatchExcept { key, except } => {
            let value = match except {
                AnyValues::Integers(integers) => PbMatchValue::ExceptIntegers(RepeatedIntegers {
                    integers: integers.clone(),
                }),
                AnyValues::Keywords(strings) => PbMatchValue::ExceptKeywords(RepeatedStrings {
                    strings: strings.clone(),
                }),
            };
            pb::Condition::matches(key.clone(), value)
        }
        Condition::Range { key, range } => pb::Condition::range(
            key.clone(),
            pb::Range {
                gt: range.gt,
                gte: range.gte,
                lt: range.lt,
                lte: range.lte,
            },
        ),
        Condition::Text { key, text } => pb::Condition::matches(key.clone(), PbMatchValue::Text(text.clone())),
        Condition::IsEmpty { key } => pb::Condition::is_empty(key.clone()),
        Condition::HasId { ids } => pb::Condition::has_id(ids.iter().map(point_id_to_pb)),
        Condition::Filter(nested) => filter_to_pb(nested).into(),
    }
}
