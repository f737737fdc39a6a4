use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::{code, BackendError, BackendResult, ScrollPage, ScrollRequest, SearchRequest, VectorBackend};
use crate::model::*;

/// Backend operations, used to target injected faults and to label call records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateCollection,
    DeleteCollection,
    Upsert,
    Query,
    Scroll,
    DeletePoints,
    CreateFieldIndex,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub operation: Operation,
    pub collection: String,
    /// Points submitted for upserts, zero otherwise.
    pub items: usize,
}

struct Collection {
    distance: Distance,
    vector_size: u64,
    points: BTreeMap<PointId, Point>,
    field_indexes: BTreeMap<String, FieldType>,
}

#[derive(Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    faults: VecDeque<(Operation, BackendError)>,
    calls: Vec<CallRecord>,
    next_operation_id: u64,
}

/// In-process [`VectorBackend`] with exact scoring and scripted failures.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `operation` fail with `error`. Faults queue up
    /// and are consumed in order.
    pub fn fail_next(&self, operation: Operation, error: BackendError) {
        self.lock().faults.push_back((operation, error));
    }

    /// Every call made so far, failed ones included.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.lock().collections.keys().cloned().collect()
    }

    pub fn point_count(&self, collection: &str) -> Option<usize> {
        self.lock().collections.get(collection).map(|c| c.points.len())
    }

    pub fn field_index(&self, collection: &str, field_name: &str) -> Option<FieldType> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|c| c.field_indexes.get(field_name).copied())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the maps consistent; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call and pop a matching injected fault, if any.
    fn begin(&self, operation: Operation, collection: &str, items: usize) -> BackendResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(CallRecord {
            operation,
            collection: collection.to_string(),
            items,
        });
        if let Some(pos) = state.faults.iter().position(|(op, _)| *op == operation) {
            if let Some((_, err)) = state.faults.remove(pos) {
                return Err(err);
            }
        }
        Ok(state)
    }
}

impl State {
    fn collection(&self, name: &str) -> BackendResult<&Collection> {
        self.collections.get(name).ok_or_else(|| not_found(name))
    }

    fn collection_mut(&mut self, name: &str) -> BackendResult<&mut Collection> {
        self.collections.get_mut(name).ok_or_else(|| not_found(name))
    }

    fn completed(&mut self) -> UpdateResult {
        let operation_id = self.next_operation_id;
        self.next_operation_id += 1;
        UpdateResult {
            operation_id: Some(operation_id),
            status: UpdateStatus::Completed,
        }
    }
}

fn not_found(name: &str) -> BackendError {
    BackendError::UnexpectedResponse {
        code: code::NOT_FOUND,
        message: format!("Not found: Collection `{}` doesn't exist!", name),
    }
}

fn invalid(message: String) -> BackendError {
    BackendError::UnexpectedResponse {
        code: code::INVALID_ARGUMENT,
        message,
    }
}

fn dense_score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        Distance::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        Distance::Cosine => {
            let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                dot / (norm_a * norm_b)
            }
        }
        Distance::Euclid => a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt(),
        Distance::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn create_collection(&self, name: &str, distance: Distance, vector_size: u64) -> BackendResult<()> {
        let mut state = self.begin(Operation::CreateCollection, name, 0)?;
        if state.collections.contains_key(name) {
            return Err(BackendError::AlreadyExists(name.to_string()));
        }
        state.collections.insert(
            name.to_string(),
            Collection {
                distance,
                vector_size,
                points: BTreeMap::new(),
                field_indexes: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> BackendResult<()> {
        let mut state = self.begin(Operation::DeleteCollection, name, 0)?;
        state.collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[Point], _wait: bool) -> BackendResult<UpdateResult> {
        let mut state = self.begin(Operation::Upsert, collection, points.len())?;
        let target = state.collection_mut(collection)?;

        for point in points {
            if let Some(dense) = point.vectors.dense(None) {
                if dense.len() as u64 != target.vector_size {
                    return Err(invalid(format!(
                        "Wrong input: Vector dimension error: expected dim: {}, got {}",
                        target.vector_size,
                        dense.len()
                    )));
                }
            }
        }
        for point in points {
            target.points.insert(point.id.clone(), point.clone());
        }

        Ok(state.completed())
    }

    async fn query(&self, collection: &str, request: &SearchRequest) -> BackendResult<Vec<ScoredPoint>> {
        let state = self.begin(Operation::Query, collection, 0)?;
        let target = state.collection(collection)?;

        let distance = match &request.vector {
            QueryVector::Sparse { .. } => Distance::Dot,
            _ => target.distance,
        };

        let mut hits: Vec<ScoredPoint> = target
            .points
            .values()
            .filter(|p| {
                request
                    .filter
                    .as_ref()
                    .map(|f| f.matches(&p.id, &p.payload))
                    .unwrap_or(true)
            })
            .filter_map(|p| {
                let score = match &request.vector {
                    QueryVector::Dense(q) => dense_score(distance, q, p.vectors.dense(None)?),
                    QueryVector::Named { name, vector } => dense_score(distance, vector, p.vectors.dense(Some(name))?),
                    QueryVector::Sparse { name, vector } => vector.dot(p.vectors.sparse(name)?),
                };
                Some(ScoredPoint {
                    id: p.id.clone(),
                    score,
                    vectors: request.with_vectors.then(|| p.vectors.clone()),
                    payload: p.payload.clone(),
                })
            })
            .filter(|hit| match request.score_threshold {
                Some(t) if distance.higher_is_better() => hit.score >= t,
                Some(t) => hit.score <= t,
                None => true,
            })
            .collect();

        hits.sort_by(|a, b| {
            let ord = if distance.higher_is_better() {
                b.score.partial_cmp(&a.score)
            } else {
                a.score.partial_cmp(&b.score)
            };
            ord.unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(request.limit as usize);
        Ok(hits)
    }

    async fn scroll(&self, collection: &str, request: &ScrollRequest) -> BackendResult<ScrollPage> {
        let state = self.begin(Operation::Scroll, collection, 0)?;
        let target = state.collection(collection)?;

        let mut matching = target
            .points
            .values()
            .filter(|p| request.offset.as_ref().map(|o| &p.id >= o).unwrap_or(true))
            .filter(|p| {
                request
                    .filter
                    .as_ref()
                    .map(|f| f.matches(&p.id, &p.payload))
                    .unwrap_or(true)
            });

        let records: Vec<Record> = matching
            .by_ref()
            .take(request.limit as usize)
            .map(|p| Record {
                id: p.id.clone(),
                vectors: request.with_vectors.then(|| p.vectors.clone()),
                payload: p.payload.clone(),
            })
            .collect();
        let next_page_offset = matching.next().map(|p| p.id.clone());

        Ok(ScrollPage {
            records,
            next_page_offset,
        })
    }

    async fn delete_points(
        &self,
        collection: &str,
        selector: &PointsSelector,
        _wait: bool,
    ) -> BackendResult<UpdateResult> {
        let mut state = self.begin(Operation::DeletePoints, collection, 0)?;
        let target = state.collection_mut(collection)?;
        match selector {
            PointsSelector::Ids(ids) => {
                for id in ids {
                    target.points.remove(id);
                }
            }
            PointsSelector::Filter(filter) => {
                target.points.retain(|id, p| !filter.matches(id, &p.payload));
            }
        }
        Ok(state.completed())
    }

    async fn create_field_index(
        &self,
        collection: &str,
        field_name: &str,
        field_type: FieldType,
        _wait: bool,
    ) -> BackendResult<()> {
        let mut state = self.begin(Operation::CreateFieldIndex, collection, 0)?;
        state
            .collection_mut(collection)?
            .field_indexes
            .insert(field_name.to_string(), field_type);
        Ok(())
    }
}
