//! Stateful facade over a [`VectorBackend`].
//!
//! The client remembers an "active collection". Every collection-scoped call
//! resolves its target as: explicit non-empty name, else the active
//! collection, else [`Error::CollectionNameRequired`].
//!
//! # Failure policy
//!
//! - Configuration and naming errors are returned immediately.
//! - [`CollectionClient::upsert_batched`] retries a chunk once on a transient
//!   failure. If the retry fails too, the whole operation stops and returns
//!   the ids of the chunks written so far. Later chunks are not attempted.
//! - [`CollectionClient::search`] retries once on a transient or
//!   unexpected-response failure, then returns an empty result.
//! - Every other operation returns the first failure unchanged.

use std::future::Future;

use crate::backend::{BackendError, QdrantBackend, ScrollRequest, SearchRequest, VectorBackend};
use crate::config::ClientConfig;
use crate::defaults;
use crate::errors::{Error, Result};
use crate::logging::LogSink;
use crate::metadata_filter::Filter;
use crate::model::*;

const LOG_PREFIX: &str = "QdrantWrapper";

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub limit: u64,
    pub filter: Option<Filter>,
    pub collection_name: Option<String>,
    pub with_vectors: bool,
    /// Minimum score for cosine and dot collections; a maximum distance for
    /// euclid and manhattan ones. `None` turns the cutoff off.
    pub score_threshold: Option<f32>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: defaults::DEFAULT_TOP_K,
            filter: None,
            collection_name: None,
            with_vectors: false,
            score_threshold: Some(defaults::DEFAULT_SCORE_THRESHOLD),
        }
    }
}

impl SearchOptions {
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    pub fn with_vectors(mut self, with_vectors: bool) -> Self {
        self.with_vectors = with_vectors;
        self
    }

    /// `None` disables the threshold.
    pub fn score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrollOptions {
    pub collection_name: Option<String>,
    pub limit: u32,
    pub with_vectors: bool,
    /// Cursor returned by a previous page.
    pub offset: Option<PointId>,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            collection_name: None,
            limit: defaults::DEFAULT_TOP_K as u32,
            with_vectors: false,
            offset: None,
        }
    }
}

impl ScrollOptions {
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_vectors(mut self, with_vectors: bool) -> Self {
        self.with_vectors = with_vectors;
        self
    }

    pub fn offset(mut self, offset: PointId) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Runs `op`, and runs it a second time if the first failure satisfies `retryable`.
async fn retry_once<T, F, Fut>(
    mut op: F,
    retryable: impl Fn(&Error) -> bool,
    on_retry: impl FnOnce(&Error),
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(err) if retryable(&err) => {
            on_retry(&err);
            op().await
        }
        other => other,
    }
}

pub struct CollectionClient<B = QdrantBackend> {
    backend: B,
    config: ClientConfig,
    collection_name: Option<String>,
    logger: LogSink,
}

impl CollectionClient<QdrantBackend> {
    /// Connect to Qdrant. Fails with [`Error::ConnectionConfig`] when neither
    /// a port nor an API key is configured.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let backend = QdrantBackend::new(&config)?;
        Ok(Self::with_backend(backend, config))
    }
}

impl<B: VectorBackend> CollectionClient<B> {
    pub fn with_backend(backend: B, config: ClientConfig) -> Self {
        let collection_name = config.collection_name.clone().filter(|n| !n.is_empty());
        Self {
            backend,
            config,
            collection_name,
            logger: LogSink::default(),
        }
    }

    pub fn with_logger(mut self, logger: LogSink) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn active_collection(&self) -> Option<&str> {
        self.collection_name.as_deref()
    }

    pub fn set_active_collection(&mut self, name: Option<String>) {
        self.collection_name = name.filter(|n| !n.is_empty());
    }

    fn log(&self, line: &str) {
        if self.config.print_logs {
            self.logger.log(line);
        }
    }

    fn resolve_collection<'a>(&'a self, explicit: Option<&'a str>) -> Result<&'a str> {
        explicit
            .filter(|n| !n.is_empty())
            .or(self.collection_name.as_deref())
            .ok_or(Error::CollectionNameRequired)
    }

    /// Create a collection with the given or configured distance and vector size.
    ///
    /// Any unexpected response from the service is reported as
    /// [`Error::CollectionAlreadyExists`].
    pub async fn create_collection(
        &mut self,
        name: &str,
        distance: Option<Distance>,
        vector_size: Option<u64>,
        set_active: bool,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(Error::CollectionNameRequired);
        }
        let distance = distance.unwrap_or(self.config.distance);
        let vector_size = vector_size.unwrap_or(self.config.vector_size);

        self.backend
            .create_collection(name, distance, vector_size)
            .await
            .map_err(|err| match err {
                BackendError::AlreadyExists(_) | BackendError::UnexpectedResponse { .. } => {
                    Error::CollectionAlreadyExists(name.to_string())
                }
                other => other.into(),
            })?;

        tracing::info!("Created collection {} ({} dims, {})", name, vector_size, distance);
        if set_active {
            self.collection_name = Some(name.to_string());
        }
        self.log(&format!("{}: Collection {} created successfully", LOG_PREFIX, name));
        Ok(())
    }

    /// Write all points in one blocking (`wait = true`) request.
    pub async fn upsert(&self, points: &[Point], collection_name: Option<&str>) -> Result<UpdateResult> {
        let collection = self.resolve_collection(collection_name)?;
        let result = self.backend.upsert(collection, points, true).await?;

        self.log(&result.to_string());
        self.log(&format!("{}: Upserted {} points successfully", LOG_PREFIX, points.len()));
        Ok(result)
    }

    /// Upsert in consecutive chunks of at most `batch_size` points and return
    /// the ids that were written, in submission order.
    ///
    /// A chunk that fails transiently is retried once. If it fails again the
    /// operation stops: ids of the chunks already written are returned and no
    /// later chunk is sent.
    pub async fn upsert_batched(
        &self,
        points: &[Point],
        batch_size: usize,
        collection_name: Option<&str>,
    ) -> Result<Vec<PointId>> {
        if batch_size == 0 {
            return Err(Error::InvalidBatchSize);
        }
        let collection = self.resolve_collection(collection_name)?;

        let mut upserted_ids = Vec::with_capacity(points.len());
        for (index, chunk) in points.chunks(batch_size).enumerate() {
            let start = index * batch_size;
            let end = start + batch_size;

            let outcome = retry_once(
                move || self.upsert(chunk, Some(collection)),
                Error::is_transient,
                |err| {
                    tracing::warn!("Upsert of batch {}..{} into {} failed, retrying: {}", start, end, collection, err);
                    self.log(&format!("{}: Failed to upsert batch {} to {}. Retrying...", LOG_PREFIX, start, end));
                },
            )
            .await;

            match outcome {
                Ok(_) => upserted_ids.extend(chunk.iter().map(|p| p.id.clone())),
                Err(err) if err.is_transient() => {
                    tracing::warn!(
                        "Upsert of batch {}..{} into {} failed twice, stopping after {} points: {}",
                        start,
                        end,
                        collection,
                        upserted_ids.len(),
                        err
                    );
                    self.log(&format!("{}: Failed to upsert batch {} to {} again...", LOG_PREFIX, start, end));
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(upserted_ids)
    }

    /// Similarity search, best match first.
    ///
    /// Retries once on a transient or unexpected-response failure; a second
    /// failure of that kind yields an empty result instead of an error.
    pub async fn search(&self, query: impl Into<QueryVector>, options: SearchOptions) -> Result<Vec<ScoredPoint>> {
        let collection = self.resolve_collection(options.collection_name.as_deref())?;
        let request = SearchRequest {
            vector: query.into(),
            limit: options.limit,
            filter: options.filter.clone(),
            with_vectors: options.with_vectors,
            score_threshold: options.score_threshold,
        };

        let backend = &self.backend;
        let request = &request;
        let retryable = |err: &Error| err.is_transient() || matches!(err, Error::UnexpectedResponse { .. });
        let outcome = retry_once(
            || async move { backend.query(collection, request).await.map_err(Error::from) },
            retryable,
            |err| {
                tracing::warn!("Search in {} failed, retrying: {}", collection, err);
                self.log(&format!("{}: Failed to search in collection {}. Retrying...", LOG_PREFIX, collection));
            },
        )
        .await;

        match outcome {
            Ok(hits) => Ok(hits),
            Err(err) if retryable(&err) => {
                tracing::warn!("Search in {} failed twice, returning no results: {}", collection, err);
                self.log(&format!("{}: Failed to search in collection {} again...", LOG_PREFIX, collection));
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// One page of points matching `filter`, plus the cursor for the next
    /// page. Pass the cursor back through [`ScrollOptions::offset`] to continue.
    pub async fn filter_search(
        &self,
        filter: Filter,
        options: ScrollOptions,
    ) -> Result<(Vec<Record>, Option<PointId>)> {
        let collection = self.resolve_collection(options.collection_name.as_deref())?;
        let request = ScrollRequest {
            filter: (!filter.is_empty()).then_some(filter),
            limit: options.limit,
            with_vectors: options.with_vectors,
            offset: options.offset,
        };

        let page = self.backend.scroll(collection, &request).await?;
        Ok((page.records, page.next_page_offset))
    }

    /// Delete a collection. The active collection is cleared afterwards even
    /// when a different collection was named explicitly.
    pub async fn delete_collection(&mut self, collection_name: Option<&str>) -> Result<()> {
        let collection = self.resolve_collection(collection_name)?.to_string();
        self.backend.delete_collection(&collection).await?;

        tracing::info!("Deleted collection {}", collection);
        self.log(&format!("{}: Collection {} deleted successfully", LOG_PREFIX, collection));
        self.collection_name = None;
        Ok(())
    }

    pub async fn delete_points(
        &self,
        selector: impl Into<PointsSelector>,
        collection_name: Option<&str>,
    ) -> Result<UpdateResult> {
        let collection = self.resolve_collection(collection_name)?;
        let result = self.backend.delete_points(collection, &selector.into(), true).await?;

        self.log(&format!("{}: Data deleted successfully", LOG_PREFIX));
        Ok(result)
    }

    /// Index a payload field of the active collection.
    pub async fn create_field_index(&self, field_name: &str, field_type: FieldType) -> Result<()> {
        let collection = self.resolve_collection(None)?;
        self.backend
            .create_field_index(collection, field_name, field_type, true)
            .await?;

        self.log(&format!("{}: {} index created successfully", LOG_PREFIX, field_name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{CallRecord, MemoryBackend, Operation};
    use crate::backend::code;
    use crate::metadata_filter::Condition;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use tokio_test::{assert_err, assert_ok};

    fn config() -> ClientConfig {
        ClientConfig::new("http://localhost:6333").api_key("k").vector_size(4)
    }

    fn client() -> CollectionClient<MemoryBackend> {
        CollectionClient::with_backend(MemoryBackend::new(), config())
    }

    fn capturing_client(print_logs: bool) -> (CollectionClient<MemoryBackend>, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let client = CollectionClient::with_backend(MemoryBackend::new(), config().print_logs(print_logs))
            .with_logger(LogSink::new(move |line| captured.lock().unwrap().push(line.to_string())));
        (client, lines)
    }

    fn points(n: u64) -> Vec<Point> {
        (1..=n)
            .map(|i| Point::new(i, vec![i as f32, 1.0, 0.0, 0.0]))
            .collect()
    }

    fn transient() -> BackendError {
        BackendError::Transient("connection reset".to_string())
    }

    fn upsert_calls(client: &CollectionClient<MemoryBackend>) -> Vec<CallRecord> {
        client
            .backend()
            .calls()
            .into_iter()
            .filter(|c| c.operation == Operation::Upsert)
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let mut client = client();

        assert_ok!(client.create_collection("c", None, None, true).await);
        assert_eq!(client.active_collection(), Some("c"));

        let point = Point::new(1u64, vec![0.1, 0.2, 0.3, 0.4]);
        assert_ok!(client.upsert(&[point], None).await);

        let hits = client
            .search(vec![0.1, 0.2, 0.3, 0.4], SearchOptions::default().limit(1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, PointId::Num(1));
        assert!((hits[0].score - 1.0).abs() < 1e-5);

        assert_ok!(client.delete_collection(None).await);
        assert_eq!(client.active_collection(), None);
        assert!(client.backend().collection_names().is_empty());
    }

    #[tokio::test]
    async fn test_create_twice_reports_already_exists() {
        let mut client = client();
        assert_ok!(client.create_collection("dup", None, None, true).await);

        let err = client.create_collection("dup", None, None, true).await.unwrap_err();
        assert!(matches!(err, Error::CollectionAlreadyExists(ref name) if name == "dup"));
    }

    #[tokio::test]
    async fn test_create_maps_any_unexpected_response_to_already_exists() {
        let mut client = client();
        client.backend().fail_next(
            Operation::CreateCollection,
            BackendError::UnexpectedResponse {
                code: code::INVALID_ARGUMENT,
                message: "Wrong input".to_string(),
            },
        );

        let err = client.create_collection("x", None, None, true).await.unwrap_err();
        assert!(matches!(err, Error::CollectionAlreadyExists(_)));
        assert_eq!(client.active_collection(), None);
    }

    #[tokio::test]
    async fn test_create_requires_name_and_respects_set_active() {
        let mut client = client();
        assert!(matches!(
            client.create_collection("", None, None, true).await,
            Err(Error::CollectionNameRequired)
        ));

        assert_ok!(client.create_collection("side", Some(Distance::Dot), Some(8), false).await);
        assert_eq!(client.active_collection(), None);
    }

    #[tokio::test]
    async fn test_collection_scoped_calls_require_a_name() {
        let mut client = client();
        let filter = Filter::new();

        assert!(matches!(client.upsert(&points(1), None).await, Err(Error::CollectionNameRequired)));
        assert!(matches!(
            client.upsert_batched(&points(1), 50, None).await,
            Err(Error::CollectionNameRequired)
        ));
        assert!(matches!(
            client.search(vec![1.0, 0.0, 0.0, 0.0], SearchOptions::default()).await,
            Err(Error::CollectionNameRequired)
        ));
        assert!(matches!(
            client.filter_search(filter.clone(), ScrollOptions::default()).await,
            Err(Error::CollectionNameRequired)
        ));
        assert!(matches!(
            client.delete_points(vec![1u64], None).await,
            Err(Error::CollectionNameRequired)
        ));
        assert!(matches!(
            client.create_field_index("city", FieldType::Keyword).await,
            Err(Error::CollectionNameRequired)
        ));
        assert!(matches!(client.delete_collection(None).await, Err(Error::CollectionNameRequired)));
        assert!(matches!(
            client.upsert(&points(1), Some("")).await,
            Err(Error::CollectionNameRequired)
        ));
        assert!(client.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_name_wins_over_active() {
        let mut client = client();
        assert_ok!(client.create_collection("active", None, None, true).await);
        assert_ok!(client.create_collection("other", None, None, false).await);

        assert_ok!(client.upsert(&points(2), Some("other")).await);
        assert_eq!(client.backend().point_count("other"), Some(2));
        assert_eq!(client.backend().point_count("active"), Some(0));

        let hits = client
            .search(vec![1.0, 1.0, 0.0, 0.0], SearchOptions::default().collection("other"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_initial_collection_from_config() {
        let backend = MemoryBackend::new();
        backend.create_collection("preset", Distance::Cosine, 4).await.unwrap();
        let client = CollectionClient::with_backend(backend, config().collection_name("preset"));

        assert_eq!(client.active_collection(), Some("preset"));
        assert_ok!(client.upsert(&points(3), None).await);
        assert_eq!(client.backend().point_count("preset"), Some(3));
    }

    #[tokio::test]
    async fn test_upsert_batched_partitions_in_order() {
        let mut client = client();
        assert_ok!(client.create_collection("c", None, None, true).await);
        let input = points(7);

        let ids = client.upsert_batched(&input, 3, None).await.unwrap();

        let expected: Vec<PointId> = input.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, expected);
        let sizes: Vec<usize> = upsert_calls(&client).iter().map(|c| c.items).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_upsert_batched_retries_transient_failure_once() {
        let mut client = client();
        assert_ok!(client.create_collection("c", None, None, true).await);
        client.backend().fail_next(Operation::Upsert, transient());

        let ids = client.upsert_batched(&points(4), 2, None).await.unwrap();

        assert_eq!(ids.len(), 4);
        assert_eq!(upsert_calls(&client).len(), 3);
        assert_eq!(client.backend().point_count("c"), Some(4));
    }

    #[tokio::test]
    async fn test_upsert_batched_stops_when_first_chunk_fails_twice() {
        let mut client = client();
        assert_ok!(client.create_collection("c", None, None, true).await);
        client.backend().fail_next(Operation::Upsert, transient());
        client.backend().fail_next(Operation::Upsert, transient());

        let ids = client.upsert_batched(&points(6), 2, None).await.unwrap();

        assert!(ids.is_empty());
        // Two attempts at the first chunk, none for the remaining two.
        assert_eq!(upsert_calls(&client).len(), 2);
        assert_eq!(client.backend().point_count("c"), Some(0));
    }

    #[tokio::test]
    async fn test_upsert_batched_returns_prefix_before_failing_chunk() {
        let backend = ScriptedUpserts::failing_from(2);
        let client = CollectionClient::with_backend(backend, config().collection_name("c"));

        let ids = client.upsert_batched(&points(10), 3, None).await.unwrap();

        assert_eq!(ids, (1..=6u64).map(PointId::Num).collect::<Vec<_>>());
        // Chunks 0 and 1 once each, chunk 2 twice, chunk 3 never.
        assert_eq!(*client.backend().attempts.lock().unwrap(), vec![0, 1, 2, 2]);
    }

    #[tokio::test]
    async fn test_upsert_batched_propagates_non_transient_failure() {
        let mut client = client();
        assert_ok!(client.create_collection("c", None, None, true).await);
        let bad = vec![Point::new(1u64, vec![1.0, 2.0])];

        let err = client.upsert_batched(&bad, 50, None).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse { code: code::INVALID_ARGUMENT, .. }));
        assert_eq!(upsert_calls(&client).len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_batched_rejects_zero_batch_size() {
        let client = client();
        assert!(matches!(
            client.upsert_batched(&points(1), 0, Some("c")).await,
            Err(Error::InvalidBatchSize)
        ));
    }

    #[tokio::test]
    async fn test_search_retries_then_succeeds() {
        let mut client = client();
        assert_ok!(client.create_collection("c", None, None, true).await);
        assert_ok!(client.upsert(&points(2), None).await);
        client.backend().fail_next(Operation::Query, transient());

        let hits = client.search(vec![1.0, 1.0, 0.0, 0.0], SearchOptions::default()).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_search_degrades_to_empty_after_two_failures() {
        let (mut client, lines) = capturing_client(true);
        assert_ok!(client.create_collection("c", None, None, true).await);
        assert_ok!(client.upsert(&points(2), None).await);
        client.backend().fail_next(Operation::Query, transient());
        client.backend().fail_next(
            Operation::Query,
            BackendError::UnexpectedResponse {
                code: code::INTERNAL,
                message: "boom".to_string(),
            },
        );

        let hits = assert_ok!(client.search(vec![1.0, 1.0, 0.0, 0.0], SearchOptions::default()).await);
        assert!(hits.is_empty());

        let lines = lines.lock().unwrap();
        assert!(lines.iter().any(|l| l == "QdrantWrapper: Failed to search in collection c. Retrying..."));
        assert!(lines.iter().any(|l| l == "QdrantWrapper: Failed to search in collection c again..."));
    }

    #[tokio::test]
    async fn test_search_does_not_swallow_client_errors() {
        let mut client = client();
        assert_ok!(client.create_collection("c", None, None, true).await);
        client
            .backend()
            .fail_next(Operation::Query, BackendError::Client("bad uri".to_string()));

        assert_err!(client.search(vec![1.0, 0.0, 0.0, 0.0], SearchOptions::default()).await);
    }

    #[tokio::test]
    async fn test_search_named_and_filtered() {
        let mut client = client();
        assert_ok!(client.create_collection("c", None, None, true).await);
        let docs = vec![
            Point::new(1u64, vec![1.0, 0.0, 0.0, 0.0]).with_payload(json!({"lang": "rust"}).as_object().unwrap().clone()),
            Point::new(2u64, vec![1.0, 0.1, 0.0, 0.0]).with_payload(json!({"lang": "go"}).as_object().unwrap().clone()),
        ];
        assert_ok!(client.upsert(&docs, None).await);

        let options = SearchOptions::default()
            .filter(Filter::new().must(Condition::matches("lang", "go")))
            .with_vectors(true);
        let hits = client.search(vec![1.0, 0.0, 0.0, 0.0], options).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, PointId::Num(2));
        assert!(hits[0].vectors.is_some());

        // No point carries a named vector, so a named query finds nothing.
        let named = client
            .search(QueryVector::named("image", vec![1.0, 0.0]), SearchOptions::default())
            .await
            .unwrap();
        assert!(named.is_empty());
    }

    #[tokio::test]
    async fn test_search_named_dense_and_sparse_vectors() {
        let mut client = client();
        assert_ok!(client.create_collection("c", None, None, true).await);
        let named = Vectors::Named(BTreeMap::from([
            ("image".to_string(), Vector::Dense(vec![1.0, 0.0])),
            ("keywords".to_string(), Vector::Sparse(SparseVector::new(vec![1, 4], vec![1.0, 1.0]))),
        ]));
        let docs = vec![Point::new(1u64, vec![1.0, 0.0, 0.0, 0.0]), Point::new(5u64, named)];
        assert_ok!(client.upsert(&docs, None).await);

        let hits = client
            .search(QueryVector::named("image", vec![1.0, 0.0]), SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, PointId::Num(5));
        assert!((hits[0].score - 1.0).abs() < 1e-6);

        let hits = client
            .search(
                QueryVector::sparse("keywords", vec![1, 4], vec![1.0, 1.0]),
                SearchOptions::default().with_vectors(true),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, PointId::Num(5));
        assert!((hits[0].score - 2.0).abs() < 1e-6);
        assert_eq!(
            hits[0].vectors.as_ref().and_then(|v| v.sparse("keywords")),
            Some(&SparseVector::new(vec![1, 4], vec![1.0, 1.0]))
        );
    }

    #[tokio::test]
    async fn test_score_threshold_is_a_distance_cutoff_for_euclid() {
        let mut client = client();
        assert_ok!(client.create_collection("e", Some(Distance::Euclid), None, true).await);
        let docs = vec![
            Point::new(1u64, vec![1.0, 0.0, 0.0, 0.0]),
            Point::new(2u64, vec![0.0, 1.0, 0.0, 0.0]),
        ];
        assert_ok!(client.upsert(&docs, None).await);

        let query: Vec<f32> = vec![0.9, 0.0, 0.0, 0.0];
        let strict = client.search(query.clone(), SearchOptions::default()).await.unwrap();
        assert!(strict.is_empty());

        let open = client
            .search(query, SearchOptions::default().score_threshold(None))
            .await
            .unwrap();
        assert_eq!(open.iter().map(|h| h.id.clone()).collect::<Vec<_>>(), vec![PointId::Num(1), PointId::Num(2)]);
    }

    #[tokio::test]
    async fn test_filter_search_pages_with_cursor() {
        let mut client = client();
        assert_ok!(client.create_collection("c", None, None, true).await);
        let docs: Vec<Point> = (1..=5u64)
            .map(|i| {
                Point::new(i, vec![1.0, 0.0, 0.0, 0.0])
                    .with_payload(json!({"rank": i}).as_object().unwrap().clone())
            })
            .collect();
        assert_ok!(client.upsert(&docs, None).await);
        let filter = Filter::try_from(json!({"rank": {"$gte": 2}})).unwrap();

        let (page, cursor) = client
            .filter_search(filter.clone(), ScrollOptions::default().limit(2))
            .await
            .unwrap();
        assert_eq!(page.iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec![PointId::Num(2), PointId::Num(3)]);
        assert_eq!(cursor, Some(PointId::Num(4)));

        let (rest, cursor) = client
            .filter_search(filter, ScrollOptions::default().limit(2).offset(PointId::Num(4)))
            .await
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(cursor, None);
    }

    #[tokio::test]
    async fn test_delete_collection_clears_active_even_for_other_name() {
        let mut client = client();
        assert_ok!(client.create_collection("keep", None, None, true).await);
        assert_ok!(client.create_collection("drop", None, None, false).await);

        assert_ok!(client.delete_collection(Some("drop")).await);
        assert_eq!(client.active_collection(), None);
        assert_eq!(client.backend().collection_names(), vec!["keep".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_points_by_ids_and_filter() {
        let mut client = client();
        assert_ok!(client.create_collection("c", None, None, true).await);
        let docs: Vec<Point> = (1..=4u64)
            .map(|i| {
                Point::new(i, vec![1.0, 0.0, 0.0, 0.0])
                    .with_payload(json!({"even": i % 2 == 0}).as_object().unwrap().clone())
            })
            .collect();
        assert_ok!(client.upsert(&docs, None).await);

        assert_ok!(client.delete_points(vec![1u64], None).await);
        assert_eq!(client.backend().point_count("c"), Some(3));

        let evens = Filter::new().must(Condition::matches("even", true));
        assert_ok!(client.delete_points(evens, Some("c")).await);
        assert_eq!(client.backend().point_count("c"), Some(1));
    }

    #[tokio::test]
    async fn test_create_field_index_on_active_collection() {
        let mut client = client();
        assert_ok!(client.create_collection("c", None, None, true).await);
        assert_ok!(client.create_field_index("city", FieldType::Keyword).await);
        assert_eq!(client.backend().field_index("c", "city"), Some(FieldType::Keyword));
    }

    #[tokio::test]
    async fn test_log_lines_only_when_enabled() {
        let (mut quiet, quiet_lines) = capturing_client(false);
        assert_ok!(quiet.create_collection("c", None, None, true).await);
        assert!(quiet_lines.lock().unwrap().is_empty());

        let (mut loud, loud_lines) = capturing_client(true);
        assert_ok!(loud.create_collection("c", None, None, true).await);
        assert_ok!(loud.upsert(&points(2), None).await);
        let lines = loud_lines.lock().unwrap();
        assert_eq!(lines[0], "QdrantWrapper: Collection c created successfully");
        assert!(lines[1].contains("status=Completed"));
        assert_eq!(lines[2], "QdrantWrapper: Upserted 2 points successfully");
    }

    /// Upsert backend that accepts the first `ok_chunks` chunks and then fails
    /// every attempt transiently.
    struct ScriptedUpserts {
        ok_chunks: usize,
        attempts: Mutex<Vec<usize>>,
        inner: MemoryBackend,
    }

    impl ScriptedUpserts {
        fn failing_from(ok_chunks: usize) -> Self {
            Self {
                ok_chunks,
                attempts: Mutex::new(Vec::new()),
                inner: MemoryBackend::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl VectorBackend for ScriptedUpserts {
        async fn create_collection(&self, name: &str, distance: Distance, vector_size: u64) -> crate::backend::BackendResult<()> {
            self.inner.create_collection(name, distance, vector_size).await
        }

        async fn delete_collection(&self, name: &str) -> crate::backend::BackendResult<()> {
            self.inner.delete_collection(name).await
        }

        async fn upsert(&self, _collection: &str, points: &[Point], _wait: bool) -> crate::backend::BackendResult<UpdateResult> {
            // Chunk index from the first id: ids are 1-based, chunks hold 3 points.
            let chunk = match points.first().map(|p| &p.id) {
                Some(PointId::Num(n)) => ((*n - 1) / 3) as usize,
                _ => 0,
            };
            self.attempts.lock().unwrap().push(chunk);
            if chunk >= self.ok_chunks {
                return Err(BackendError::Transient("deadline exceeded".to_string()));
            }
            Ok(UpdateResult {
                operation_id: Some(chunk as u64),
                status: UpdateStatus::Completed,
            })
        }

        async fn query(&self, collection: &str, request: &SearchRequest) -> crate::backend::BackendResult<Vec<ScoredPoint>> {
            self.inner.query(collection, request).await
        }

        async fn scroll(&self, collection: &str, request: &ScrollRequest) -> crate::backend::BackendResult<crate::backend::ScrollPage> {
            self.inner.scroll(collection, request).await
        }

        async fn delete_points(
            &self,
            collection: &str,
            selector: &PointsSelector,
            wait: bool,
        ) -> crate::backend::BackendResult<UpdateResult> {
            self.inner.delete_points(collection, selector, wait).await
        }

        async fn create_field_index(
            &self,
            collection: &str,
            field_name: &str,
            field_type: FieldType,
            wait: bool,
        ) -> crate::backend::BackendResult<()> {
            self.inner.create_field_index(collection, field_name, field_type, wait).await
        }
    }
}
