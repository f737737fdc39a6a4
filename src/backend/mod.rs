//! Seam between the collection facade and the vector database.
//!
//! [`QdrantBackend`] talks to a Qdrant server over gRPC; [`MemoryBackend`]
//! keeps everything in-process and can be scripted to fail.

use async_trait::async_trait;

use crate::metadata_filter::Filter;
use crate::model::*;

pub mod memory;
pub mod qdrant;

pub use memory::MemoryBackend;
pub use qdrant::QdrantBackend;

/// gRPC status codes the backends classify on.
pub mod code {
    pub const CANCELLED: i32 = 1;
    pub const UNKNOWN: i32 = 2;
    pub const INVALID_ARGUMENT: i32 = 3;
    pub const DEADLINE_EXCEEDED: i32 = 4;
    pub const NOT_FOUND: i32 = 5;
    pub const ALREADY_EXISTS: i32 = 6;
    pub const RESOURCE_EXHAUSTED: i32 = 8;
    pub const ABORTED: i32 = 10;
    pub const INTERNAL: i32 = 13;
    pub const UNAVAILABLE: i32 = 14;

    /// Codes that indicate a communication failure rather than a rejected request.
    pub fn is_transient(code: i32) -> bool {
        matches!(
            code,
            CANCELLED | DEADLINE_EXCEEDED | RESOURCE_EXHAUSTED | ABORTED | UNAVAILABLE
        )
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// Timeouts, dropped connections, overloaded server.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("collection {0} already exists")]
    AlreadyExists(String),

    /// The service answered, but with an error status.
    #[error("unexpected response (code {code}): {message}")]
    UnexpectedResponse { code: i32, message: String },

    /// Failure inside the client library before anything reached the service.
    #[error("client error: {0}")]
    Client(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub vector: QueryVector,
    pub limit: u64,
    pub filter: Option<Filter>,
    pub with_vectors: bool,
    pub score_threshold: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrollRequest {
    pub filter: Option<Filter>,
    pub limit: u32,
    pub with_vectors: bool,
    pub offset: Option<PointId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScrollPage {
    pub records: Vec<Record>,
    pub next_page_offset: Option<PointId>,
}

#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn create_collection(&self, name: &str, distance: Distance, vector_size: u64) -> BackendResult<()>;

    async fn delete_collection(&self, name: &str) -> BackendResult<()>;

    /// Insert or overwrite points. With `wait`, returns once the write is applied.
    async fn upsert(&self, collection: &str, points: &[Point], wait: bool) -> BackendResult<UpdateResult>;

    /// Nearest-neighbour query, best match first.
    async fn query(&self, collection: &str, request: &SearchRequest) -> BackendResult<Vec<ScoredPoint>>;

    async fn scroll(&self, collection: &str, request: &ScrollRequest) -> BackendResult<ScrollPage>;

    async fn delete_points(
        &self,
        collection: &str,
        selector: &PointsSelector,
        wait: bool,
    ) -> BackendResult<UpdateResult>;

    async fn create_field_index(
        &self,
        collection: &str,
        field_name: &str,
        field_type: FieldType,
        wait: bool,
    ) -> BackendResult<()>;
}
