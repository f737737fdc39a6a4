//! Qdrant Wrapper
//!
//! A thin stateful facade over the Qdrant client: collection lifecycle, point
//! upsert (single and batched), similarity search, filtered scroll and
//! deletion, with an "active collection" fallback and single-retry handling
//! for batched upsert and search.

pub mod backend;
pub mod client;
pub mod config;
pub mod logging;
pub mod metadata_filter;
pub mod model;

pub use backend::{BackendError, MemoryBackend, QdrantBackend, VectorBackend};
pub use client::{CollectionClient, ScrollOptions, SearchOptions};
pub use config::ClientConfig;
pub use errors::{Error, Result};
pub use logging::LogSink;
pub use metadata_filter::{AnyValues, Condition, Filter, MatchValue, Range};
pub use model::*;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    pub const DEFAULT_VECTOR_SIZE: u64 = 1536;
    pub const DEFAULT_BATCH_SIZE: usize = 50;
    pub const DEFAULT_TOP_K: u64 = 10;
    pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.0;
    pub const DEFAULT_PORT: u16 = 6334;
}

/// Error types for the client
pub mod errors {
    use crate::backend::BackendError;

    pub type Result<T> = std::result::Result<T, Error>;

    #[derive(Debug, Clone, PartialEq, thiserror::Error)]
    pub enum Error {
        #[error("Either port or api_key should be provided")]
        ConnectionConfig,

        #[error("Collection name not provided")]
        CollectionNameRequired,

        #[error("Collection {0} already exists in the DB")]
        CollectionAlreadyExists(String),

        #[error("Batch size must be at least 1")]
        InvalidBatchSize,

        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Invalid filter: {0}")]
        InvalidFilter(String),

        /// Communication failure (timeout, unavailable, dropped connection).
        #[error("Transient service failure: {0}")]
        Transient(String),

        #[error("Unexpected response (code {code}): {message}")]
        UnexpectedResponse { code: i32, message: String },

        #[error("Client error: {0}")]
        Client(String),
    }

    impl Error {
        pub fn is_transient(&self) -> bool {
            matches!(self, Error::Transient(_))
        }
    }

    impl From<BackendError> for Error {
        fn from(err: BackendError) -> Self {
            match err {
                BackendError::Transient(msg) => Error::Transient(msg),
                BackendError::AlreadyExists(name) => Error::CollectionAlreadyExists(name),
                BackendError::UnexpectedResponse { code, message } => Error::UnexpectedResponse { code, message },
                BackendError::Client(msg) => Error::Client(msg),
            }
        }
    }
}
