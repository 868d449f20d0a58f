//! Vector store abstraction.
//!
//! The query pipeline only ever sees an `Arc<dyn VectorStore>`: the handle is
//! opened by [`DocumentStoreManager`](super::DocumentStoreManager) and passed
//! opaquely to the component factory.

use super::types::Document;
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend rejected the query itself as malformed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Store error ({status}): {message}")]
    Api { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Retrieval parameters for a similarity search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    /// Maximum number of documents to return
    pub top_k: usize,
    /// Size of the approximate-search candidate pool
    pub num_candidates: usize,
}

/// Read-side interface of a vector database.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Searches for the documents most similar to `query_embedding`.
    ///
    /// # Returns
    ///
    /// At most `params.top_k` documents, sorted by descending similarity score.
    async fn search(&self, query_embedding: &[f32], params: &SearchParams) -> Result<Vec<Document>>;
}
