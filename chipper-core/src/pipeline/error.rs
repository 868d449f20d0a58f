use crate::provider::ProviderError;
use crate::rag::{EmbedderError, StoreError};
use thiserror::Error;

/// Failures raised while building or running the query pipeline.
///
/// The engine recovers from [`PipelineError::Validation`] by answering with
/// no result; every other variant is propagated to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A component rejected its input or output shape.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The document store rejected the search request.
    #[error("Document store rejected the request: {0}")]
    BadRequest(String),

    #[error("Embedding failed: {0}")]
    Embedder(#[from] EmbedderError),

    #[error("Retrieval failed: {0}")]
    Retrieval(StoreError),

    #[error("Generation failed: {0}")]
    Generator(ProviderError),

    /// A component could not be constructed.
    #[error("Failed to build query pipeline: {0}")]
    Build(String),

    #[error(transparent)]
    Component(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BadRequest(message) => PipelineError::BadRequest(message),
            other => PipelineError::Retrieval(other),
        }
    }
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Validation(message) => PipelineError::Validation(message),
            other => PipelineError::Generator(other),
        }
    }
}
