//! Embedding generation using LLM providers.
//!
//! This module provides the embedder node of the query pipeline: it converts
//! the question into a vector embedding using the provider's embedding model.

use crate::pipeline::{PipelineError, TextEmbedder};
use crate::provider::{Provider, ProviderError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during embedding generation.
#[derive(Debug, Error)]
pub enum EmbedderError {
    /// The provider API returned an error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The API response contained no embeddings.
    ///
    /// This typically indicates a problem with the model or request format.
    #[error("No embeddings returned")]
    NoEmbeddings,
}

/// Generates vector embeddings for text using provider embedding models.
///
/// # Supported Models
///
/// Common embedding models:
/// - `nomic-embed-text` - 768-dimensional embeddings, good general purpose
/// - `snowflake-arctic-embed2` - 1024-dimensional, multilingual
///
/// The model must match the one the index was built with, otherwise
/// Elasticsearch rejects the query vector.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl Embedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextEmbedder for Embedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let embedding = self
            .provider
            .embed(text, &self.model)
            .await
            .map_err(EmbedderError::Provider)?;

        if embedding.is_empty() {
            return Err(EmbedderError::NoEmbeddings.into());
        }
        Ok(embedding)
    }
}
