use super::Result;
use crate::provider::Message;
use crate::rag::Document;
use async_trait::async_trait;

/// Turns the question text into a query vector.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Finds the documents nearest to a query vector, best match first.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn retrieve(&self, query_embedding: &[f32]) -> Result<Vec<Document>>;
}

/// Produces candidate replies for a prompt.
///
/// An empty result means the model produced no candidate.
#[async_trait]
pub trait ChatGenerator: Send + Sync {
    async fn generate(&self, messages: &[Message]) -> Result<Vec<Message>>;
}
