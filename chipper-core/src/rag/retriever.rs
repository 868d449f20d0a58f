//! Retriever node: turns a query embedding into ranked documents.

use super::store::{SearchParams, VectorStore};
use super::types::Document;
use crate::pipeline::{DocumentRetriever, PipelineError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Retrieves documents from a [`VectorStore`] with fixed search parameters.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    params: SearchParams,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, params: SearchParams) -> Self {
        Self { store, params }
    }
}

#[async_trait]
impl DocumentRetriever for Retriever {
    async fn retrieve(&self, query_embedding: &[f32]) -> Result<Vec<Document>, PipelineError> {
        let mut documents = self.store.search(query_embedding, &self.params).await?;
        documents.truncate(self.params.top_k);

        debug!(count = documents.len(), top_k = self.params.top_k, "Retrieved documents");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::store::{Result as StoreResult, StoreError};
    use std::sync::Mutex;

    struct RecordingStore {
        hits: usize,
        seen: Mutex<Option<SearchParams>>,
        reject: bool,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn search(&self, _query: &[f32], params: &SearchParams) -> StoreResult<Vec<Document>> {
            *self.seen.lock().unwrap() = Some(*params);
            if self.reject {
                return Err(StoreError::BadRequest("malformed knn".to_string()));
            }
            Ok((0..self.hits)
                .map(|i| Document::new(format!("doc{}", i), format!("content {}", i)))
                .collect())
        }
    }

    fn store(hits: usize, reject: bool) -> Arc<RecordingStore> {
        Arc::new(RecordingStore {
            hits,
            seen: Mutex::new(None),
            reject,
        })
    }

    #[tokio::test]
    async fn test_passes_params_and_bounds_results() {
        let backend = store(5, false);
        let params = SearchParams {
            top_k: 3,
            num_candidates: 30,
        };
        let retriever = Retriever::new(backend.clone(), params);

        let docs = retriever.retrieve(&[0.0]).await.unwrap();

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].id, "doc0");
        assert_eq!(*backend.seen.lock().unwrap(), Some(params));
    }

    #[tokio::test]
    async fn test_bad_request_maps_to_pipeline_bad_request() {
        let retriever = Retriever::new(
            store(0, true),
            SearchParams {
                top_k: 3,
                num_candidates: 30,
            },
        );
        let err = retriever.retrieve(&[0.0]).await.unwrap_err();
        assert!(matches!(err, PipelineError::BadRequest(_)));
    }
}
