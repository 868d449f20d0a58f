//! Builds the provider-specific pipeline components.

use crate::config::{Config, ModelProvider};
use crate::pipeline::{
    ChatGenerator, DocumentRetriever, PipelineError, ProviderChatGenerator, Result, StreamingCallback,
    TextEmbedder,
};
use crate::provider::{HuggingFaceProvider, OllamaProvider, Provider};
use crate::rag::{Embedder, Retriever, SearchParams, VectorStore};
use std::sync::Arc;

/// Creates the embedder, retriever and generator nodes of a query graph.
pub trait ComponentFactory: Send + Sync {
    fn create_embedder(&self) -> Result<Arc<dyn TextEmbedder>>;
    fn create_retriever(&self) -> Result<Arc<dyn DocumentRetriever>>;
    fn create_chat_generator(&self) -> Result<Arc<dyn ChatGenerator>>;
}

/// Default factory: picks the backend from [`Config::provider`].
pub struct PipelineComponentFactory {
    config: Arc<Config>,
    store: Arc<dyn VectorStore>,
    streaming_callback: Option<StreamingCallback>,
}

impl PipelineComponentFactory {
    pub fn new(config: Arc<Config>, store: Arc<dyn VectorStore>, streaming_callback: Option<StreamingCallback>) -> Self {
        Self {
            config,
            store,
            streaming_callback,
        }
    }

    fn provider(&self) -> Result<Arc<dyn Provider>> {
        let provider: std::result::Result<Arc<dyn Provider>, _> = match self.config.provider {
            ModelProvider::Ollama => OllamaProvider::new(&self.config).map(|p| Arc::new(p) as Arc<dyn Provider>),
            ModelProvider::HuggingFace => {
                HuggingFaceProvider::new(&self.config).map(|p| Arc::new(p) as Arc<dyn Provider>)
            }
        };
        provider.map_err(|e| PipelineError::Build(format!("{} provider: {}", self.config.provider, e)))
    }
}

impl ComponentFactory for PipelineComponentFactory {
    fn create_embedder(&self) -> Result<Arc<dyn TextEmbedder>> {
        Ok(Arc::new(Embedder::new(self.provider()?, self.config.embedding.model.clone())))
    }

    fn create_retriever(&self) -> Result<Arc<dyn DocumentRetriever>> {
        let params = SearchParams {
            top_k: self.config.storage.top_k,
            num_candidates: self.config.storage.num_candidates,
        };
        Ok(Arc::new(Retriever::new(Arc::clone(&self.store), params)))
    }

    fn create_chat_generator(&self) -> Result<Arc<dyn ChatGenerator>> {
        let generator = ProviderChatGenerator::new(
            self.provider()?,
            self.config.llm.model.clone(),
            self.config.llm.generation.clone(),
        )
        .with_streaming_callback(self.streaming_callback.clone());
        Ok(Arc::new(generator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;
    use crate::rag::{Document, DocumentStoreManager, StoreError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingStore {
        seen: Mutex<Option<SearchParams>>,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn search(
            &self,
            _query_embedding: &[f32],
            params: &SearchParams,
        ) -> std::result::Result<Vec<Document>, StoreError> {
            *self.seen.lock().unwrap() = Some(*params);
            Ok(vec![])
        }
    }

    fn ollama_config(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.llm.ollama_url = server.uri();
        config.llm.model = "custom-llm".to_string();
        config.embedding.model = "custom-embed".to_string();
        config.storage.top_k = 7;
        config.storage.num_candidates = 70;
        config
    }

    fn factory(provider: ModelProvider) -> PipelineComponentFactory {
        let config = Config {
            provider,
            ..Config::default()
        };
        let store = DocumentStoreManager::new(&config.storage).initialize_store().unwrap();
        PipelineComponentFactory::new(Arc::new(config), store, None)
    }

    #[test]
    fn test_creates_components_for_each_provider() {
        for provider in [ModelProvider::Ollama, ModelProvider::HuggingFace] {
            let factory = factory(provider);
            assert!(factory.create_embedder().is_ok());
            assert!(factory.create_retriever().is_ok());
            assert!(factory.create_chat_generator().is_ok());
        }
    }

    #[tokio::test]
    async fn test_retriever_uses_storage_search_params() {
        let server = MockServer::start().await;
        let store = Arc::new(RecordingStore::default());
        let factory = PipelineComponentFactory::new(Arc::new(ollama_config(&server)), store.clone(), None);

        factory.create_retriever().unwrap().retrieve(&[0.0]).await.unwrap();

        assert_eq!(
            *store.seen.lock().unwrap(),
            Some(SearchParams {
                top_k: 7,
                num_candidates: 70,
            })
        );
    }

    #[tokio::test]
    async fn test_embedder_and_generator_use_configured_models() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(serde_json::json!({"model": "custom-embed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"model": "custom-embed", "embeddings": [[0.5, 0.5]]})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({"model": "custom-llm"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "{\"model\":\"custom-llm\",\"message\":{\"role\":\"assistant\",\"content\":\"hi\"},\"done\":true}\n",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let factory = PipelineComponentFactory::new(
            Arc::new(ollama_config(&server)),
            Arc::new(RecordingStore::default()),
            None,
        );

        let embedding = factory.create_embedder().unwrap().embed("question").await.unwrap();
        assert_eq!(embedding, vec![0.5, 0.5]);

        let replies = factory
            .create_chat_generator()
            .unwrap()
            .generate(&[Message::system("prompt")])
            .await
            .unwrap();
        assert_eq!(replies, vec![Message::assistant("hi")]);
    }
}
