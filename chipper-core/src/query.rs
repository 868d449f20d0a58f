//! Query orchestration for the retrieval-augmented pipeline.
//!
//! [`RagQueryPipeline`] owns everything a query needs: the shared config, the
//! component factory, the optional model manager and conversation logger. It
//! builds the [`PipelineGraph`] lazily on the first query and keeps it for
//! subsequent ones.
//!
//! # Query Flow
//!
//! ```text
//! question ─▶ embedder ─▶ retriever ─▶ prompt_builder ─▶ llm ─▶ first reply
//!                                                              │
//!                                                    conversation log
//! ```
//!
//! # Error Policy
//!
//! - Validation failures are logged as warnings and the query answers `None`
//! - Errors from the document store are logged and returned
//! - Any other failure is logged and returned
//!
//! Nothing is written to the conversation log unless the query succeeded.

use crate::config::{Config, ConfigError, ModelProvider};
use crate::conversation::{ConversationLogger, ConversationSink};
use crate::factory::{ComponentFactory, PipelineComponentFactory};
use crate::ollama::{ModelManagerError, OllamaModelManager};
use crate::pipeline::{PipelineError, PipelineGraph, PipelineInputs, PromptBuilder, StreamingCallback};
use crate::provider::Message;
use crate::rag::{DocumentStoreManager, StoreError};
use crate::readiness::{check_models, EventStream, ModelManager, ReadinessError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Errors raised while constructing a [`RagQueryPipeline`].
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to initialize document store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to initialize model manager: {0}")]
    ModelManager(#[from] ModelManagerError),

    #[error("Failed to initialize conversation logger: {0}")]
    ConversationLog(#[from] std::io::Error),
}

/// Answers questions against an Elasticsearch index using an LLM.
///
/// # Examples
///
/// ```no_run
/// use chipper_core::{Config, RagQueryPipeline};
/// use futures::StreamExt;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load("config.yaml")?;
/// let mut pipeline = RagQueryPipeline::new(config)?;
///
/// let mut events = pipeline.initialize_and_check_models()?;
/// while let Some(event) = events.next().await {
///     println!("{:?}", event?);
/// }
/// drop(events);
///
/// if let Some(answer) = pipeline.run_query("What is Chipper?", &[], false).await? {
///     println!("{}", answer);
/// }
/// # Ok(())
/// # }
/// ```
pub struct RagQueryPipeline {
    config: Arc<Config>,
    factory: Arc<dyn ComponentFactory>,
    model_manager: Option<Arc<dyn ModelManager>>,
    conversation_logger: Option<Arc<dyn ConversationSink>>,
    query_pipeline: Option<PipelineGraph>,
    span: Span,
}

impl RagQueryPipeline {
    /// Creates a pipeline with the default collaborators for `config`.
    ///
    /// Nothing is sent over the network here; backends are contacted by
    /// [`initialize_and_check_models`](Self::initialize_and_check_models)
    /// and [`run_query`](Self::run_query).
    pub fn new(config: Config) -> Result<Self, InitError> {
        Self::with_streaming_callback(config, None)
    }

    /// Like [`new`](Self::new), forwarding generated chunks to `streaming_callback`.
    pub fn with_streaming_callback(
        config: Config,
        streaming_callback: Option<StreamingCallback>,
    ) -> Result<Self, InitError> {
        config.validate()?;
        let config = Arc::new(config);

        let conversation_logger: Option<Arc<dyn ConversationSink>> = if config.enable_conversation_logs {
            Some(Arc::new(ConversationLogger::from_config(&config)?))
        } else {
            None
        };

        let store = DocumentStoreManager::new(&config.storage).initialize_store()?;

        let model_manager: Option<Arc<dyn ModelManager>> = match config.provider {
            ModelProvider::Ollama => Some(Arc::new(OllamaModelManager::new(
                config.llm.ollama_url.clone(),
                config.allow_model_pull,
            )?)),
            ModelProvider::HuggingFace => None,
        };

        let factory = Arc::new(PipelineComponentFactory::new(Arc::clone(&config), store, streaming_callback));

        Ok(Self::from_parts(config, factory, model_manager, conversation_logger))
    }

    /// Assembles a pipeline from explicit collaborators.
    pub fn from_parts(
        config: Arc<Config>,
        factory: Arc<dyn ComponentFactory>,
        model_manager: Option<Arc<dyn ModelManager>>,
        conversation_logger: Option<Arc<dyn ConversationSink>>,
    ) -> Self {
        let span = info_span!(
            "rag_query_pipeline",
            provider = %config.provider,
            index = %config.storage.index
        );
        Self {
            config,
            factory,
            model_manager,
            conversation_logger,
            query_pipeline: None,
            span,
        }
    }

    /// Replaces the span all of this pipeline's log records are emitted in.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The currently built graph, if any.
    pub fn query_pipeline(&self) -> Option<&PipelineGraph> {
        self.query_pipeline.as_ref()
    }

    /// Verifies that the required models are available, pulling them if allowed.
    ///
    /// Events are produced lazily as the stream is polled. On failure a final
    /// error event is yielded before the error itself.
    pub fn initialize_and_check_models(&self) -> Result<EventStream<'_, ReadinessError>, ReadinessError> {
        let _enter = self.span.enter();
        check_models(&self.config, self.model_manager.as_deref(), self.span.clone()).map_err(|e| {
            error!(error = %e, "Model initialization failed");
            e
        })
    }

    /// Builds the four-node graph and makes it the active one.
    ///
    /// Calling this again replaces the previous graph.
    pub fn create_query_pipeline(&mut self) -> Result<&PipelineGraph, PipelineError> {
        let span = self.span.clone();
        let _enter = span.enter();

        match self.build_graph() {
            Ok(graph) => {
                debug!(nodes = graph.nodes().len(), edges = graph.edges().len(), "Query pipeline created");
                let graph: &PipelineGraph = self.query_pipeline.insert(graph);
                Ok(graph)
            }
            Err(e) => {
                error!(error = %e, "Pipeline creation failed");
                Err(e)
            }
        }
    }

    fn build_graph(&self) -> Result<PipelineGraph, PipelineError> {
        let embedder = self.factory.create_embedder()?;
        let retriever = self.factory.create_retriever()?;
        let generator = self.factory.create_chat_generator()?;
        Ok(PipelineGraph::new(embedder, retriever, PromptBuilder::new(), generator))
    }

    /// Answers `query`, using `conversation` as prior history.
    ///
    /// Returns the text of the first generated reply, or `None` when the
    /// model produced no reply or a component reported a validation error.
    pub async fn run_query(
        &mut self,
        query: &str,
        conversation: &[Message],
        print_response: bool,
    ) -> Result<Option<String>, PipelineError> {
        if self.query_pipeline.is_none() {
            self.create_query_pipeline()?;
        }

        let span = self.span.clone();
        self.execute(query, conversation, print_response).instrument(span).await
    }

    async fn execute(
        &self,
        query: &str,
        conversation: &[Message],
        print_response: bool,
    ) -> Result<Option<String>, PipelineError> {
        let graph = self
            .query_pipeline
            .as_ref()
            .ok_or_else(|| PipelineError::Build("query pipeline was not created".to_string()))?;

        let result = if query.trim().is_empty() {
            Err(PipelineError::Validation("question must not be empty".to_string()))
        } else {
            let inputs = PipelineInputs {
                question: query,
                conversation,
                system_prompt: &self.config.system_prompt,
            };
            graph.run(&inputs).await
        };

        match result {
            Ok(response) => {
                let response_text = response.first_reply().map(str::to_string);

                if print_response {
                    if let Some(text) = &response_text {
                        info!("Query: {}", query);
                        info!("Response: {}", text);
                    }
                }

                if let Some(logger) = &self.conversation_logger {
                    logger.log_conversation(query, &response, conversation).await;
                }

                Ok(response_text)
            }
            Err(PipelineError::Validation(message)) => {
                warn!("Validation error: {}", message);
                Ok(None)
            }
            Err(e @ PipelineError::BadRequest(_)) => {
                error!("Elasticsearch error: {}", e);
                Err(e)
            }
            Err(e) => {
                error!("Query execution failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_builds_ollama_collaborators_offline() {
        let pipeline = RagQueryPipeline::new(Config::default()).unwrap();
        assert!(pipeline.model_manager.is_some());
        assert!(pipeline.conversation_logger.is_none());
        assert!(pipeline.query_pipeline().is_none());
    }

    #[test]
    fn test_new_skips_model_manager_for_huggingface() {
        let config = Config {
            provider: ModelProvider::HuggingFace,
            ..Config::default()
        };
        let pipeline = RagQueryPipeline::new(config).unwrap();
        assert!(pipeline.model_manager.is_none());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = Config::default();
        config.storage.top_k = 0;
        assert!(matches!(RagQueryPipeline::new(config), Err(InitError::Config(_))));
    }

    #[test]
    fn test_new_creates_conversation_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("conversations");
        let config = Config {
            enable_conversation_logs: true,
            conversation_log_dir: log_dir.to_string_lossy().to_string(),
            ..Config::default()
        };

        let pipeline = RagQueryPipeline::new(config).unwrap();
        assert!(pipeline.conversation_logger.is_some());
        assert!(log_dir.is_dir());
    }

    #[test]
    fn test_create_query_pipeline_wires_four_nodes() {
        let mut pipeline = RagQueryPipeline::new(Config::default()).unwrap();
        let graph = pipeline.create_query_pipeline().unwrap();
        assert_eq!(graph.nodes().len(), 4);
        assert_eq!(graph.edges().len(), 3);
    }
}
