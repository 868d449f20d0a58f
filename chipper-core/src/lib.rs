//! chipper-core - Retrieval-augmented query engine
//!
//! Answers natural-language questions against an Elasticsearch index:
//! - Model readiness checks with on-demand Ollama pulls
//! - LLM provider abstraction (Ollama, HuggingFace)
//! - kNN retrieval and prompt assembly
//! - Conversation logging
//!
//! ## Primary API
//!
//! Users should interact with chipper via [`RagQueryPipeline`].

pub mod config;
pub mod conversation;
pub mod factory;
pub mod ollama;
pub mod pipeline;
pub mod provider;
pub mod query;
pub mod rag;
pub mod readiness;

// Public exports
pub use config::{Config, ConfigError, ModelProvider};
pub use conversation::{ConversationLogger, ConversationSink, SystemInfo};
pub use factory::{ComponentFactory, PipelineComponentFactory};
pub use ollama::{ModelManagerError, OllamaModelManager};
pub use pipeline::{PipelineError, PipelineGraph, PipelineResponse, StreamingCallback};
pub use query::{InitError, RagQueryPipeline};
pub use rag::{Document, DocumentStoreManager};
pub use readiness::{check_models, EventKind, EventStatus, EventStream, ModelManager, ReadinessError, ReadinessEvent};

// Provider exports
pub use provider::{ChatRequest, ChatResponse, Message, Provider, ProviderError};
