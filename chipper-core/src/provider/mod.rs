//! LLM provider abstraction layer.
//!
//! This module defines a common interface for the model backends
//! (Ollama, HuggingFace) to provide chat completions and embeddings.

mod types;
pub mod huggingface;
pub mod ollama;

// Re-export common types
pub use types::{
    Provider,
    ProviderError,
    Result,
    ChatRequest,
    ChatResponse,
    Message,
    EmbedRequest,
    EmbedResponse,
};

// Re-export provider implementations
pub use huggingface::HuggingFaceProvider;
pub use ollama::OllamaProvider;
