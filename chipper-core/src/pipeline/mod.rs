//! The retrieval-augmented query pipeline.
//!
//! A query flows through a fixed four-node graph:
//!
//! ```text
//! embedder ──embedding──▶ retriever ──documents──▶ prompt_builder ──prompt──▶ llm
//! ```
//!
//! Each node is a trait object so the backing services (provider, vector
//! store) can be swapped without touching the wiring.

mod error;
mod generator;
mod graph;
mod prompt;
mod stage;

pub use error::{PipelineError, Result};
pub use generator::{ProviderChatGenerator, StreamingCallback};
pub use graph::{Edge, NodeKind, PipelineGraph, PipelineInputs, PipelineResponse};
pub use prompt::{PromptBuilder, PROMPT_TEMPLATE_VERSION};
pub use stage::{ChatGenerator, DocumentRetriever, TextEmbedder};
