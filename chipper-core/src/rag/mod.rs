//! Retrieval side of the query pipeline.
//!
//! # Architecture
//!
//! - [`DocumentStoreManager`]: opens the Elasticsearch index
//! - [`Embedder`]: converts the question to a vector embedding via the provider
//! - [`Retriever`]: runs a kNN search and returns the top-k documents
//!
//! Indexing is done by a separate ingestion service; this crate only reads.

mod elasticsearch;
mod embedder;
mod retriever;
mod store;
mod types;

pub use elasticsearch::{DocumentStoreManager, ElasticsearchStore};
pub use embedder::{Embedder, EmbedderError};
pub use retriever::Retriever;
pub use store::{SearchParams, StoreError, VectorStore};
pub use types::Document;
