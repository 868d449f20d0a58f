//! Elasticsearch vector store.
//!
//! Runs approximate kNN queries against a dense-vector field of an index
//! populated by the ingestion side. Documents are expected to carry `content`
//! and the embedding field; metadata may be stored either flattened at the top
//! level of `_source` or nested under `meta`.

use super::store::{Result, SearchParams, StoreError, VectorStore};
use super::types::Document;
use crate::config::StorageConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens handles to the document store.
#[derive(Debug, Clone)]
pub struct DocumentStoreManager {
    config: StorageConfig,
}

impl DocumentStoreManager {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Creates the store handle. No request is sent until the first search.
    pub fn initialize_store(&self) -> Result<Arc<dyn VectorStore>> {
        let store = ElasticsearchStore::new(&self.config)?;
        debug!(url = %self.config.url, index = %self.config.index, "Document store initialized");
        Ok(Arc::new(store))
    }
}

/// Elasticsearch-backed [`VectorStore`].
#[derive(Debug, Clone)]
pub struct ElasticsearchStore {
    base_url: String,
    index: String,
    embedding_field: String,
    credentials: Option<(String, Option<String>)>,
    http_client: reqwest::Client,
}

impl ElasticsearchStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let credentials = config
            .username
            .clone()
            .map(|user| (user, config.password.clone()));

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            embedding_field: config.embedding_field.clone(),
            credentials,
            http_client,
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_deref()),
            None => builder,
        }
    }

    fn search_body(&self, query_embedding: &[f32], params: &SearchParams) -> Value {
        json!({
            "knn": {
                "field": self.embedding_field,
                "query_vector": query_embedding,
                "k": params.top_k,
                "num_candidates": params.num_candidates,
            },
            "size": params.top_k,
            "_source": { "excludes": [self.embedding_field] },
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await?;
        if status == reqwest::StatusCode::BAD_REQUEST {
            Err(StoreError::BadRequest(message))
        } else {
            Err(StoreError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Converts one search hit into a [`Document`].
    fn hit_to_document(&self, hit: SearchHit) -> Document {
        let mut source = hit.source;
        let content = match source.remove("content") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let id = match source.remove("id") {
            Some(Value::String(s)) => s,
            _ => hit.id,
        };
        source.remove(&self.embedding_field);

        let mut meta = HashMap::new();
        if let Some(Value::Object(nested)) = source.remove("meta") {
            collect_meta(&mut meta, nested);
        }
        collect_meta(&mut meta, source);

        Document {
            id,
            content,
            meta,
            score: hit.score,
        }
    }
}

fn collect_meta(meta: &mut HashMap<String, String>, fields: Map<String, Value>) {
    for (key, value) in fields {
        let value = match value {
            Value::String(s) => s,
            Value::Null => continue,
            other => other.to_string(),
        };
        meta.entry(key).or_insert(value);
    }
}

#[async_trait]
impl VectorStore for ElasticsearchStore {
    async fn search(&self, query_embedding: &[f32], params: &SearchParams) -> Result<Vec<Document>> {
        let url = format!("{}/{}/_search", self.base_url, self.index);
        let body = self.search_body(query_embedding, params);

        let response = self
            .authorized(self.http_client.post(&url))
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let results = response.json::<SearchResponse>().await?;
        let documents: Vec<Document> = results
            .hits
            .hits
            .into_iter()
            .take(params.top_k)
            .map(|hit| self.hit_to_document(hit))
            .collect();

        debug!(index = %self.index, count = documents.len(), "kNN search finished");
        Ok(documents)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f32>,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}
