use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A document returned by the retriever.
///
/// Documents are ranked by `score`, most relevant first. `meta` carries the
/// indexed metadata, including at least `file_path` for documents produced by
/// the ingestion side.
///
/// # Example
///
/// ```
/// use chipper_core::rag::Document;
///
/// let doc = Document::new("doc_1", "Hello world")
///     .with_meta("file_path", "docs/hello.md")
///     .with_score(0.92);
/// assert_eq!(doc.file_path(), Some("docs/hello.md"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            meta: HashMap::new(),
            score: None,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// Source path recorded at ingestion time.
    pub fn file_path(&self) -> Option<&str> {
        self.meta.get("file_path").map(|s| s.as_str())
    }
}
