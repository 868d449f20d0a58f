//! Conversation recording.
//!
//! Each [`ConversationLogger`] owns one session file under the configured
//! directory and appends a JSON line per answered question.

use crate::config::{Config, GenerationOptions, ModelProvider};
use crate::pipeline::{PipelineResponse, PROMPT_TEMPLATE_VERSION};
use crate::provider::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ConversationLogError {
    #[error("Conversation log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize conversation entry: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receives every successfully answered query.
///
/// Implementations must not fail the query: errors are theirs to handle.
#[async_trait]
pub trait ConversationSink: Send + Sync {
    async fn log_conversation(&self, question: &str, response: &PipelineResponse, conversation: &[Message]);
}

/// Static description of the pipeline attached to every log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub provider: ModelProvider,
    pub model: String,
    pub embedding_model: String,
    pub elasticsearch: SearchInfo,
    pub model_params: GenerationOptions,
    /// Layout version of the rendered prompt stored in each entry.
    pub prompt_template_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchInfo {
    pub index: String,
    pub top_k: usize,
    pub num_candidates: usize,
}

impl SystemInfo {
    pub fn from_config(config: &Config) -> Self {
        Self {
            provider: config.provider,
            model: config.llm.model.clone(),
            embedding_model: config.embedding.model.clone(),
            elasticsearch: SearchInfo {
                index: config.storage.index.clone(),
                top_k: config.storage.top_k,
                num_candidates: config.storage.num_candidates,
            },
            model_params: config.llm.generation.clone(),
            prompt_template_version: PROMPT_TEMPLATE_VERSION.to_string(),
        }
    }
}

/// One line of a session file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub response: PipelineResponse,
    pub conversation: Vec<Message>,
    pub system_info: SystemInfo,
}

/// Appends conversation entries to a JSONL session file.
#[derive(Debug, Clone)]
pub struct ConversationLogger {
    session_path: PathBuf,
    system_info: SystemInfo,
}

impl ConversationLogger {
    /// Creates the log directory and picks a session file name.
    pub fn new(log_dir: impl AsRef<Path>, system_info: SystemInfo) -> std::io::Result<Self> {
        let log_dir = log_dir.as_ref();
        std::fs::create_dir_all(log_dir)?;

        let session_id = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let session_path = log_dir.join(format!("conversation_{}.jsonl", session_id));
        debug!(path = %session_path.display(), "Conversation log session started");

        Ok(Self {
            session_path,
            system_info,
        })
    }

    pub fn from_config(config: &Config) -> std::io::Result<Self> {
        Self::new(&config.conversation_log_dir, SystemInfo::from_config(config))
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    async fn append(&self, entry: &ConversationEntry) -> Result<(), ConversationLogError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.session_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationSink for ConversationLogger {
    async fn log_conversation(&self, question: &str, response: &PipelineResponse, conversation: &[Message]) {
        let entry = ConversationEntry {
            timestamp: Utc::now(),
            question: question.to_string(),
            response: response.clone(),
            conversation: conversation.to_vec(),
            system_info: self.system_info.clone(),
        };

        if let Err(e) = self.append(&entry).await {
            warn!(path = %self.session_path.display(), error = %e, "Failed to write conversation log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::Document;

    fn response(answer: &str) -> PipelineResponse {
        PipelineResponse {
            documents: vec![Document::new("1", "alpha").with_meta("file_path", "a.md")],
            prompt: Message::system("System prompt:\nsys"),
            replies: vec![Message::assistant(answer)],
        }
    }

    fn read_entries(path: &Path) -> Vec<ConversationEntry> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_appends_one_line_per_answer() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let logger = ConversationLogger::new(dir.path().join("logs"), SystemInfo::from_config(&config)).unwrap();

        logger.log_conversation("first?", &response("one"), &[]).await;
        logger
            .log_conversation("second?", &response("two"), &[Message::user("first?"), Message::assistant("one")])
            .await;

        let entries = read_entries(logger.session_path());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].question, "first?");
        assert_eq!(entries[1].conversation.len(), 2);
        assert_eq!(entries[1].response.first_reply(), Some("two"));
        assert_eq!(entries[0].system_info.elasticsearch.top_k, config.storage.top_k);
        assert_eq!(entries[0].system_info.model_params, config.llm.generation);
        assert_eq!(entries[0].system_info.prompt_template_version, PROMPT_TEMPLATE_VERSION);
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ConversationLogger::new(dir.path(), SystemInfo::from_config(&Config::default())).unwrap();

        // A directory where the session file should be makes every append fail.
        std::fs::create_dir_all(logger.session_path()).unwrap();

        logger.log_conversation("q", &response("a"), &[]).await;
        assert!(logger.session_path().is_dir());
    }

    #[test]
    fn test_session_file_lives_in_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ConversationLogger::new(dir.path(), SystemInfo::from_config(&Config::default())).unwrap();

        let name = logger.session_path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("conversation_") && name.ends_with(".jsonl"));
        assert_eq!(logger.session_path().parent(), Some(dir.path()));
    }
}
