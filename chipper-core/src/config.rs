use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Backend family that serves the chat and embedding models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Local Ollama server. Models are health-checked and pulled on demand.
    Ollama,
    /// Hosted HuggingFace inference. Assumed self-contained.
    HuggingFace,
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelProvider::Ollama => write!(f, "ollama"),
            ModelProvider::HuggingFace => write!(f, "huggingface"),
        }
    }
}

/// Configuration for a query pipeline.
///
/// Loaded once and shared read-only (behind an `Arc`) by every component
/// the pipeline builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub provider: ModelProvider,
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub storage: StorageConfig,
    pub system_prompt: String,

    /// Record every question/answer pair to `conversation_log_dir`.
    #[serde(default)]
    pub enable_conversation_logs: bool,
    #[serde(default = "default_conversation_log_dir")]
    pub conversation_log_dir: String,

    /// Pull missing Ollama models during the readiness check.
    #[serde(default = "default_true")]
    pub allow_model_pull: bool,
}

/// Configuration for the generation model and its backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_huggingface_url")]
    pub huggingface_url: String,
    /// Falls back to the `HF_API_KEY` environment variable when unset.
    #[serde(default)]
    pub huggingface_api_key: Option<String>,
    #[serde(default)]
    pub generation: GenerationOptions,
    #[serde(default = "default_llm_timeout")]
    pub request_timeout_secs: u64,
}

/// Sampling parameters forwarded to the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub min_p: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
}

/// Elasticsearch connection and retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub url: String,
    pub index: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Number of documents handed to the prompt builder
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidates considered per shard by the approximate kNN search
    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,
    #[serde(default = "default_embedding_field")]
    pub embedding_field: String,
    #[serde(default = "default_storage_timeout")]
    pub request_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_conversation_log_dir() -> String {
    "./data/conversations".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_huggingface_url() -> String {
    "https://router.huggingface.co".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_top_k() -> usize {
    5
}

fn default_num_candidates() -> usize {
    50
}

fn default_embedding_field() -> String {
    "embedding".to_string()
}

fn default_storage_timeout() -> u64 {
    30
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.9,
            min_p: 0.0,
            seed: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "snowflake-arctic-embed2".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            ollama_url: default_ollama_url(),
            huggingface_url: default_huggingface_url(),
            huggingface_api_key: None,
            generation: GenerationOptions::default(),
            request_timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "default".to_string(),
            username: None,
            password: None,
            top_k: default_top_k(),
            num_candidates: default_num_candidates(),
            embedding_field: default_embedding_field(),
            request_timeout_secs: default_storage_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Ollama,
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            storage: StorageConfig::default(),
            system_prompt: "You are a helpful assistant. Answer using the provided context and cite the sources you relied on."
                .to_string(),
            enable_conversation_logs: false,
            conversation_log_dir: default_conversation_log_dir(),
            allow_model_pull: true,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants other components rely on.
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid("llm.model must not be empty".into()));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::Invalid("embedding.model must not be empty".into()));
        }
        if self.storage.index.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.index must not be empty".into()));
        }
        if self.storage.top_k == 0 {
            return Err(ConfigError::Invalid("storage.top_k must be at least 1".into()));
        }
        if self.storage.num_candidates < self.storage.top_k {
            return Err(ConfigError::Invalid(format!(
                "storage.num_candidates ({}) must be >= storage.top_k ({})",
                self.storage.num_candidates, self.storage.top_k
            )));
        }
        if self.llm.request_timeout_secs == 0 || self.storage.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request timeouts must be positive".into()));
        }
        Ok(())
    }

    /// The HuggingFace token, preferring the config over `HF_API_KEY`.
    pub fn huggingface_api_key(&self) -> Option<String> {
        self.llm
            .huggingface_api_key
            .clone()
            .or_else(|| std::env::var("HF_API_KEY").ok())
            .filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.url, "http://localhost:9200");
        assert_eq!(config.top_k, 5);
        assert_eq!(config.num_candidates, 50);
        assert_eq!(config.embedding_field, "embedding");
        assert!(config.username.is_none());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
provider: huggingface
llm:
  model: meta-llama/Llama-3.2-3B-Instruct
  generation:
    temperature: 0.2
    top_k: 10
    top_p: 0.8
    min_p: 0.05
    seed: 42
embedding:
  model: sentence-transformers/all-MiniLM-L6-v2
storage:
  url: http://es:9200
  index: docs
  top_k: 3
system_prompt: Be brief.
enable_conversation_logs: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.provider, ModelProvider::HuggingFace);
        assert_eq!(config.llm.generation.seed, Some(42));
        assert_eq!(config.llm.ollama_url, "http://localhost:11434");
        assert_eq!(config.storage.num_candidates, 50);
        assert!(config.enable_conversation_logs);
        assert!(config.allow_model_pull);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_small_candidate_pool() {
        let mut config = Config::default();
        config.storage.top_k = 10;
        config.storage.num_candidates = 5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let mut config = Config::default();
        config.embedding.model = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(ModelProvider::Ollama.to_string(), "ollama");
        assert_eq!(ModelProvider::HuggingFace.to_string(), "huggingface");
    }
}
