//! Ollama provider implementation.
//!
//! This module provides an Ollama HTTP API client that implements the Provider trait.

use super::types::*;
use crate::config::{Config, GenerationOptions};
use async_trait::async_trait;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ollama HTTP API provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    http_client: reqwest::Client,
}

impl OllamaProvider {
    /// Creates a new Ollama provider from the `llm` section of the config.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.llm.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.llm.ollama_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

fn ollama_options(options: &GenerationOptions) -> HashMap<String, serde_json::Value> {
    let mut opts = HashMap::new();
    opts.insert("temperature".to_string(), serde_json::json!(options.temperature));
    opts.insert("top_k".to_string(), serde_json::json!(options.top_k));
    opts.insert("top_p".to_string(), serde_json::json!(options.top_p));
    opts.insert("min_p".to_string(), serde_json::json!(options.min_p));
    if let Some(seed) = options.seed {
        opts.insert("seed".to_string(), serde_json::json!(seed));
    }
    opts
}

/// Decodes one NDJSON line of a streamed chat response.
fn parse_chat_line(line: &str) -> Result<OllamaChatResponse> {
    match serde_json::from_str::<OllamaChatResponse>(line) {
        Ok(response) => Ok(response),
        Err(parse_err) => {
            if let Ok(api_error) = serde_json::from_str::<OllamaErrorLine>(line) {
                return Err(ProviderError::Api(api_error.error));
            }
            Err(ProviderError::Validation(format!(
                "unexpected chat chunk ({}): {}",
                parse_err, line
            )))
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn chat<'a>(
        &'a self,
        request: ChatRequest,
        mut callback: Box<dyn FnMut(ChatResponse) + Send + 'a>,
    ) -> Result<()> {
        let url = format!("{}/api/chat", self.base_url);

        let ollama_request = OllamaChatRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| OllamaMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            options: Some(ollama_options(&request.options)),
            stream: true,
        };

        let response = self.http_client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line = buffer.drain(..=newline_pos).collect::<Vec<_>>();

                if line.len() <= 1 {
                    continue;
                }

                let line_str = String::from_utf8_lossy(&line[..line.len() - 1]);
                let ollama_response = parse_chat_line(&line_str)?;
                callback(ChatResponse {
                    model: ollama_response.model,
                    content: ollama_response.message.content,
                    done: ollama_response.done,
                });
            }
        }

        // A final line without a trailing newline
        let rest = String::from_utf8_lossy(&buffer);
        if !rest.trim().is_empty() {
            let ollama_response = parse_chat_line(rest.trim())?;
            callback(ChatResponse {
                model: ollama_response.model,
                content: ollama_response.message.content,
                done: ollama_response.done,
            });
        }

        debug!(model = %request.model, "Ollama chat stream finished");
        Ok(())
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url);

        let embed_request = EmbedRequest {
            model: model.to_string(),
            input: text.to_string(),
        };

        let response = self.http_client
            .post(&url)
            .json(&embed_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let embed_response = response.json::<EmbedResponse>().await?;

        embed_response.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Other("No embeddings returned".to_string()))
    }
}

// Ollama-specific request/response types (internal)

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<HashMap<String, serde_json::Value>>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaChatResponse {
    model: String,
    #[serde(default)]
    created_at: String,
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorLine {
    error: String,
}
