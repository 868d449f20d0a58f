//! Ollama model management.
//!
//! Health probing, local model listing and streamed model pulls against the
//! Ollama HTTP API. [`OllamaModelManager`] implements [`ModelManager`] so the
//! readiness checker can drive it.

use crate::readiness::{EventKind, EventStream, ModelManager, ReadinessEvent};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while managing Ollama models.
#[derive(Debug, Error)]
pub enum ModelManagerError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Ollama server at {url} is not healthy: {reason}")]
    Unhealthy { url: String, reason: String },

    #[error("Failed to pull model {model}: {reason}")]
    Pull { model: String, reason: String },

    #[error("API error: {0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, ModelManagerError>;

/// Checks and provisions models on an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaModelManager {
    /// The base URL of the Ollama server (e.g., "http://localhost:11434")
    base_url: String,
    allow_pull: bool,
    probe_timeout: Duration,
    http_client: reqwest::Client,
}

impl OllamaModelManager {
    /// Creates a manager for the server at `base_url`.
    ///
    /// The HTTP client only carries a connect timeout: pulls stream for as
    /// long as the download takes. Probes and listings use `probe_timeout`.
    pub fn new(base_url: impl Into<String>, allow_pull: bool) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            allow_pull,
            probe_timeout: PROBE_TIMEOUT,
            http_client,
        })
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Lists the names of models present on the server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.http_client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ModelManagerError::Api(error_text));
        }

        let tags = response.json::<TagsResponse>().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Returns true if `name` is present locally.
    pub async fn is_model_available(&self, name: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|local| model_matches(local, name)))
    }
}

/// Compares model names the way Ollama resolves them: a name without a tag
/// means `:latest`.
fn model_matches(local: &str, wanted: &str) -> bool {
    fn normalize(name: &str) -> String {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{}:latest", name)
        }
    }
    normalize(local) == normalize(wanted)
}

/// Renders one pull progress line for display.
fn describe_progress(progress: &PullProgress) -> String {
    match (progress.completed, progress.total) {
        (Some(completed), Some(total)) if total > 0 => {
            let percent = completed.saturating_mul(100) / total;
            format!("{} ({}%)", progress.status, percent)
        }
        _ => progress.status.clone(),
    }
}

fn parse_pull_line(model: &str, line: &str) -> Result<PullProgress> {
    let progress: PullProgress = serde_json::from_str(line)?;
    if let Some(error) = progress.error {
        return Err(ModelManagerError::Pull {
            model: model.to_string(),
            reason: error,
        });
    }
    Ok(progress)
}

#[async_trait]
impl ModelManager for OllamaModelManager {
    async fn check_server_health(&self) -> Result<()> {
        let url = format!("{}/api/version", self.base_url);

        let response = self.http_client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| ModelManagerError::Unhealthy {
                url: self.base_url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ModelManagerError::Unhealthy {
                url: self.base_url.clone(),
                reason: format!("status {}", response.status()),
            });
        }

        debug!(url = %self.base_url, "Ollama server is healthy");
        Ok(())
    }

    fn verify_and_pull_model<'a>(&'a self, name: &'a str) -> EventStream<'a, ModelManagerError> {
        Box::pin(async_stream::try_stream! {
            if self.is_model_available(name).await? {
                debug!(model = name, "Model available locally");
                yield ReadinessEvent::success(EventKind::ModelStatus, format!("Model {} is available", name));
                return;
            }

            if !self.allow_pull {
                warn!(model = name, "Model missing and pulling is disabled");
                yield ReadinessEvent::error(
                    EventKind::ModelStatus,
                    format!("Model {} is not available locally and model pulling is disabled", name),
                );
                return;
            }

            info!(model = name, "Pulling model");
            yield ReadinessEvent::in_progress(EventKind::ModelPull, format!("Pulling model {}", name));

            let url = format!("{}/api/pull", self.base_url);
            let response = self.http_client
                .post(&url)
                .json(&PullRequest { model: name, stream: true })
                .send()
                .await?;

            if !response.status().is_success() {
                let error_text = response.text().await?;
                Err::<(), _>(ModelManagerError::Pull { model: name.to_string(), reason: error_text })?;
                return;
            }

            let mut stream = response.bytes_stream();
            let mut buffer = Vec::new();
            let mut last_message = String::new();
            let mut succeeded = false;

            while let Some(chunk_result) = stream.next().await {
                let chunk = chunk_result?;
                buffer.extend_from_slice(&chunk);

                while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = buffer.drain(..=newline_pos).collect::<Vec<_>>();
                    let line_str = String::from_utf8_lossy(&line[..line.len() - 1]).trim().to_string();
                    if line_str.is_empty() {
                        continue;
                    }

                    let progress = parse_pull_line(name, &line_str)?;
                    if progress.status == "success" {
                        succeeded = true;
                        continue;
                    }

                    // Only report changes; Ollama repeats lines for every few kilobytes.
                    let message = describe_progress(&progress);
                    if message != last_message {
                        yield ReadinessEvent::in_progress(EventKind::ModelPull, format!("{}: {}", name, message));
                        last_message = message;
                    }
                }
            }

            let rest = String::from_utf8_lossy(&buffer).trim().to_string();
            if !rest.is_empty() && parse_pull_line(name, &rest)?.status == "success" {
                succeeded = true;
            }

            if !succeeded {
                Err::<(), _>(ModelManagerError::Pull {
                    model: name.to_string(),
                    reason: "pull stream ended before completion".to_string(),
                })?;
            }

            info!(model = name, "Model pulled");
            yield ReadinessEvent::success(EventKind::ModelPull, format!("Model {} pulled successfully", name));
        })
    }
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct PullProgress {
    #[serde(default)]
    status: String,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}
