//! Model readiness checking.
//!
//! Before the first query runs, the models named by the configuration must be
//! reachable and present on the serving backend. The check is exposed as a
//! lazy stream of [`ReadinessEvent`]s so callers can surface progress (model
//! pulls can take minutes). Nothing runs until the stream is polled, and each
//! step completes before the next one starts.
//!
//! # Termination
//!
//! A stream ends in one of two ways:
//! - it is exhausted: every check passed;
//! - it yields a final `status: error` event followed by exactly one `Err`
//!   item, after which it is exhausted.
//!
//! Dropping the stream early abandons the check where it stands, including
//! any pull in flight.

use crate::config::{Config, ModelProvider};
use crate::ollama::ModelManagerError;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;
use tracing::{debug, error, info, Instrument, Span};

#[derive(Debug, Error)]
pub enum ReadinessError {
    /// A collaborator required by the selected provider is missing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model initialization failed: {0}")]
    Model(#[from] ModelManagerError),

    #[error("Required models unavailable: {}", .0.join(", "))]
    ModelsUnavailable(Vec<String>),
}

pub type Result<T> = std::result::Result<T, ReadinessError>;

/// Lazy, single-use sequence of readiness events.
pub type EventStream<'a, E> = Pin<Box<dyn Stream<Item = std::result::Result<ReadinessEvent, E>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ModelStatus,
    ModelPull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Error,
    InProgress,
}

/// A status record emitted while verifying model availability.
///
/// Serializes as `{"type": ..., "status": ..., "message"|"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadinessEvent {
    pub fn success(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: EventStatus::Success,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn in_progress(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: EventStatus::InProgress,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn error(kind: EventKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            status: EventStatus::Error,
            message: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == EventStatus::Error
    }
}

/// Health checking and provisioning for a model-serving backend.
#[async_trait]
pub trait ModelManager: Send + Sync {
    /// Fails if the backend cannot be reached or reports itself unhealthy.
    async fn check_server_health(&self) -> std::result::Result<(), ModelManagerError>;

    /// Verifies that `name` is available locally, pulling it if allowed.
    ///
    /// A model that is missing and may not be pulled produces an `error`
    /// event rather than an `Err` item; `Err` is reserved for failures of
    /// the backend itself.
    fn verify_and_pull_model<'a>(&'a self, name: &'a str) -> EventStream<'a, ModelManagerError>;
}

/// Builds the readiness stream for `config`.
///
/// Returns `Err(ReadinessError::Configuration)` immediately, without producing
/// a stream, when the provider needs a model manager and none was supplied.
/// Records emitted while the stream is polled belong to `span`.
pub fn check_models<'a>(
    config: &'a Config,
    model_manager: Option<&'a dyn ModelManager>,
    span: Span,
) -> Result<EventStream<'a, ReadinessError>> {
    match config.provider {
        ModelProvider::Ollama => {
            let manager = model_manager.ok_or_else(|| {
                ReadinessError::Configuration(
                    "Ollama model manager not initialized but provider is Ollama".to_string(),
                )
            })?;
            Ok(ollama_readiness(config, manager, span))
        }
        ModelProvider::HuggingFace => Ok(Box::pin(futures::stream::iter(vec![Ok::<_, ReadinessError>(
            ReadinessEvent::success(EventKind::ModelStatus, "Using HuggingFace provider"),
        )]))),
    }
}

fn ollama_readiness<'a>(
    config: &'a Config,
    manager: &'a dyn ModelManager,
    span: Span,
) -> EventStream<'a, ReadinessError> {
    Box::pin(async_stream::stream! {
        if let Err(e) = manager.check_server_health().instrument(span.clone()).await {
            let err = ReadinessError::Model(e);
            span.in_scope(|| error!(error = %err, "Model initialization failed"));
            yield Ok(ReadinessEvent::error(EventKind::ModelStatus, err.to_string()));
            yield Err(err);
            return;
        }
        span.in_scope(|| debug!("Model server is healthy"));

        let mut unavailable: Vec<String> = Vec::new();
        for model in [config.llm.model.as_str(), config.embedding.model.as_str()] {
            let mut events = manager.verify_and_pull_model(model);
            while let Some(item) = events.next().instrument(span.clone()).await {
                match item {
                    Ok(event) => {
                        span.in_scope(|| debug!(model, status = ?event.status, "Readiness event"));
                        if event.is_error() && !unavailable.iter().any(|m| m == model) {
                            unavailable.push(model.to_string());
                        }
                        yield Ok(event);
                    }
                    Err(e) => {
                        let err = ReadinessError::Model(e);
                        span.in_scope(|| error!(model, error = %err, "Model initialization failed"));
                        yield Ok(ReadinessEvent::error(EventKind::ModelStatus, err.to_string()));
                        yield Err(err);
                        return;
                    }
                }
            }
        }

        if unavailable.is_empty() {
            span.in_scope(|| {
                info!(model = %config.llm.model, embedding_model = %config.embedding.model, "All models ready")
            });
        } else {
            let err = ReadinessError::ModelsUnavailable(unavailable);
            span.in_scope(|| error!(error = %err, "Model initialization failed"));
            yield Ok(ReadinessEvent::error(EventKind::ModelStatus, err.to_string()));
            yield Err(err);
        }
    })
}
