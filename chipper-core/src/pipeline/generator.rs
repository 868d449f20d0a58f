//! Generator node backed by a [`Provider`].

use super::{ChatGenerator, Result};
use crate::config::GenerationOptions;
use crate::provider::{ChatRequest, Message, Provider};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Invoked with each chunk of generated text as it arrives.
pub type StreamingCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Runs the chat model and folds the streamed chunks into a single reply.
#[derive(Clone)]
pub struct ProviderChatGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    options: GenerationOptions,
    streaming_callback: Option<StreamingCallback>,
}

impl ProviderChatGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, options: GenerationOptions) -> Self {
        Self {
            provider,
            model: model.into(),
            options,
            streaming_callback: None,
        }
    }

    pub fn with_streaming_callback(mut self, callback: Option<StreamingCallback>) -> Self {
        self.streaming_callback = callback;
        self
    }
}

#[derive(Default)]
struct Accumulated {
    content: String,
    chunks: usize,
}

#[async_trait]
impl ChatGenerator for ProviderChatGenerator {
    async fn generate(&self, messages: &[Message]) -> Result<Vec<Message>> {
        let request = ChatRequest::new(self.model.clone(), messages.to_vec()).with_options(self.options.clone());

        let accumulated = Arc::new(Mutex::new(Accumulated::default()));
        let sink = Arc::clone(&accumulated);
        let streaming_callback = self.streaming_callback.clone();

        self.provider
            .chat(
                request,
                Box::new(move |chunk| {
                    if let Some(callback) = &streaming_callback {
                        if !chunk.content.is_empty() {
                            callback(&chunk.content);
                        }
                    }
                    if let Ok(mut acc) = sink.lock() {
                        acc.content.push_str(&chunk.content);
                        acc.chunks += 1;
                    }
                }),
            )
            .await?;

        let accumulated = match accumulated.lock() {
            Ok(mut acc) => std::mem::take(&mut *acc),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        debug!(model = %self.model, chunks = accumulated.chunks, "Generation finished");

        if accumulated.chunks == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![Message::assistant(accumulated.content)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineError;
    use crate::provider::{ChatResponse, ProviderError};

    struct ScriptedProvider {
        chunks: Vec<&'static str>,
        fail: Option<fn() -> ProviderError>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat<'a>(
            &'a self,
            request: ChatRequest,
            mut callback: Box<dyn FnMut(ChatResponse) + Send + 'a>,
        ) -> crate::provider::Result<()> {
            if let Some(fail) = self.fail {
                return Err(fail());
            }
            let last = self.chunks.len().saturating_sub(1);
            for (i, chunk) in self.chunks.iter().enumerate() {
                callback(ChatResponse {
                    model: request.model.clone(),
                    content: chunk.to_string(),
                    done: i == last,
                });
            }
            Ok(())
        }

        async fn embed(&self, _text: &str, _model: &str) -> crate::provider::Result<Vec<f32>> {
            Ok(vec![])
        }
    }

    fn generator(chunks: Vec<&'static str>) -> ProviderChatGenerator {
        ProviderChatGenerator::new(
            Arc::new(ScriptedProvider { chunks, fail: None }),
            "llama3.2",
            GenerationOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_chunks_fold_into_one_reply() {
        let replies = generator(vec!["Par", "is"]).generate(&[Message::system("p")]).await.unwrap();
        assert_eq!(replies, vec![Message::assistant("Paris")]);
    }

    #[tokio::test]
    async fn test_no_chunks_means_no_replies() {
        let replies = generator(vec![]).generate(&[Message::system("p")]).await.unwrap();
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_streaming_callback_sees_each_chunk() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: StreamingCallback = Arc::new(move |chunk: &str| sink.lock().unwrap().push(chunk.to_string()));

        generator(vec!["a", "", "b"])
            .with_streaming_callback(Some(callback))
            .generate(&[Message::system("p")])
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_provider_validation_error_is_classified() {
        let generator = ProviderChatGenerator::new(
            Arc::new(ScriptedProvider {
                chunks: vec![],
                fail: Some(|| ProviderError::Validation("bad shape".into())),
            }),
            "llama3.2",
            GenerationOptions::default(),
        );
        let err = generator.generate(&[Message::system("p")]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }
}
