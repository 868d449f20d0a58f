//! HuggingFace inference provider.
//!
//! Chat goes through the router's OpenAI-compatible completions endpoint,
//! embeddings through the `feature-extraction` pipeline.

use super::types::*;
use crate::config::Config;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HuggingFace hosted inference provider.
#[derive(Debug, Clone)]
pub struct HuggingFaceProvider {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HuggingFaceProvider {
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.llm.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.llm.huggingface_url.trim_end_matches('/').to_string(),
            api_key: config.huggingface_api_key(),
            http_client,
        })
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http_client.post(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl Provider for HuggingFaceProvider {
    async fn chat<'a>(
        &'a self,
        request: ChatRequest,
        mut callback: Box<dyn FnMut(ChatResponse) + Send + 'a>,
    ) -> Result<()> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let hf_request = HfChatRequest {
            model: request.model.clone(),
            messages: request.messages.clone(),
            temperature: request.options.temperature,
            top_p: request.options.top_p,
            seed: request.options.seed,
            stream: false,
        };

        let response = self.post(&url).json(&hf_request).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let body = response.text().await?;
        let completion: HfChatResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Validation(format!("unexpected completion body ({}): {}", e, body)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);
        if let Some(content) = content {
            callback(ChatResponse {
                model: completion.model.unwrap_or(request.model),
                content,
                done: true,
            });
        }

        Ok(())
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/hf-inference/models/{}/pipeline/feature-extraction",
            self.base_url, model
        );

        let response = self
            .post(&url)
            .json(&serde_json::json!({ "inputs": text }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        match response.json::<FeatureExtraction>().await? {
            FeatureExtraction::Single(vector) => Ok(vector),
            FeatureExtraction::Batch(vectors) => vectors
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::Other("No embeddings returned".to_string())),
        }
    }
}

#[derive(Debug, Serialize)]
struct HfChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct HfChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<HfChoice>,
}

#[derive(Debug, Deserialize)]
struct HfChoice {
    message: HfMessage,
}

#[derive(Debug, Deserialize)]
struct HfMessage {
    /// Null when the model produced no text
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureExtraction {
    Single(Vec<f32>),
    Batch(Vec<Vec<f32>>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> HuggingFaceProvider {
        let mut config = Config::default();
        config.llm.huggingface_url = server.uri();
        config.llm.huggingface_api_key = Some("hf_test".to_string());
        HuggingFaceProvider::new(&config).unwrap()
    }

    async fn collect_chat(provider: &HuggingFaceProvider) -> Result<Vec<ChatResponse>> {
        let replies = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&replies);
        provider
            .chat(
                ChatRequest::new("meta-llama/Llama-3.2-3B-Instruct", vec![Message::user("hi")]),
                Box::new(move |r| sink.lock().unwrap().push(r)),
            )
            .await?;
        let collected = replies.lock().unwrap().clone();
        Ok(collected)
    }

    #[tokio::test]
    async fn test_chat_uses_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer hf_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "meta-llama/Llama-3.2-3B-Instruct",
                "choices": [{"message": {"role": "assistant", "content": "Paris"}}]
            })))
            .mount(&server)
            .await;

        let replies = collect_chat(&provider_for(&server)).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].content, "Paris");
        assert!(replies[0].done);
    }

    #[tokio::test]
    async fn test_chat_without_choices_yields_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let replies = collect_chat(&provider_for(&server)).await.unwrap();
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_chat_null_content_yields_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .mount(&server)
            .await;

        let replies = collect_chat(&provider_for(&server)).await.unwrap();
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn test_chat_malformed_body_is_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"output": "??"})))
            .mount(&server)
            .await;

        let err = collect_chat(&provider_for(&server)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_embed_accepts_nested_vectors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hf-inference/models/org/embedder/pipeline/feature-extraction"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([[0.5, 0.25]])))
            .mount(&server)
            .await;

        let embedding = provider_for(&server).embed("text", "org/embedder").await.unwrap();
        assert_eq!(embedding, vec![0.5, 0.25]);
    }
}
