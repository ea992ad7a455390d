use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::traits::TextGenerator;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

const EMBED_BATCH_SIZE: usize = 64;

fn http_client(timeout: Duration) -> Result<Client, SearchError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn request_failure(backend: &str, error: reqwest::Error) -> SearchError {
    if error.is_timeout() {
        SearchError::external(backend, format!("request timed out: {error}"))
    } else {
        SearchError::external(backend, error.to_string())
    }
}

pub struct OpenAiEmbedder {
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let model = model.into();
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            dimensions: known_dimensions(&model),
            model,
            client: http_client(timeout)?,
        })
    }

    async fn embed_batch(&self, batch: &[&str]) -> Result<Vec<Vec<f32>>, SearchError> {
        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": batch }))
            .send()
            .await
            .map_err(|error| request_failure("openai-embeddings", error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::external(
                "openai-embeddings",
                format!("{status}: {body}"),
            ));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| request_failure("openai-embeddings", error))?;
        parsed.into_vectors(batch.len())
    }
}

fn known_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SearchError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_vectors(mut self, expected: usize) -> Result<Vec<Vec<f32>>, SearchError> {
        if self.data.len() != expected {
            return Err(SearchError::external(
                "openai-embeddings",
                format!("expected {expected} vectors, got {}", self.data.len()),
            ));
        }
        self.data.sort_by_key(|item| item.index);
        Ok(self.data.into_iter().map(|item| item.embedding).collect())
    }
}

pub struct OpenAiChatGenerator {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: Client,
}

impl OpenAiChatGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.2,
            client: http_client(timeout)?,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Result<String, SearchError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| SearchError::external("openai-chat", "response had no message content"))
    }
}

#[async_trait]
impl TextGenerator for OpenAiChatGenerator {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, SearchError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| request_failure("openai-chat", error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::external("openai-chat", format!("{status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| request_failure("openai-chat", error))?;
        parsed.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_response_is_reordered_by_index() -> Result<(), Box<dyn std::error::Error>> {
        let parsed: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#,
        )?;
        let vectors = parsed.into_vectors(2)?;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        Ok(())
    }

    #[test]
    fn short_embedding_response_is_an_external_error() -> Result<(), Box<dyn std::error::Error>> {
        let parsed: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#)?;
        assert!(matches!(
            parsed.into_vectors(2),
            Err(SearchError::ExternalService { .. })
        ));
        Ok(())
    }

    #[test]
    fn chat_response_text_is_extracted() -> Result<(), Box<dyn std::error::Error>> {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"① [발생 원인] 데이터 없음"}}]}"#,
        )?;
        assert_eq!(parsed.into_text()?, "① [발생 원인] 데이터 없음");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#)?;
        assert!(empty.into_text().is_err());
        Ok(())
    }

    #[test]
    fn embedder_reports_model_and_dimensions() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = OpenAiEmbedder::new(
            "http://localhost:8080/",
            "key",
            "text-embedding-3-small",
            Duration::from_secs(5),
        )?;
        assert_eq!(embedder.model_id(), "text-embedding-3-small");
        assert_eq!(embedder.dimensions(), 1536);
        assert_eq!(embedder.endpoint, "http://localhost:8080");
        Ok(())
    }
}
