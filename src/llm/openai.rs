use crate::config::ModelSettings;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, TextGenerator};

/// Provider for any OpenAI-compatible chat-completions endpoint.
pub(crate) struct OpenAiGenerator {
    api_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiGenerator {
    pub(crate) fn new(settings: &ModelSettings, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::Model(format!("failed to build OpenAI HTTP client: {}", e)))?;
        Ok(Self {
            api_url: settings.api_url.clone(),
            api_key,
            model: settings.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let req_body = OpenAiRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: request.prompt,
            }],
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.api_key.trim())
            .json(&req_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Model(format!("LLM API error {}: {}", status, body)));
        }

        let resp_body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| AppError::Model(format!("Failed to parse LLM response: {}", e)))?;

        resp_body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::Model("LLM response has no choices".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ModelProvider};

    fn settings(api_url: String) -> ModelSettings {
        ModelSettings {
            provider: ModelProvider::OpenAi,
            api_url,
            model: "gpt-4o-mini".to_string(),
            ..Config::default().model
        }
    }

    #[tokio::test]
    async fn test_generate_with_mock() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer fake-api-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "model": "gpt-4o-mini",
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": "[{\"title\": \"Principal PM\"}]"
                        },
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
                }"#,
            )
            .create_async()
            .await;

        let generator = OpenAiGenerator::new(
            &settings(format!("{}/v1/chat/completions", server.url())),
            "fake-api-key".to_string(),
        )
        .unwrap();
        let text = generator
            .generate(GenerationRequest {
                prompt: "Find jobs".to_string(),
                max_tokens: 100,
            })
            .await
            .unwrap();

        assert_eq!(text, r#"[{"title": "Principal PM"}]"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_no_choices() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let generator = OpenAiGenerator::new(
            &settings(format!("{}/v1/chat/completions", server.url())),
            "fake-api-key".to_string(),
        )
        .unwrap();
        let result = generator
            .generate(GenerationRequest {
                prompt: "Find jobs".to_string(),
                max_tokens: 100,
            })
            .await;

        assert!(matches!(result, Err(AppError::Model(_))));
    }
}
