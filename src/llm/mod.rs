//! Text-generation providers and the structured-completion capability the
//! pipeline is written against.

use crate::config::{ModelProvider, ModelSettings};
use crate::digest::build_html_prompt;
use crate::error::{AppError, Result};
use crate::extractor::{ExtractionRequest, build_extraction_prompt, parse_job_array};
use crate::models::JobRecord;
use async_trait::async_trait;
use chrono::NaiveDate;

pub(crate) mod anthropic;
pub(crate) mod openai;

/// One single-turn generation call.
#[derive(Debug, Clone)]
pub(crate) struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
}

/// A provider that turns one prompt into one text completion.
#[async_trait]
pub(crate) trait TextGenerator: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}

/// The two model-backed operations the pipeline needs.
#[async_trait]
pub(crate) trait StructuredCompletion: Send + Sync {
    /// Extracts matching job records from one page's text.
    /// Errors when the call fails or the output is not a JSON array.
    async fn extract_jobs(&self, request: &ExtractionRequest<'_>) -> Result<Vec<JobRecord>>;

    /// Writes an HTML email body for the given jobs. The output is not validated.
    async fn render_digest(&self, jobs: &[JobRecord], today: NaiveDate) -> Result<String>;
}

/// Implements `StructuredCompletion` by prompting a `TextGenerator`.
pub(crate) struct PromptedCompletion<G> {
    generator: G,
    extraction_max_tokens: u32,
    digest_max_tokens: u32,
}

impl<G: TextGenerator> PromptedCompletion<G> {
    pub(crate) fn new(generator: G, extraction_max_tokens: u32, digest_max_tokens: u32) -> Self {
        Self {
            generator,
            extraction_max_tokens,
            digest_max_tokens,
        }
    }
}

#[async_trait]
impl<G: TextGenerator> StructuredCompletion for PromptedCompletion<G> {
    async fn extract_jobs(&self, request: &ExtractionRequest<'_>) -> Result<Vec<JobRecord>> {
        tracing::debug!(
            target: "extract_task",
            "Asking {} for jobs on {} ({} chars)",
            self.generator.name(),
            request.url,
            request.content.chars().count()
        );
        let response = self
            .generator
            .generate(GenerationRequest {
                prompt: build_extraction_prompt(request),
                max_tokens: self.extraction_max_tokens,
            })
            .await?;
        parse_job_array(&response)
    }

    async fn render_digest(&self, jobs: &[JobRecord], today: NaiveDate) -> Result<String> {
        tracing::debug!(target: "digest_task", "Asking {} for an HTML digest", self.generator.name());
        let response = self
            .generator
            .generate(GenerationRequest {
                prompt: build_html_prompt(jobs, today)?,
                max_tokens: self.digest_max_tokens,
            })
            .await?;
        Ok(response.trim().to_string())
    }
}

/// Builds the configured provider. The API key is read from the environment
/// variable named in the settings; a missing key is a configuration error.
pub(crate) fn build_completion(settings: &ModelSettings) -> Result<Box<dyn StructuredCompletion>> {
    let api_key = std::env::var(&settings.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| AppError::Config(format!("{} is not set", settings.api_key_env)))?;

    let completion: Box<dyn StructuredCompletion> = match settings.provider {
        ModelProvider::Anthropic => Box::new(PromptedCompletion::new(
            anthropic::AnthropicGenerator::new(settings, api_key)?,
            settings.max_tokens,
            settings.digest_max_tokens,
        )),
        ModelProvider::OpenAi => Box::new(PromptedCompletion::new(
            openai::OpenAiGenerator::new(settings, api_key)?,
            settings.max_tokens,
            settings.digest_max_tokens,
        )),
    };
    tracing::info!(
        "Using {:?} model {} at {}",
        settings.provider,
        settings.model,
        settings.api_url
    );
    Ok(completion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns a fixed completion and remembers the prompts it was given.
    struct ScriptedGenerator {
        reply: String,
        prompts: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&self, request: GenerationRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    fn request<'a>(roles: &'a [String]) -> ExtractionRequest<'a> {
        ExtractionRequest {
            url: "https://careers.acme.example",
            content: "Senior Product Manager - Remote",
            target_roles: roles,
            today: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_extract_jobs_uses_extraction_budget() {
        let roles = vec!["Senior Product Manager".to_string()];
        let completion = PromptedCompletion::new(
            ScriptedGenerator::new(r#"```json
[{"title": "Senior Product Manager", "company": "Acme"}]
```"#),
            1000,
            4000,
        );

        let jobs = completion.extract_jobs(&request(&roles)).await.unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].title_text(), "Senior Product Manager");
        let prompts = completion.generator.prompts.lock().unwrap();
        assert_eq!(prompts[0].max_tokens, 1000);
        assert!(prompts[0].prompt.contains("https://careers.acme.example"));
    }

    #[tokio::test]
    async fn test_extract_jobs_rejects_objects() {
        let roles = vec!["Senior Product Manager".to_string()];
        let completion =
            PromptedCompletion::new(ScriptedGenerator::new(r#"{"jobs": []}"#), 1000, 4000);
        assert!(completion.extract_jobs(&request(&roles)).await.is_err());
    }

    #[tokio::test]
    async fn test_render_digest_returns_trimmed_output() {
        let completion = PromptedCompletion::new(
            ScriptedGenerator::new("\n  <html><body>digest</body></html>  \n"),
            1000,
            4000,
        );
        let jobs = vec![JobRecord {
            title: Some("PM".to_string()),
            ..JobRecord::default()
        }];

        let html = completion
            .render_digest(&jobs, NaiveDate::from_ymd_opt(2026, 10, 17).unwrap())
            .await
            .unwrap();

        assert_eq!(html, "<html><body>digest</body></html>");
        assert_eq!(completion.generator.prompts.lock().unwrap()[0].max_tokens, 4000);
    }
}
