//! Turns page text into job records with one model call per page.

use crate::error::{AppError, Result};
use crate::llm::StructuredCompletion;
use crate::models::{JobRecord, ScrapedPage, display_date};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Markdown code-fence markers the model sometimes wraps its answer in.
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:json)?").unwrap());

/// Everything the extraction prompt is built from.
#[derive(Debug, Clone)]
pub(crate) struct ExtractionRequest<'a> {
    pub url: &'a str,
    pub content: &'a str,
    pub target_roles: &'a [String],
    pub today: NaiveDate,
}

/// Builds the instruction sent to the model for one page.
pub(crate) fn build_extraction_prompt(request: &ExtractionRequest<'_>) -> String {
    let roles = request.target_roles.join(", ");
    format!(
        r#"You are analyzing a careers page for job listings.

URL: {url}
Target roles: {roles}
Today's date: {today}

Here is the raw text content from the page:
{content}

Your task:
1. Find ALL job listings that match or are closely related to: {roles}
2. Only include jobs posted or updated within the last 24 hours IF a date is visible. If no dates are shown, include all matching roles.
3. For each matching job return a JSON array with this exact structure:

[
  {{
    "title": "exact job title",
    "company": "company name",
    "location": "city, state or Remote",
    "url": "direct link to job if found, otherwise use the careers page url",
    "summary": "one sentence description of the role"
  }}
]

If no matching jobs are found, return an empty array: []
Return ONLY the JSON array, no other text."#,
        url = request.url,
        roles = roles,
        today = display_date(request.today),
        content = request.content,
    )
}

/// Parses a model answer as a JSON array of job records.
///
/// Code-fence markers are removed first. Anything that is not a JSON array is
/// an error; array elements that are not objects are dropped.
pub(crate) fn parse_job_array(text: &str) -> Result<Vec<JobRecord>> {
    let cleaned = CODE_FENCE.replace_all(text.trim(), "");
    let value: Value = serde_json::from_str(cleaned.trim())?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(AppError::ModelOutput(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )));
        }
    };

    let total = items.len();
    let jobs: Vec<JobRecord> = items.into_iter().filter_map(JobRecord::from_value).collect();
    if jobs.len() < total {
        tracing::warn!(
            target: "extract_task",
            "Dropped {} array elements that were not JSON objects",
            total - jobs.len()
        );
    }
    Ok(jobs)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Extracts jobs from one page. Never fails: a model error or unusable output
/// is logged and counts as zero jobs.
pub(crate) async fn extract_page(
    model: &dyn StructuredCompletion,
    page: &ScrapedPage,
    target_roles: &[String],
    today: NaiveDate,
) -> Vec<JobRecord> {
    let request = ExtractionRequest {
        url: &page.url,
        content: &page.content,
        target_roles,
        today,
    };
    match model.extract_jobs(&request).await {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::warn!(target: "extract_task", "Failed to extract jobs for {}: {}", page.url, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    /// Either parses a canned answer or fails like a broken connection.
    struct CannedModel {
        answer: Option<&'static str>,
    }

    #[async_trait]
    impl StructuredCompletion for CannedModel {
        async fn extract_jobs(&self, _request: &ExtractionRequest<'_>) -> Result<Vec<JobRecord>> {
            match self.answer {
                Some(text) => parse_job_array(text),
                None => Err(AppError::Model("connection reset".to_string())),
            }
        }

        async fn render_digest(&self, _jobs: &[JobRecord], _today: NaiveDate) -> Result<String> {
            Ok(String::new())
        }
    }

    fn page() -> ScrapedPage {
        ScrapedPage {
            url: "https://careers.acme.example".to_string(),
            content: "Senior Product Manager".to_string(),
        }
    }

    #[test]
    fn test_prompt_embeds_inputs() {
        let roles = vec![
            "Senior Product Manager".to_string(),
            "Principal Product Manager".to_string(),
        ];
        let prompt = build_extraction_prompt(&ExtractionRequest {
            url: "https://careers.acme.example",
            content: "Open roles\nSenior Product Manager",
            target_roles: &roles,
            today: today(),
        });
        assert!(prompt.contains("URL: https://careers.acme.example"));
        assert!(prompt.contains("Target roles: Senior Product Manager, Principal Product Manager"));
        assert!(prompt.contains("Today's date: October 17, 2026"));
        assert!(prompt.contains("Open roles\nSenior Product Manager"));
        assert!(prompt.contains("last 24 hours"));
        assert!(prompt.contains("\"summary\": \"one sentence description of the role\""));
    }

    #[test]
    fn test_parse_plain_array() {
        let jobs = parse_job_array(r#"[{"title": "PM", "company": "Acme"}, {"title": "Sr PM"}]"#).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].company_key(), "Unknown");
    }

    #[test]
    fn test_parse_fenced_array() {
        let text = "```json\n[{\"title\": \"Principal PM\", \"location\": \"NYC\"}]\n```\n";
        let jobs = parse_job_array(text).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].location_text(), "NYC");

        let bare_fence = "```\n[]\n```";
        assert!(parse_job_array(bare_fence).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_invalid_json_and_objects() {
        assert!(matches!(parse_job_array("Sorry, no jobs here."), Err(AppError::Json(_))));
        assert!(matches!(
            parse_job_array(r#"{"title": "PM"}"#),
            Err(AppError::ModelOutput(_))
        ));
    }

    #[test]
    fn test_parse_keeps_partial_records_and_drops_scalars() {
        let jobs = parse_job_array(r#"[{"title": "PM"}, "junk", 3, {}]"#).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].title_text(), "PM");
        assert_eq!(jobs[1], JobRecord::default());
    }

    #[tokio::test]
    async fn test_extract_page_invalid_output_is_empty() {
        let model = CannedModel {
            answer: Some("I could not find any listings."),
        };
        assert!(extract_page(&model, &page(), &[], today()).await.is_empty());

        let model = CannedModel {
            answer: Some(r#"{"jobs": [{"title": "PM"}]}"#),
        };
        assert!(extract_page(&model, &page(), &[], today()).await.is_empty());
    }

    #[tokio::test]
    async fn test_extract_page_model_failure_is_empty() {
        let model = CannedModel { answer: None };
        assert!(extract_page(&model, &page(), &[], today()).await.is_empty());
    }

    #[tokio::test]
    async fn test_extract_page_success() {
        let model = CannedModel {
            answer: Some(r#"[{"title": "Senior Product Manager", "company": "Acme"}]"#),
        };
        let jobs = extract_page(&model, &page(), &[], today()).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].company_key(), "Acme");
    }
}
