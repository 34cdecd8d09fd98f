//! Defines the core data structures used in the job-digest application.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Formats a date the way it appears in prompts, digests and subjects ("October 17, 2026").
pub(crate) fn display_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

/// Text fetched from one career page, ready for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScrapedPage {
    /// The site URL exactly as listed in the site list.
    pub url: String,
    /// Visible page text, already trimmed to the configured character budget.
    pub content: String,
}

/// A single job posting as reported by the model.
/// Every field is optional because the model output is not validated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub(crate) struct JobRecord {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    // Anything else the model emitted is carried through untouched.
    #[serde(flatten)]
    pub other_fields: Map<String, Value>,
}

/// Company key used when a record has no `company` field.
pub(crate) const UNKNOWN_COMPANY: &str = "Unknown";

impl JobRecord {
    /// Builds a record from one element of the model's JSON array.
    /// Returns `None` for elements that are not JSON objects.
    pub(crate) fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(_) => serde_json::from_value(value).ok(),
            _ => None,
        }
    }

    /// The grouping key for the digest.
    pub(crate) fn company_key(&self) -> &str {
        self.company.as_deref().unwrap_or(UNKNOWN_COMPANY)
    }

    pub(crate) fn title_text(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub(crate) fn location_text(&self) -> &str {
        self.location.as_deref().unwrap_or("")
    }

    pub(crate) fn url_text(&self) -> &str {
        self.url.as_deref().unwrap_or("")
    }

    pub(crate) fn summary_text(&self) -> &str {
        self.summary.as_deref().unwrap_or("")
    }
}

/// Accepts any JSON value for a text field: strings as-is, `null` as absent,
/// and other scalars or structures as their JSON text.
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

/// Output format of a digest. Also used as the configured digest mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum DigestFormat {
    /// Deterministic plain-text rendering.
    #[default]
    Text,
    /// HTML email body written by the model.
    Html,
}

/// The rendered digest body, ready to be mailed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Digest {
    pub body: String,
    pub format: DigestFormat,
}

/// What one run did, for the final log line.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunSummary {
    /// Number of URLs read from the site list.
    pub sites: usize,
    /// Number of pages fetched successfully.
    pub pages: usize,
    /// Number of job records across all pages.
    pub jobs: usize,
    /// Whether the digest was handed to the mail service.
    pub delivered: bool,
}
