//! Aggregates job records into a digest body, as plain text or model-written HTML.

use crate::error::Result;
use crate::llm::StructuredCompletion;
use crate::models::{Digest, DigestFormat, JobRecord, display_date};
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub(crate) const NO_ROLES_SENTENCE: &str = "No matching Senior PM or Principal PM roles found today.";
pub(crate) const FOOTER: &str = "— Your Job Digest Bot";

/// Groups jobs by company key. Keys come out sorted ascending; each group keeps
/// the input order of its jobs.
pub(crate) fn group_by_company(jobs: &[JobRecord]) -> BTreeMap<&str, Vec<&JobRecord>> {
    let mut by_company: BTreeMap<&str, Vec<&JobRecord>> = BTreeMap::new();
    for job in jobs {
        by_company.entry(job.company_key()).or_default().push(job);
    }
    by_company
}

/// Renders the plain-text digest.
pub(crate) fn render_text_digest(jobs: &[JobRecord], today: NaiveDate) -> String {
    let today = display_date(today);

    if jobs.is_empty() {
        return format!("🧭 Job Digest — {}\n\n{}\n\n{}", today, NO_ROLES_SENTENCE, FOOTER);
    }

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("🧭 Job Digest — {} | {} roles found", today, jobs.len()));
    lines.push("=".repeat(50));
    lines.push(String::new());

    for (company, company_jobs) in group_by_company(jobs) {
        lines.push(format!("🏢 {}", company.to_uppercase()));
        lines.push("─".repeat(40));
        for job in company_jobs {
            lines.push(format!("📌 {}", job.title_text()));
            lines.push(format!("📍 {}", job.location_text()));
            lines.push(format!("📝 {}", job.summary_text()));
            lines.push(format!("🔗 {}", job.url_text()));
            lines.push(String::new());
        }
        lines.push(String::new());
    }

    lines.push(FOOTER.to_string());
    lines.join("\n")
}

/// Builds the instruction asking the model for an HTML email body.
pub(crate) fn build_html_prompt(jobs: &[JobRecord], today: NaiveDate) -> Result<String> {
    let jobs_json = serde_json::to_string_pretty(jobs)?;
    Ok(format!(
        r#"You are formatting a daily job digest email.

Today's date: {today}
Number of roles: {count}

Here are the job listings as JSON:
{jobs_json}

Write a complete, self-contained HTML email body for these listings:
1. Use inline styles only (no <style> blocks, no external CSS, no scripts).
2. Start with a header showing "Job Digest", today's date and the number of roles.
3. Group the listings by company, with the company name as a section heading. Treat a missing company as "Unknown".
4. For each listing show the title, location and summary, and a "View job" link to its url.
5. End with this exact footer line: {footer}

Return ONLY the HTML, no markdown code fences and no other text."#,
        today = display_date(today),
        count = jobs.len(),
        jobs_json = jobs_json,
        footer = FOOTER,
    ))
}

/// The HTML body used when there is nothing to report.
fn empty_html_digest(today: NaiveDate) -> String {
    format!(
        concat!(
            "<html><body style=\"font-family: Arial, sans-serif; color: #222;\">",
            "<h2 style=\"margin-bottom: 4px;\">🧭 Job Digest — {}</h2>",
            "<p>{}</p>",
            "<p style=\"color: #888; font-size: 12px;\">{}</p>",
            "</body></html>"
        ),
        display_date(today),
        NO_ROLES_SENTENCE,
        FOOTER
    )
}

/// Builds the digest in the requested format.
///
/// HTML output comes from the model verbatim. If that call fails the plain-text
/// digest is used instead so the run still delivers something.
pub(crate) async fn build_digest(
    jobs: &[JobRecord],
    mode: DigestFormat,
    model: &dyn StructuredCompletion,
    today: NaiveDate,
) -> Digest {
    match mode {
        DigestFormat::Text => Digest {
            body: render_text_digest(jobs, today),
            format: DigestFormat::Text,
        },
        DigestFormat::Html if jobs.is_empty() => Digest {
            body: empty_html_digest(today),
            format: DigestFormat::Html,
        },
        DigestFormat::Html => match model.render_digest(jobs, today).await {
            Ok(body) => Digest {
                body,
                format: DigestFormat::Html,
            },
            Err(e) => {
                tracing::warn!(
                    target: "digest_task",
                    "HTML digest generation failed, falling back to plain text: {}",
                    e
                );
                Digest {
                    body: render_text_digest(jobs, today),
                    format: DigestFormat::Text,
                }
            }
        },
    }
}
