//! Sequences one digest run: site list, scrape, extract, digest, deliver.

use crate::config::Config;
use crate::digest::build_digest;
use crate::error::Result;
use crate::extractor::extract_page;
use crate::fetcher::PageSource;
use crate::llm::StructuredCompletion;
use crate::mailer::{GmailMailer, subject_line};
use crate::models::{JobRecord, RunSummary};
use crate::scraper::{load_site_list, scrape_all};
use chrono::NaiveDate;
use std::io::Write;

/// Where the finished digest goes.
pub(crate) enum Delivery {
    /// Send through the mail API.
    Gmail(GmailMailer),
    /// Print to stdout and send nothing.
    Stdout,
}

/// Runs the whole pipeline once.
///
/// Per-site and per-page failures are logged and skipped. Site-list and mail
/// failures end the run with an error.
pub(crate) async fn run(
    config: &Config,
    source: &dyn PageSource,
    model: &dyn StructuredCompletion,
    delivery: &Delivery,
    today: NaiveDate,
) -> Result<RunSummary> {
    tracing::info!(target: "run_task", "Starting job digest run...");

    let urls = load_site_list(&config.sites_file)?;
    tracing::info!(
        target: "run_task",
        "Loaded {} sites from {}",
        urls.len(),
        config.sites_file.display()
    );

    let pages = scrape_all(source, &urls, config.request_delay, config.show_progress).await;

    let mut all_jobs: Vec<JobRecord> = Vec::new();
    for page in &pages {
        tracing::info!(target: "run_task", "Extracting jobs from {}", page.url);
        let jobs = extract_page(model, page, &config.target_roles, today).await;
        if !jobs.is_empty() {
            tracing::info!(target: "run_task", "  Found {} matching jobs", jobs.len());
            all_jobs.extend(jobs);
        }
    }
    tracing::info!(target: "run_task", "Total matching jobs found: {}", all_jobs.len());

    let digest = build_digest(&all_jobs, config.digest_mode, model, today).await;
    tracing::info!(
        target: "run_task",
        "Built {:?} digest ({} chars)",
        digest.format,
        digest.body.chars().count()
    );

    let delivered = match delivery {
        Delivery::Gmail(mailer) => {
            mailer.send(&digest, all_jobs.len(), today).await?;
            true
        }
        Delivery::Stdout => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "Subject: {}\n", subject_line(all_jobs.len(), today))?;
            writeln!(stdout, "{}", digest.body)?;
            tracing::info!(target: "run_task", "Dry run: digest printed, nothing sent");
            false
        }
    };

    Ok(RunSummary {
        sites: urls.len(),
        pages: pages.len(),
        jobs: all_jobs.len(),
        delivered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MailCredentials, MailSettings};
    use crate::error::AppError;
    use crate::extractor::{ExtractionRequest, parse_job_array};
    use crate::models::DigestFormat;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    struct CannedSource(HashMap<String, String>);

    #[async_trait]
    impl PageSource for CannedSource {
        async fn fetch(&self, url: &str) -> Option<String> {
            self.0.get(url).cloned()
        }
    }

    /// Answers extraction by page URL; unknown pages get invalid output.
    struct CannedModel(HashMap<String, String>);

    #[async_trait]
    impl StructuredCompletion for CannedModel {
        async fn extract_jobs(&self, request: &ExtractionRequest<'_>) -> Result<Vec<JobRecord>> {
            let answer = self
                .0
                .get(request.url)
                .map(String::as_str)
                .unwrap_or("no json here");
            parse_job_array(answer)
        }

        async fn render_digest(&self, jobs: &[JobRecord], _today: NaiveDate) -> Result<String> {
            Ok(format!("<p>{} jobs</p>", jobs.len()))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    fn site_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn config(sites_file: PathBuf, mode: DigestFormat) -> Config {
        Config {
            sites_file,
            request_delay: Duration::ZERO,
            show_progress: false,
            digest_mode: mode,
            ..Config::default()
        }
    }

    fn mail_settings(server_url: &str) -> MailSettings {
        MailSettings {
            address: "me@example.com".parse().unwrap(),
            credentials: MailCredentials {
                token: Some("access".to_string()),
                refresh_token: None,
                token_uri: format!("{}/token", server_url),
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                scopes: vec![],
            },
            api_base: server_url.to_string(),
        }
    }

    fn fixtures() -> (CannedSource, CannedModel) {
        let source = CannedSource(HashMap::from([
            ("https://a.example/jobs".to_string(), "Acme careers".to_string()),
            ("https://c.example/jobs".to_string(), "Beta careers".to_string()),
        ]));
        let model = CannedModel(HashMap::from([
            (
                "https://a.example/jobs".to_string(),
                r#"[{"title": "Senior PM", "company": "Acme"}, {"title": "Principal PM", "company": "Acme"}]"#
                    .to_string(),
            ),
            ("https://c.example/jobs".to_string(), r#"{"error": "oops"}"#.to_string()),
        ]));
        (source, model)
    }

    #[tokio::test]
    async fn test_run_sends_digest() {
        let sites = site_file(
            "# career pages\nhttps://a.example/jobs\nhttps://b.example/jobs\nhttps://c.example/jobs\n",
        );
        let mut server = mockito::Server::new_async().await;
        let send_mock = server
            .mock("POST", "/gmail/v1/users/me/messages/send")
            .match_header("authorization", "Bearer access")
            .with_status(200)
            .with_body(r#"{"id": "1"}"#)
            .expect(1)
            .create_async()
            .await;

        let (source, model) = fixtures();
        let delivery = Delivery::Gmail(GmailMailer::new(mail_settings(&server.url())).unwrap());
        let summary = run(
            &config(sites.path().to_path_buf(), DigestFormat::Text),
            &source,
            &model,
            &delivery,
            today(),
        )
        .await
        .unwrap();

        assert_eq!(summary.sites, 3);
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.jobs, 2);
        assert!(summary.delivered);
        send_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_run_with_no_pages_still_sends() {
        let sites = site_file("https://down.example\n");
        let mut server = mockito::Server::new_async().await;
        let send_mock = server
            .mock("POST", "/gmail/v1/users/me/messages/send")
            .with_status(200)
            .with_body(r#"{"id": "2"}"#)
            .create_async()
            .await;

        let (source, model) = fixtures();
        let delivery = Delivery::Gmail(GmailMailer::new(mail_settings(&server.url())).unwrap());
        let summary = run(
            &config(sites.path().to_path_buf(), DigestFormat::Html),
            &source,
            &model,
            &delivery,
            today(),
        )
        .await
        .unwrap();

        assert_eq!(summary.pages, 0);
        assert_eq!(summary.jobs, 0);
        send_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_run_mail_failure_is_fatal() {
        let sites = site_file("https://a.example/jobs\n");
        let mut server = mockito::Server::new_async().await;
        let _send_mock = server
            .mock("POST", "/gmail/v1/users/me/messages/send")
            .with_status(500)
            .create_async()
            .await;

        let (source, model) = fixtures();
        let delivery = Delivery::Gmail(GmailMailer::new(mail_settings(&server.url())).unwrap());
        let result = run(
            &config(sites.path().to_path_buf(), DigestFormat::Text),
            &source,
            &model,
            &delivery,
            today(),
        )
        .await;

        assert!(matches!(result, Err(AppError::Mail(_))));
    }

    #[tokio::test]
    async fn test_run_missing_site_list_is_fatal() {
        let (source, model) = fixtures();
        let result = run(
            &config(PathBuf::from("/nonexistent/job_sites.txt"), DigestFormat::Text),
            &source,
            &model,
            &Delivery::Stdout,
            today(),
        )
        .await;

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_dry_run_delivers_nothing() {
        let sites = site_file("https://a.example/jobs\n");
        let (source, model) = fixtures();
        let summary = run(
            &config(sites.path().to_path_buf(), DigestFormat::Html),
            &source,
            &model,
            &Delivery::Stdout,
            today(),
        )
        .await
        .unwrap();

        assert_eq!(summary.jobs, 2);
        assert!(!summary.delivered);
    }
}
