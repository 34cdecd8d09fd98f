use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod digest;
mod domain;
mod error;
mod extractor;
mod fetcher;
mod llm;
mod mailer;
mod models;
mod pipeline;
mod scraper;

/// Log targets used by the pipeline stages.
const STAGE_TARGETS: [&str; 6] = [
    "fetch_task",
    "scrape_task",
    "extract_task",
    "digest_task",
    "mail_task",
    "run_task",
];

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        let stages: Vec<String> = STAGE_TARGETS.iter().map(|t| format!("{}=debug", t)).collect();
        format!("info,job_digest=debug,{}", stages.join(","))
    } else {
        "info".to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    let args = config::AppArgs::parse();

    init_tracing(args.verbose);

    let config = config::build_config(&args).context("Failed to build configuration")?;

    let model = llm::build_completion(&config.model).context("Failed to set up the model provider")?;
    let fetcher = fetcher::SiteFetcher::new(&config)?;
    let delivery = match config.mail.clone() {
        Some(mail) => pipeline::Delivery::Gmail(mailer::GmailMailer::new(mail)?),
        None => pipeline::Delivery::Stdout,
    };

    let today = chrono::Local::now().date_naive();
    let summary = pipeline::run(&config, &fetcher, model.as_ref(), &delivery, today).await?;

    info!(
        "Run complete: {} sites, {} pages scraped, {} jobs, delivered: {}",
        summary.sites, summary.pages, summary.jobs, summary.delivered
    );

    Ok(())
}
