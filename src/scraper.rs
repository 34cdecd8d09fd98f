//! Reads the site list and fetches every career page in order.

use crate::error::{AppError, Result};
use crate::fetcher::PageSource;
use crate::models::ScrapedPage;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::{Duration, Instant};

/// Parses site list text: one URL per line, blank and `#` comment lines skipped.
pub(crate) fn parse_site_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Reads and parses the site list file. A missing file is a configuration error.
pub(crate) fn load_site_list(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("Failed to read site list {}: {}", path.display(), e))
    })?;
    Ok(parse_site_list(&contents))
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("##-"));
    }
    bar
}

/// Fetches each URL in order, keeping only the pages that produced content.
///
/// Waits `delay` after every attempt, whether it succeeded or not.
pub(crate) async fn scrape_all(
    source: &dyn PageSource,
    urls: &[String],
    delay: Duration,
    show_progress: bool,
) -> Vec<ScrapedPage> {
    let start_time = Instant::now();
    tracing::info!(target: "scrape_task", "Scraping {} sites...", urls.len());

    let bar = progress_bar(urls.len(), show_progress);
    let mut pages = Vec::with_capacity(urls.len());

    for url in urls {
        tracing::info!(target: "scrape_task", "Scraping: {}", url);
        bar.set_message(url.clone());

        match source.fetch(url).await {
            Some(content) if !content.is_empty() => pages.push(ScrapedPage {
                url: url.clone(),
                content,
            }),
            _ => tracing::warn!(target: "scrape_task", "No content retrieved for {}", url),
        }

        bar.inc(1);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    bar.finish_and_clear();
    tracing::info!(
        target: "scrape_task",
        "Successfully scraped {} of {} sites in {:.2?}",
        pages.len(),
        urls.len(),
        start_time.elapsed()
    );
    pages
}
