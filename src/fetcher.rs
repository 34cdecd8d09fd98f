//! Page fetchers: a plain HTTP strategy, a headless-browser strategy, and the
//! dispatcher that picks between them by domain.

use crate::config::Config;
use crate::domain::{FetchStrategy, StrategyTable, normalize_url};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{EventLifecycleEvent, SetLifecycleEventsEnabledParams};
use futures::{Stream, StreamExt};
use reqwest::Client;
use scraper::{ElementRef, Html, Node};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Elements whose text never counts as page content.
const SKIPPED_ELEMENTS: [&str; 5] = ["script", "style", "nav", "footer", "header"];

/// Lifecycle event Chromium fires once the page has had no network activity for 500ms.
const NETWORK_IDLE_EVENT: &str = "networkIdle";
/// Upper bound on waiting for network idleness after navigation.
const NETWORK_IDLE_WAIT: Duration = Duration::from_secs(10);
/// Fixed settle time used when lifecycle events are unavailable.
const RENDER_SETTLE: Duration = Duration::from_millis(1500);
const BROWSER_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Anything that can turn a site URL into page text.
#[async_trait]
pub(crate) trait PageSource: Send + Sync {
    /// Returns the visible text of the page, or `None` when it could not be fetched.
    async fn fetch(&self, url: &str) -> Option<String>;
}

/// Reduces an HTML document to its visible text: one trimmed text node per
/// line, boilerplate elements removed, cut to `max_chars` characters.
pub(crate) fn extract_visible_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let mut lines: Vec<String> = Vec::new();
    collect_text(document.root_element(), &mut lines);
    let mut text = lines.join("\n");
    if let Some((cut, _)) = text.char_indices().nth(max_chars) {
        text.truncate(cut);
    }
    text
}

fn collect_text(element: ElementRef<'_>, lines: &mut Vec<String>) {
    if SKIPPED_ELEMENTS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(child_element, lines);
        } else if let Node::Text(text) = child.value() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
    }
}

/// Fetches pages with a single HTTP GET.
pub(crate) struct PlainFetcher {
    http_client: Client,
    max_chars: usize,
}

impl PlainFetcher {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Generic(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            max_chars: config.max_page_chars,
        })
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        let page_url = normalize_url(url)?;
        let response = self.http_client.get(page_url.clone()).send().await?;
        let status = response.status();
        tracing::debug!(target: "fetch_task", "GET {} status: {}", page_url, status);
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status,
                url: page_url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    pub(crate) async fn fetch(&self, url: &str) -> Option<String> {
        match self.fetch_html(url).await {
            Ok(html) => Some(extract_visible_text(&html, self.max_chars)),
            Err(AppError::Request(e)) if e.is_timeout() => {
                tracing::warn!(target: "fetch_task", "Timeout fetching {}: {}", url, e);
                None
            }
            Err(AppError::Request(e)) if e.is_connect() => {
                tracing::warn!(target: "fetch_task", "Connection error fetching {}: {}", url, e);
                None
            }
            Err(e) => {
                tracing::warn!(target: "fetch_task", "Plain fetch failed for {}: {}", url, e);
                None
            }
        }
    }
}

/// Fetches pages by rendering them in a headless Chromium.
/// A fresh browser is launched per page and closed before returning.
pub(crate) struct RenderedFetcher {
    user_agent: String,
    timeout: Duration,
    executable: Option<PathBuf>,
    max_chars: usize,
}

impl RenderedFetcher {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.render_timeout,
            executable: config.browser_executable.clone(),
            max_chars: config.max_page_chars,
        }
    }

    pub(crate) async fn fetch(&self, url: &str) -> Option<String> {
        match self.render_html(url).await {
            Ok(html) => Some(extract_visible_text(&html, self.max_chars)),
            Err(e) => {
                tracing::warn!(target: "fetch_task", "Rendered fetch failed for {}: {}", url, e);
                None
            }
        }
    }

    async fn render_html(&self, url: &str) -> Result<String> {
        let target = normalize_url(url)?;

        let mut builder = BrowserConfig::builder()
            .request_timeout(self.timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder
            .build()
            .map_err(|e| AppError::Browser(format!("Browser config error: {}", e)))?;

        tracing::debug!(target: "fetch_task", "Launching headless browser for {}", target);
        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| AppError::Browser(format!("Failed to launch browser: {}", e)))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let outcome = tokio::time::timeout(
            self.timeout,
            load_page(&browser, target.as_str(), &self.user_agent),
        )
        .await;

        match tokio::time::timeout(BROWSER_CLOSE_GRACE, browser.close()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::debug!(target: "fetch_task", "Browser close failed, killing it: {}", e);
                let _ = browser.kill().await;
            }
            Err(_) => {
                tracing::debug!(target: "fetch_task", "Browser close timed out, killing it");
                let _ = browser.kill().await;
            }
        }
        handler_task.abort();

        outcome.map_err(|_| AppError::Timeout(self.timeout))?
    }
}

async fn load_page(browser: &Browser, url: &str, user_agent: &str) -> Result<String> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| AppError::Browser(format!("Failed to create page: {}", e)))?;
    page.execute(SetUserAgentOverrideParams::new(user_agent))
        .await
        .map_err(|e| AppError::Browser(format!("Failed to set user agent: {}", e)))?;

    // Subscribe before navigating so the idle event cannot be missed.
    let lifecycle = lifecycle_events(&page).await;
    page.goto(url)
        .await
        .map_err(|e| AppError::Browser(format!("Failed to navigate: {}", e)))?;

    match lifecycle {
        Some(events) => {
            let names = events.map(|event| event.name.clone());
            if !wait_for_network_idle(names, NETWORK_IDLE_WAIT).await {
                tracing::debug!(target: "fetch_task", "No network idle signal for {}, reading content anyway", url);
            }
        }
        None => tokio::time::sleep(RENDER_SETTLE).await,
    }

    page.content()
        .await
        .map_err(|e| AppError::Browser(format!("Failed to read page content: {}", e)))
}

async fn lifecycle_events(page: &Page) -> Option<EventStream<EventLifecycleEvent>> {
    if let Err(e) = page.execute(SetLifecycleEventsEnabledParams::new(true)).await {
        tracing::debug!(target: "fetch_task", "Lifecycle events unavailable: {}", e);
        return None;
    }
    match page.event_listener::<EventLifecycleEvent>().await {
        Ok(events) => Some(events),
        Err(e) => {
            tracing::debug!(target: "fetch_task", "Lifecycle listener failed: {}", e);
            None
        }
    }
}

/// Waits until a `networkIdle` lifecycle event arrives, at most `limit`.
/// Returns `false` if the stream ends or the limit passes first.
async fn wait_for_network_idle<S>(mut names: S, limit: Duration) -> bool
where
    S: Stream<Item = String> + Unpin,
{
    let idle = async {
        while let Some(name) = names.next().await {
            if name == NETWORK_IDLE_EVENT {
                return true;
            }
        }
        false
    };
    tokio::time::timeout(limit, idle).await.unwrap_or(false)
}

/// Routes each URL to the plain or rendering strategy via the domain table.
pub(crate) struct SiteFetcher {
    strategies: StrategyTable,
    plain: PlainFetcher,
    rendered: RenderedFetcher,
}

impl SiteFetcher {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            strategies: StrategyTable::new(&config.rendered_domains),
            plain: PlainFetcher::new(config)?,
            rendered: RenderedFetcher::new(config),
        })
    }
}

#[async_trait]
impl PageSource for SiteFetcher {
    async fn fetch(&self, url: &str) -> Option<String> {
        let strategy = self.strategies.select(url);
        let start_time = Instant::now();
        let content = match strategy {
            FetchStrategy::Plain => self.plain.fetch(url).await,
            FetchStrategy::Rendered => self.rendered.fetch(url).await,
        };
        tracing::debug!(
            target: "fetch_task",
            "{:?} fetch of {} finished in {:.2?} ({} chars)",
            strategy,
            url,
            start_time.elapsed(),
            content.as_ref().map_or(0, |c| c.chars().count())
        );
        content
    }
}
