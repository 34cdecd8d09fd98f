//! Host extraction for site URLs and the domain rule that picks a fetch strategy.

use crate::error::{AppError, Result};
use url::Url;

/// How a page is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchStrategy {
    /// Plain HTTP GET followed by HTML-to-text reduction.
    Plain,
    /// Headless browser render for pages that need script execution.
    Rendered,
}

/// Parses a site URL string into a `Url`, adding an `https://` scheme if necessary.
pub(crate) fn normalize_url(site_url_str: &str) -> Result<Url> {
    let trimmed = site_url_str.trim();
    if trimmed.is_empty() {
        return Err(AppError::Config("Site URL is empty".to_string()));
    }
    let url_str_with_scheme =
        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            format!("https://{}", trimmed)
        } else {
            trimmed.to_string()
        };
    Url::parse(&url_str_with_scheme).map_err(AppError::UrlParse)
}

/// Extracts the lowercase host (without a leading "www.") from a site URL string.
///
/// # Returns
/// * `Ok(String)` containing the host if successful.
/// * `Err(AppError)` if the URL is empty, unparseable, or has no host.
pub(crate) fn get_host_from_url(site_url_str: &str) -> Result<String> {
    let url = normalize_url(site_url_str)?;
    let host = url.host_str().ok_or_else(|| {
        AppError::Config(format!("Could not extract host from URL: {}", site_url_str))
    })?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    Ok(host.to_lowercase())
}

/// Domain lookup table deciding which URLs need the rendering strategy.
#[derive(Debug, Clone, Default)]
pub(crate) struct StrategyTable {
    rendered_domains: Vec<String>,
}

impl StrategyTable {
    pub(crate) fn new<I, S>(rendered_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rendered_domains = rendered_domains
            .into_iter()
            .map(|d| {
                let d = d.as_ref().trim().trim_start_matches('.').to_lowercase();
                d.strip_prefix("www.").map(str::to_string).unwrap_or(d)
            })
            .filter(|d| !d.is_empty())
            .collect();
        Self { rendered_domains }
    }

    /// Picks the fetch strategy for a site URL. A URL is rendered when its host
    /// equals a listed domain or is a subdomain of one. URLs whose host cannot
    /// be determined fall back to the plain strategy.
    pub(crate) fn select(&self, site_url: &str) -> FetchStrategy {
        let host = match get_host_from_url(site_url) {
            Ok(host) => host,
            Err(e) => {
                tracing::debug!("Could not determine host for {}: {}", site_url, e);
                return FetchStrategy::Plain;
            }
        };

        let rendered = self.rendered_domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        });

        if rendered {
            FetchStrategy::Rendered
        } else {
            FetchStrategy::Plain
        }
    }
}
