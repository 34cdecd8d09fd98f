//! Defines the configuration settings for the job-digest application.

use crate::error::{AppError, Result};
use crate::models::DigestFormat;
use anyhow::Context;
use clap::Parser;
use lettre::message::Mailbox;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command line arguments for job-digest
#[derive(Parser, Debug)]
#[command(author, version, about = "Scrape career pages, extract matching roles and email a digest", long_about = None)]
pub(crate) struct AppArgs {
    /// Path to the newline-delimited list of career page URLs
    #[arg(short, long, env = "JOB_DIGEST_SITES")]
    pub sites: Option<PathBuf>,

    /// Path to configuration file (TOML format)
    #[arg(long, env = "JOB_DIGEST_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Digest output mode
    #[arg(short, long, value_enum, env = "JOB_DIGEST_MODE")]
    pub mode: Option<DigestFormat>,

    /// Address the digest is sent from and to
    #[arg(long, env = "YOUR_EMAIL")]
    pub email: Option<String>,

    /// JSON credential bundle for the mail API
    #[arg(long, env = "GMAIL_CREDENTIALS", hide_env_values = true)]
    pub credentials: Option<String>,

    /// Pause between site fetches (seconds)
    #[arg(long, env = "JOB_DIGEST_DELAY")]
    pub delay: Option<f32>,

    /// Print the digest to stdout instead of sending it
    #[arg(long, default_value = "false")]
    pub dry_run: bool,

    /// Disable the scraping progress bar
    #[arg(long, default_value = "false")]
    pub no_progress: bool,

    /// Enable debug logging for this crate
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,
}

/// TOML Configuration file structure
#[derive(Deserialize, Debug, Default)]
struct ConfigFile {
    input: Option<InputConfig>,
    network: Option<NetworkConfig>,
    rendering: Option<RenderingConfig>,
    model: Option<ModelFileConfig>,
    digest: Option<DigestConfig>,
    mail: Option<MailConfig>,
}

#[derive(Deserialize, Debug, Default)]
struct InputConfig {
    sites_file: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
struct NetworkConfig {
    request_timeout: Option<u64>,
    render_timeout: Option<u64>,
    delay_seconds: Option<f32>,
    user_agent: Option<String>,
    max_page_chars: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
struct RenderingConfig {
    domains: Option<Vec<String>>,
    browser_executable: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
struct ModelFileConfig {
    provider: Option<ModelProvider>,
    api_url: Option<String>,
    model: Option<String>,
    api_key_env: Option<String>,
    max_tokens: Option<u32>,
    digest_max_tokens: Option<u32>,
    timeout: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
struct DigestConfig {
    mode: Option<DigestFormat>,
    target_roles: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
struct MailConfig {
    api_base: Option<String>,
}

/// Which text-generation API the model settings point at.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ModelProvider {
    /// Anthropic Messages API.
    Anthropic,
    /// Any OpenAI-compatible chat-completions endpoint.
    OpenAi,
}

/// Settings for the text-generation service.
#[derive(Debug, Clone)]
pub(crate) struct ModelSettings {
    pub provider: ModelProvider,
    /// Full endpoint URL the request is posted to.
    pub api_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Output budget for one extraction call.
    pub max_tokens: u32,
    /// Output budget for the HTML digest call.
    pub digest_max_tokens: u32,
    pub timeout: Duration,
}

/// OAuth credential bundle for the mail API, as stored in `GMAIL_CREDENTIALS`.
#[derive(Deserialize, Clone)]
pub(crate) struct MailCredentials {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for MailCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailCredentials")
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl MailCredentials {
    /// Parses the JSON credential bundle.
    pub(crate) fn from_json(raw: &str) -> Result<Self> {
        let credentials: MailCredentials = serde_json::from_str(raw)
            .map_err(|e| AppError::Credentials(format!("Invalid credential JSON: {}", e)))?;
        let has_token = credentials.token.as_deref().is_some_and(|t| !t.is_empty());
        let has_refresh = credentials
            .refresh_token
            .as_deref()
            .is_some_and(|t| !t.is_empty());
        if !has_token && !has_refresh {
            return Err(AppError::Credentials(
                "Credential bundle has neither a token nor a refresh_token".to_string(),
            ));
        }
        Ok(credentials)
    }
}

/// Mail delivery settings. Absent in dry-run mode.
#[derive(Debug, Clone)]
pub(crate) struct MailSettings {
    /// Sender and recipient of the digest.
    pub address: Mailbox,
    pub credentials: MailCredentials,
    /// Base URL of the mail REST API.
    pub api_base: String,
}

/// Application configuration settings, built once at startup and passed into the run.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// Path to the site list file.
    pub sites_file: PathBuf,
    /// Timeout for plain HTTP fetches.
    pub request_timeout: Duration,
    /// Timeout for one rendered fetch (navigation and content read).
    pub render_timeout: Duration,
    /// Pause after every site fetch attempt.
    pub request_delay: Duration,
    /// User agent string to use for HTTP requests and the browser.
    pub user_agent: String,
    /// Character budget for one page's text.
    pub max_page_chars: usize,
    /// Domains whose pages are fetched with the headless browser.
    pub rendered_domains: Vec<String>,
    /// Explicit Chromium binary; auto-detected when `None`.
    pub browser_executable: Option<PathBuf>,
    pub model: ModelSettings,
    pub digest_mode: DigestFormat,
    /// Roles the model is asked to match.
    pub target_roles: Vec<String>,
    /// `None` when running dry.
    pub mail: Option<MailSettings>,
    pub show_progress: bool,
}

pub(crate) const DEFAULT_MAX_PAGE_CHARS: usize = 8000;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(2);
pub(crate) const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com";

fn default_target_roles() -> Vec<String> {
    vec![
        "Senior Product Manager".to_string(),
        "Principal Product Manager".to_string(),
    ]
}

fn default_model_settings(provider: ModelProvider) -> ModelSettings {
    let (api_url, model, api_key_env) = match provider {
        ModelProvider::Anthropic => (
            "https://api.anthropic.com/v1/messages",
            "claude-sonnet-4-5",
            "ANTHROPIC_API_KEY",
        ),
        ModelProvider::OpenAi => (
            "https://api.openai.com/v1/chat/completions",
            "gpt-4o-mini",
            "OPENAI_API_KEY",
        ),
    };
    ModelSettings {
        provider,
        api_url: api_url.to_string(),
        model: model.to_string(),
        api_key_env: api_key_env.to_string(),
        max_tokens: 1000,
        digest_max_tokens: 4000,
        timeout: DEFAULT_MODEL_TIMEOUT,
    }
}

impl Default for Config {
    fn default() -> Self {
        let rendered_domains = [
            "apple.com",
            "amazon.jobs",
            "tiktok.com",
            "metacareers.com",
            "careers.google.com",
            "snap.com",
            "uber.com",
            "careers.tubi.tv",
        ];

        Config {
            sites_file: PathBuf::from("job_sites.txt"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            request_delay: DEFAULT_REQUEST_DELAY,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            max_page_chars: DEFAULT_MAX_PAGE_CHARS,
            rendered_domains: rendered_domains.iter().map(|s| s.to_string()).collect(),
            browser_executable: None,
            model: default_model_settings(ModelProvider::Anthropic),
            digest_mode: DigestFormat::Text,
            target_roles: default_target_roles(),
            mail: None,
            show_progress: true,
        }
    }
}

/// Converts a delay in seconds. Negative values mean no delay; values a
/// `Duration` cannot hold (NaN, infinite, too large) fall back to the default.
fn delay_from_secs(seconds: f32) -> Duration {
    if seconds <= 0.0 {
        return Duration::ZERO;
    }
    match Duration::try_from_secs_f32(seconds) {
        Ok(delay) => delay,
        Err(e) => {
            tracing::warn!(
                "Invalid request delay {}: {}. Setting to {:?}.",
                seconds,
                e,
                DEFAULT_REQUEST_DELAY
            );
            DEFAULT_REQUEST_DELAY
        }
    }
}

/// Load configuration from a TOML file
fn load_config_file(path: &Path) -> anyhow::Result<ConfigFile> {
    if !path.exists() {
        tracing::warn!("Configuration file {} not found, using defaults", path.display());
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", path.display()))?;

    tracing::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Config file names looked up in the working directory when no file is given.
const DEFAULT_CONFIG_FILES: [&str; 2] = ["job-digest.toml", "config.toml"];

/// Loads the first default config file found under `base` that parses.
fn load_default_config(base: &Path) -> Option<ConfigFile> {
    for path in DEFAULT_CONFIG_FILES.iter().map(|name| base.join(name)) {
        if !path.exists() {
            continue;
        }
        match load_config_file(&path) {
            Ok(file_config) => return Some(file_config),
            Err(e) => {
                tracing::warn!("Failed to load configuration from {}: {}", path.display(), e);
            }
        }
    }
    None
}

fn apply_file_config(config: &mut Config, file_config: &ConfigFile) -> Option<String> {
    if let Some(input) = &file_config.input {
        if let Some(sites_file) = &input.sites_file {
            config.sites_file = sites_file.clone();
        }
    }

    if let Some(network) = &file_config.network {
        if let Some(timeout) = network.request_timeout {
            config.request_timeout = Duration::from_secs(timeout);
        }
        if let Some(timeout) = network.render_timeout {
            config.render_timeout = Duration::from_secs(timeout);
        }
        if let Some(delay) = network.delay_seconds {
            config.request_delay = delay_from_secs(delay);
        }
        if let Some(user_agent) = &network.user_agent {
            config.user_agent = user_agent.clone();
        }
        if let Some(max_chars) = network.max_page_chars {
            config.max_page_chars = max_chars;
        }
    }

    if let Some(rendering) = &file_config.rendering {
        if let Some(domains) = &rendering.domains {
            config.rendered_domains = domains.clone();
        }
        if let Some(executable) = &rendering.browser_executable {
            config.browser_executable = Some(executable.clone());
        }
    }

    if let Some(model) = &file_config.model {
        if let Some(provider) = model.provider {
            if provider != config.model.provider {
                config.model = default_model_settings(provider);
            }
        }
        if let Some(api_url) = &model.api_url {
            config.model.api_url = api_url.clone();
        }
        if let Some(name) = &model.model {
            config.model.model = name.clone();
        }
        if let Some(api_key_env) = &model.api_key_env {
            config.model.api_key_env = api_key_env.clone();
        }
        if let Some(max_tokens) = model.max_tokens {
            config.model.max_tokens = max_tokens;
        }
        if let Some(max_tokens) = model.digest_max_tokens {
            config.model.digest_max_tokens = max_tokens;
        }
        if let Some(timeout) = model.timeout {
            config.model.timeout = Duration::from_secs(timeout);
        }
    }

    if let Some(digest) = &file_config.digest {
        if let Some(mode) = digest.mode {
            config.digest_mode = mode;
        }
        if let Some(roles) = &digest.target_roles {
            config.target_roles = roles.clone();
        }
    }

    file_config
        .mail
        .as_ref()
        .and_then(|mail| mail.api_base.clone())
}

/// Apply command line arguments to the Config instance
fn apply_cli_args(config: &mut Config, args: &AppArgs) {
    if let Some(ref sites) = args.sites {
        config.sites_file = sites.clone();
    }

    if let Some(mode) = args.mode {
        config.digest_mode = mode;
    }

    if let Some(delay) = args.delay {
        config.request_delay = delay_from_secs(delay);
    }

    config.show_progress = !args.no_progress;
}

fn validate_config(config: &mut Config) {
    if config.max_page_chars == 0 {
        config.max_page_chars = DEFAULT_MAX_PAGE_CHARS;
        tracing::warn!(
            "Page character budget was 0. Setting to {}.",
            DEFAULT_MAX_PAGE_CHARS
        );
    }

    config.target_roles.retain(|role| !role.trim().is_empty());
    if config.target_roles.is_empty() {
        config.target_roles = default_target_roles();
        tracing::warn!("Target role list was empty. Using the default roles.");
    }

    if config.request_timeout.is_zero() {
        config.request_timeout = DEFAULT_REQUEST_TIMEOUT;
        tracing::warn!("Request timeout was 0. Setting to {:?}.", DEFAULT_REQUEST_TIMEOUT);
    }

    if config.render_timeout.is_zero() {
        config.render_timeout = DEFAULT_RENDER_TIMEOUT;
        tracing::warn!("Render timeout was 0. Setting to {:?}.", DEFAULT_RENDER_TIMEOUT);
    }

    if config.model.timeout.is_zero() {
        config.model.timeout = DEFAULT_MODEL_TIMEOUT;
        tracing::warn!("Model timeout was 0. Setting to {:?}.", DEFAULT_MODEL_TIMEOUT);
    }
}

/// Resolves mail settings from CLI/environment values. Any failure here is fatal.
fn build_mail_settings(args: &AppArgs, api_base: Option<String>) -> Result<MailSettings> {
    let raw_address = args
        .email
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| AppError::Config("YOUR_EMAIL is not set".to_string()))?;
    let address: Mailbox = raw_address.parse().map_err(|e| {
        AppError::Config(format!("YOUR_EMAIL '{}' is not a valid address: {}", raw_address, e))
    })?;

    let raw_credentials = args
        .credentials
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::Credentials("GMAIL_CREDENTIALS is not set".to_string()))?;

    Ok(MailSettings {
        address,
        credentials: MailCredentials::from_json(raw_credentials)?,
        api_base: api_base.unwrap_or_else(|| DEFAULT_GMAIL_API_BASE.to_string()),
    })
}

/// Builds the run configuration from defaults, a TOML file and the parsed arguments.
pub(crate) fn build_config(args: &AppArgs) -> Result<Config> {
    let mut config = Config::default();
    let mut mail_api_base = None;

    if let Some(ref file_path) = args.config_file {
        let file_config = load_config_file(file_path)?;
        mail_api_base = apply_file_config(&mut config, &file_config);
    } else if let Some(file_config) = load_default_config(Path::new(".")) {
        mail_api_base = apply_file_config(&mut config, &file_config);
    }

    apply_cli_args(&mut config, args);

    validate_config(&mut config);

    if !args.dry_run {
        config.mail = Some(build_mail_settings(args, mail_api_base)?);
    }

    tracing::debug!("Final configuration: {:?}", config);

    Ok(config)
}
