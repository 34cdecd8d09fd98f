//! Defines the custom error types for the job-digest application.

use std::io;
use thiserror::Error;
use url::ParseError as UrlParseError;

/// The primary error type for a digest run.
#[derive(Error, Debug)]
pub(crate) enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Mail credentials are missing or malformed.
    #[error("Credential Error: {0}")]
    Credentials(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization or deserialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error parsing a URL.
    #[error("URL Parsing Error: {0}")]
    UrlParse(#[from] UrlParseError),

    /// Error making HTTP requests via reqwest.
    #[error("HTTP Request Error: {0}")]
    Request(#[from] reqwest::Error),

    /// A remote endpoint answered with a non-success status.
    #[error("HTTP Status Error: {status} from {url}")]
    HttpStatus {
        /// The status code returned.
        status: reqwest::StatusCode,
        /// The URL that was requested.
        url: String,
    },

    /// Launching or driving the headless browser failed.
    #[error("Browser Error: {0}")]
    Browser(String),

    /// An operation exceeded its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The text-generation service failed or returned an unusable envelope.
    #[error("Model Error: {0}")]
    Model(String),

    /// The model answered, but not with the structure that was asked for.
    #[error("Unexpected model output: {0}")]
    ModelOutput(String),

    /// Building the outgoing MIME message failed.
    #[error("Message Build Error: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// The mail service rejected the token exchange or the message.
    #[error("Mail Error: {0}")]
    Mail(String),

    /// An underlying error that doesn't fit other categories, using anyhow.
    #[error("Generic Error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub(crate) type Result<T> = std::result::Result<T, AppError>;
