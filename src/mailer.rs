//! Sends the digest through the Gmail REST API using OAuth refresh credentials.

use crate::config::{MailCredentials, MailSettings};
use crate::error::{AppError, Result};
use crate::models::{Digest, DigestFormat, display_date};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use chrono::NaiveDate;
use lettre::Message;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAIL_TIMEOUT: Duration = Duration::from_secs(30);
const SEND_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://mail.google.com/",
];

/// Subject line for a digest: always carries the count and the date.
pub(crate) fn subject_line(job_count: usize, today: NaiveDate) -> String {
    format!("Job Digest: {} new PM roles - {}", job_count, display_date(today))
}

/// Builds the single-part MIME message, addressed from and to `mailbox`.
pub(crate) fn build_message(mailbox: &Mailbox, subject: &str, digest: &Digest) -> Result<Message> {
    let content_type = match digest.format {
        DigestFormat::Text => ContentType::TEXT_PLAIN,
        DigestFormat::Html => ContentType::TEXT_HTML,
    };
    let message = Message::builder()
        .from(mailbox.clone())
        .to(mailbox.clone())
        .subject(subject)
        .header(content_type)
        .body(digest.body.clone())?;
    Ok(message)
}

/// Encodes a formatted message for the `raw` field of the send call.
pub(crate) fn encode_raw(message: &Message) -> String {
    URL_SAFE.encode(message.formatted())
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize)]
struct SendRequest {
    raw: String,
}

#[derive(Deserialize, Debug)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Gmail sender for one run.
pub(crate) struct GmailMailer {
    settings: MailSettings,
    http_client: Client,
}

impl GmailMailer {
    pub(crate) fn new(settings: MailSettings) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(MAIL_TIMEOUT)
            .build()
            .map_err(|e| AppError::Generic(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        let credentials = &settings.credentials;
        if !credentials.scopes.is_empty()
            && !credentials
                .scopes
                .iter()
                .any(|scope| SEND_SCOPES.contains(&scope.as_str()))
        {
            tracing::warn!(
                target: "mail_task",
                "Credential scopes {:?} do not include a Gmail send scope; sending may be rejected",
                credentials.scopes
            );
        }

        Ok(Self {
            settings,
            http_client,
        })
    }

    /// Exchanges the refresh token for a fresh access token, or falls back to the
    /// stored token when there is no refresh token.
    async fn access_token(&self) -> Result<String> {
        let credentials: &MailCredentials = &self.settings.credentials;
        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty());

        let Some(refresh_token) = refresh_token else {
            tracing::debug!(target: "mail_task", "No refresh token, using stored access token");
            return credentials
                .token
                .clone()
                .ok_or_else(|| AppError::Credentials("No access token available".to_string()));
        };

        tracing::debug!(target: "mail_task", "Refreshing access token at {}", credentials.token_uri);
        let response = self
            .http_client
            .post(&credentials.token_uri)
            .form(&RefreshRequest {
                grant_type: "refresh_token",
                client_id: &credentials.client_id,
                client_secret: &credentials.client_secret,
                refresh_token,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Credentials(format!(
                "Token refresh failed with {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Credentials(format!("Invalid token response: {}", e)))?;
        Ok(token.access_token)
    }

    /// Builds and submits the digest email. Every failure is returned to the caller.
    pub(crate) async fn send(&self, digest: &Digest, job_count: usize, today: NaiveDate) -> Result<()> {
        let subject = subject_line(job_count, today);
        let message = build_message(&self.settings.address, &subject, digest)?;
        let raw = encode_raw(&message);

        let access_token = self.access_token().await?;
        let send_url = format!(
            "{}/gmail/v1/users/me/messages/send",
            self.settings.api_base.trim_end_matches('/')
        );

        let response = self
            .http_client
            .post(&send_url)
            .bearer_auth(access_token)
            .json(&SendRequest { raw })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Mail(format!("Send failed with {}: {}", status, body)));
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| AppError::Mail(format!("Invalid send response: {}", e)))?;
        tracing::info!(
            target: "mail_task",
            "Email sent successfully with {} jobs (message id {})",
            job_count,
            sent.id.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }
}
