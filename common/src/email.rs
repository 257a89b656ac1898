use serde::Serialize;

use crate::{
    env_config::EmailConfig,
    error::{AppError, Res},
};

#[derive(Debug, Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
}

/// Thin client for the transactional email provider (Resend-compatible API).
#[derive(Debug, Clone)]
pub struct EmailClient {
    http: reqwest::Client,
    config: EmailConfig,
}

impl EmailClient {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    /// Sends one HTML email. Without an API key the message is only logged.
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Res<()> {
        if !self.is_enabled() {
            log::info!("Email disabled, skipping \"{}\" to {}", subject, to);
            return Ok(());
        }

        let url = format!("{}/emails", self.config.api_url.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&SendEmailBody {
                from: &self.config.from,
                to: vec![to],
                subject,
                html,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            log::debug!("Sent \"{}\" to {}", subject, to);
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AppError::Internal(format!(
                "Email provider returned {}: {}",
                status, body
            )))
        }
    }
}
