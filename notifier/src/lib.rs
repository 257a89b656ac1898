//! Transactional emails sent by the auction workflows.
//!
//! Delivery is best effort: a failed send is logged and never bubbles up
//! into the bid, settlement or refund that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use common::{email::EmailClient, error::Res};

pub mod templates;

pub use templates::Email;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Res<()>;
}

#[async_trait]
impl Mailer for EmailClient {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Res<()> {
        EmailClient::send(self, to, subject, html).await
    }
}

#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    web_app_url: String,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, web_app_url: &str) -> Self {
        Self {
            mailer,
            web_app_url: web_app_url.trim_end_matches('/').to_string(),
        }
    }

    /// Absolute link into the web app.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.web_app_url, path.trim_start_matches('/'))
    }

    pub async fn send(&self, to: &str, email: Email) {
        if let Err(e) = self.mailer.send(to, &email.subject, &email.html).await {
            log::error!("Failed to send \"{}\" to {}: {}", email.subject, to, e);
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every message instead of sending it.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<(String, String, String)>>,
        pub fail: bool,
    }

    impl RecordingMailer {
        pub fn subjects(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, subject, _)| subject.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, html: &str) -> Res<()> {
            if self.fail {
                return Err(common::error::AppError::Internal(
                    "mail provider down".to_string(),
                ));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), html.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let notifier = Notifier::new(Arc::new(RecordingMailer::default()), "https://bid.example/");
        assert_eq!(notifier.url("/lots/1"), "https://bid.example/lots/1");
        assert_eq!(notifier.url("account"), "https://bid.example/account");
    }

    #[tokio::test]
    async fn send_failure_is_swallowed() {
        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..Default::default()
        });
        let notifier = Notifier::new(mailer.clone(), "http://localhost:3000");
        notifier
            .send("a@example.com", templates::otp_code("Ann", "123456", 10))
            .await;
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_records_message() {
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(mailer.clone(), "http://localhost:3000");
        notifier
            .send("a@example.com", templates::otp_code("Ann", "123456", 10))
            .await;
        assert_eq!(mailer.subjects(), vec!["Your sign-in code"]);
    }
}
