use serde_json::json;

use crate::config::MailConfig;
use crate::error::{AppError, Result};

/// Sends download links through the Mailjet send API
pub struct Mailer {
    client: reqwest::Client,
    config: MailConfig,
}

impl Mailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
            && !self.config.api_key.is_empty()
            && !self.config.sender_email.is_empty()
    }

    /// E-mail a download link to `receiver`
    pub async fn send_download_link(
        &self,
        receiver: &str,
        link: &str,
        sender_name: Option<&str>,
    ) -> Result<()> {
        if !self.is_enabled() {
            return Err(AppError::BadRequest(
                "Email delivery is not configured".to_string(),
            ));
        }
        let receiver = receiver.trim();
        if receiver.is_empty() || !receiver.contains('@') {
            return Err(AppError::BadRequest(format!(
                "Invalid receiver email: {}",
                receiver
            )));
        }

        let from = sender_name.unwrap_or("Someone");
        let body = json!({
            "Messages": [{
                "From": {
                    "Email": self.config.sender_email,
                    "Name": self.config.sender_name,
                },
                "To": [{ "Email": receiver }],
                "Subject": format!("{} shared a file with you", from),
                "TextPart": format!("{} shared a file with you. Download it here: {}", from, link),
                "HTMLPart": format!(
                    "<p>{} shared a file with you.</p><p><a href=\"{}\">Download the file</a></p>",
                    from, link
                ),
            }]
        });

        self.client
            .post(&self.config.api_url)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        tracing::info!("Sent download link to {}", receiver);
        Ok(())
    }
}
