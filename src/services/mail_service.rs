use async_trait::async_trait;
use reqwest::Client;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::services::reset_password::OtpMailer;

#[derive(Clone)]
pub struct MailService {
    api_url: String,
    api_key: String,
    from: String,
    client: Client,
}

impl MailService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            api_url: config.mail_api_url.clone(),
            api_key: config.mail_api_key.clone(),
            from: config.mail_from.clone(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl OtpMailer for MailService {
    async fn send_otp(&self, email: &str, otp: &str) -> Result<()> {
        let body = format!(
            "Your password reset OTP is: {}. It expires in 1 hour.",
            otp
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("apiKey", &self.api_key)
            .header("Accept", "application/json")
            .form(&[
                ("from", self.from.as_str()),
                ("to", email),
                ("subject", "Your password reset code"),
                ("text", body.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::internal(format!("Mail API error: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::internal(format!(
                "Mail sending failed with status: {}",
                response.status()
            )))
        }
    }
}
