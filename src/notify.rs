//! SMS notification fan-out.
//!
//! Every recipient is attempted independently; one failed delivery never
//! prevents the others and never fails the caller's request.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::core::config::{require_setting, NotifySettings};
use crate::core::errors::ApiError;
use crate::core::status::CoreStatus;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one message; returns the provider's message id.
    async fn send(&self, to: &str, body: &str) -> Result<String, ApiError>;
}

/// Twilio Messages API client.
pub struct TwilioNotifier {
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: Client,
}

impl TwilioNotifier {
    pub fn new(settings: &NotifySettings) -> Result<Self, ApiError> {
        let account_sid = require_setting(settings.account_sid.as_deref(), "notify.account_sid")?;
        let auth_token = require_setting(settings.auth_token.as_deref(), "notify.auth_token")?;
        let from_number = require_setting(settings.from_number.as_deref(), "notify.from_number")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from_number: from_number.to_string(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, to: &str, body: &str) -> Result<String, ApiError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );
        let res = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(ApiError::upstream)?;

        let status = res.status();
        let payload: Value = res.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = payload["message"].as_str().unwrap_or("request rejected");
            return Err(ApiError::UpstreamUnavailable(format!(
                "SMS provider returned {}: {}",
                status, message
            )));
        }

        Ok(payload["sid"].as_str().unwrap_or_default().to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub recipient: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FanOutReport {
    pub status: CoreStatus,
    pub results: Vec<DeliveryResult>,
}

/// Sends `body` to every recipient concurrently.
pub async fn fan_out(notifier: &dyn Notifier, recipients: &[String], body: &str) -> FanOutReport {
    let attempts = recipients.iter().map(|recipient| async move {
        match notifier.send(recipient, body).await {
            Ok(id) => {
                tracing::info!(recipient = %recipient, message_id = %id, "SOS message sent");
                DeliveryResult {
                    recipient: recipient.clone(),
                    delivered: true,
                    message_id: Some(id),
                    error: None,
                }
            }
            Err(err) => {
                tracing::warn!(recipient = %recipient, error = %err, "SOS message failed");
                DeliveryResult {
                    recipient: recipient.clone(),
                    delivered: false,
                    message_id: None,
                    error: Some(err.to_string()),
                }
            }
        }
    });
    let results = join_all(attempts).await;

    let delivered = results.iter().filter(|r| r.delivered).count();
    let status = if results.is_empty() || delivered == 0 {
        CoreStatus::Error
    } else if delivered < results.len() {
        CoreStatus::Degraded
    } else {
        CoreStatus::Success
    };

    FanOutReport { status, results }
}
