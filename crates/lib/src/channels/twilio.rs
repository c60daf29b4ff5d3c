//! Twilio channel: outbound SMS/WhatsApp via the Messages API.

use crate::channels::registry::ChannelHandle;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Twilio's shared WhatsApp sandbox sender. Fixed, independent of configuration.
const WHATSAPP_SANDBOX_FROM: &str = "whatsapp:+14155238886";

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    sid: Option<String>,
}

/// Client for the Twilio Messages API (basic auth, form-encoded).
pub struct TwilioClient {
    api_base: String,
    account_sid: String,
    auth_token: String,
    /// Configured sender number, used for the SMS path.
    sms_from: String,
    client: reqwest::Client,
}

impl TwilioClient {
    pub fn new(
        api_base: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        sms_from: impl Into<String>,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            sms_from: sms_from.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Send an SMS reply from the configured number.
    pub async fn send_sms(&self, to: &str, text: &str) -> Result<(), String> {
        self.send(message_params(&self.sms_from, to, text)).await
    }

    /// Send a WhatsApp reply from the sandbox number. The recipient is the webhook's From
    /// value, which already carries the "whatsapp:" prefix.
    pub async fn send_whatsapp(&self, to: &str, text: &str) -> Result<(), String> {
        self.send(message_params(WHATSAPP_SANDBOX_FROM, to, text)).await
    }

    /// POST /2010-04-01/Accounts/{sid}/Messages.json — create one outbound message.
    async fn send(&self, params: Vec<(&'static str, String)>) -> Result<(), String> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );
        let res = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("message create failed: {} {}", status, body));
        }
        // Delivery receipt is logged and otherwise unused.
        let receipt: MessageResponse = res.json().await.map_err(|e| e.to_string())?;
        log::info!(
            "twilio message accepted: {}",
            receipt.sid.as_deref().unwrap_or("(no sid)")
        );
        Ok(())
    }
}

fn message_params(from: &str, to: &str, body: &str) -> Vec<(&'static str, String)> {
    vec![
        ("To", to.to_string()),
        ("From", from.to_string()),
        ("Body", body.to_string()),
    ]
}

/// SMS delivery channel over the shared Twilio client.
pub struct SmsChannel {
    client: Arc<TwilioClient>,
}

impl SmsChannel {
    pub fn new(client: Arc<TwilioClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelHandle for SmsChannel {
    fn id(&self) -> &str {
        "sms"
    }

    async fn send_message(&self, to: &str, text: &str) -> Result<(), String> {
        self.client.send_sms(to, text).await
    }
}

/// WhatsApp delivery channel over the shared Twilio client.
pub struct WhatsAppChannel {
    client: Arc<TwilioClient>,
}

impl WhatsAppChannel {
    pub fn new(client: Arc<TwilioClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelHandle for WhatsAppChannel {
    fn id(&self) -> &str {
        "whatsapp"
    }

    async fn send_message(&self, to: &str, text: &str) -> Result<(), String> {
        self.client.send_whatsapp(to, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sms_params_use_configured_sender() {
        let params = message_params("+15550000000", "+15551234567", "hello");
        assert_eq!(
            params,
            vec![
                ("To", "+15551234567".to_string()),
                ("From", "+15550000000".to_string()),
                ("Body", "hello".to_string()),
            ]
        );
    }

    #[test]
    fn whatsapp_sender_is_the_fixed_sandbox_number() {
        // The sandbox sender never comes from configuration.
        assert_eq!(WHATSAPP_SANDBOX_FROM, "whatsapp:+14155238886");
        let params = message_params(WHATSAPP_SANDBOX_FROM, "whatsapp:+15551234567", "hi");
        assert_eq!(params[1].1, WHATSAPP_SANDBOX_FROM);
    }
}
