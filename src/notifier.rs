//! Change notifications (Slack chat.postMessage, generic webhook).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::{Config, SecureString};

/// Timeout for notification HTTP requests
const TIMEOUT_SECS: u64 = 30;

/// Destination for human readable change logs
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post_message(&self, text: &str) -> Result<()>;
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(TIMEOUT_SECS))
        .build()
        .context("Failed to create HTTP client for notifications")
}

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Slack notifier using the Web API
pub struct SlackNotifier {
    client: Client,
    api_url: String,
    channel: String,
    token: SecureString,
}

impl SlackNotifier {
    pub fn new(api_url: &str, channel: &str, token: SecureString) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_url: api_url.trim_end_matches('/').to_string(),
            channel: channel.to_string(),
            token,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// Slack answers HTTP 200 with `ok: false` on API errors
fn check_post_message_response(body: &str) -> Result<()> {
    let response: PostMessageResponse =
        serde_json::from_str(body).context("Malformed chat.postMessage response")?;
    if !response.ok {
        anyhow::bail!(
            "chat.postMessage failed: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn post_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/chat.postMessage", self.api_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token.as_str())
            .json(&PostMessage {
                channel: &self.channel,
                text,
            })
            .send()
            .await
            .context("Failed to send Slack message")?;

        let status = response.status();
        if !status.is_success() {
            // Don't log response body as it may contain sensitive info
            error!("Slack message failed with status: {}", status);
            anyhow::bail!("Slack returned {}", status);
        }

        let body = response.text().await.context("Failed to read Slack response")?;
        check_post_message_response(&body)?;

        debug!("Slack message posted to {}", self.channel);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
    timestamp: String,
    source: &'a str,
}

/// Generic JSON webhook
pub struct WebhookNotifier {
    client: Client,
    url: String,
    headers: HashMap<String, String>,
}

impl WebhookNotifier {
    pub fn new(url: &str, headers: HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: url.to_string(),
            headers,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn post_message(&self, text: &str) -> Result<()> {
        let payload = WebhookPayload {
            text,
            timestamp: chrono::Utc::now().to_rfc3339(),
            source: "banwarden",
        };

        let mut request = self.client.post(&self.url).json(&payload);

        // Headers were validated during config deserialization
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await.context("Failed to send webhook")?;
        let status = response.status();
        if !status.is_success() {
            warn!("Webhook returned non-success status: {}", status);
            anyhow::bail!("Webhook returned {}", status);
        }

        debug!("Webhook notification sent");
        Ok(())
    }
}

/// Posts to every configured destination; fails only if all of them fail
pub struct FanoutNotifier {
    notifiers: Vec<(&'static str, Box<dyn Notifier>)>,
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn post_message(&self, text: &str) -> Result<()> {
        let mut success_count = 0;
        let mut last_error = None;

        for (name, notifier) in &self.notifiers {
            match notifier.post_message(text).await {
                Ok(()) => success_count += 1,
                Err(e) => {
                    warn!("{} notification failed: {:#}", name, e);
                    last_error = Some(e);
                }
            }
        }

        debug!(
            "Notification sent to {}/{} destinations",
            success_count,
            self.notifiers.len()
        );

        match last_error {
            Some(e) if success_count == 0 => Err(e),
            _ => Ok(()),
        }
    }
}

/// Build the notifier for the enabled destinations, `None` if there are none
pub fn create_notifier(config: &Config) -> Result<Option<Box<dyn Notifier>>> {
    let mut notifiers: Vec<(&'static str, Box<dyn Notifier>)> = Vec::new();

    if config.slack.enabled {
        notifiers.push((
            "Slack",
            Box::new(SlackNotifier::new(
                &config.slack.api_url,
                &config.slack.channel,
                config.slack.get_token(),
            )?),
        ));
    }

    if config.webhook.enabled && !config.webhook.url.is_empty() {
        notifiers.push((
            "Webhook",
            Box::new(WebhookNotifier::new(
                &config.webhook.url,
                config.webhook.headers.clone(),
            )?),
        ));
    }

    let notifier: Option<Box<dyn Notifier>> = match notifiers.len() {
        0 => None,
        1 => notifiers.pop().map(|(_, n)| n),
        _ => Some(Box::new(FanoutNotifier { notifiers })),
    };
    Ok(notifier)
}
