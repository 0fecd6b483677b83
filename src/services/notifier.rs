use crate::config::NotificationConfig;
use crate::registry::http::{HttpRequest, HttpTransport};
use async_trait::async_trait;
use jiff::Timestamp;
use serde::Serialize;
use std::sync::Arc;

const MAX_DESCRIPTION: usize = 2000;
const COLOR_SUCCESS: u32 = 0x00FF00;
const COLOR_ERROR: u32 = 0xFF0000;
const FOOTER: &str = "modpilot";

/// Fire-and-forget operator channel. Failures are logged, never returned.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str, is_error: bool);
}

#[derive(Serialize, Debug, Clone)]
struct DiscordMessage {
    embeds: Vec<DiscordEmbed>,
}

#[derive(Serialize, Debug, Clone)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
    footer: DiscordFooter,
}

#[derive(Serialize, Debug, Clone)]
struct DiscordFooter {
    text: String,
}

impl DiscordMessage {
    fn embed(title: &str, body: &str, is_error: bool) -> Self {
        DiscordMessage {
            embeds: vec![DiscordEmbed {
                title: title.to_string(),
                description: truncate(body),
                color: if is_error { COLOR_ERROR } else { COLOR_SUCCESS },
                timestamp: Timestamp::now().to_string(),
                footer: DiscordFooter {
                    text: FOOTER.to_string(),
                },
            }],
        }
    }
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_DESCRIPTION {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(MAX_DESCRIPTION - 3).collect();
    cut.push_str("...");
    cut
}

/// Posts embeds to a Discord webhook.
pub struct DiscordNotifier {
    transport: Arc<dyn HttpTransport>,
    webhook_url: String,
    success_enabled: bool,
    error_enabled: bool,
}

impl DiscordNotifier {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &NotificationConfig) -> Self {
        Self {
            transport,
            webhook_url: config.discord_webhook.trim().to_string(),
            success_enabled: config.success_notifications,
            error_enabled: config.error_notifications,
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, title: &str, body: &str, is_error: bool) {
        if self.webhook_url.is_empty() {
            tracing::debug!(title, "no webhook configured, notification dropped");
            return;
        }
        if (is_error && !self.error_enabled) || (!is_error && !self.success_enabled) {
            tracing::debug!(title, is_error, "notification disabled");
            return;
        }

        let payload = match serde_json::to_vec(&DiscordMessage::embed(title, body, is_error)) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("failed to encode notification: {e}");
                return;
            }
        };

        match self
            .transport
            .send(HttpRequest::post_json(&self.webhook_url, payload))
            .await
        {
            Ok(response) if response.is_success() => {
                tracing::debug!(title, "notification sent");
            }
            Ok(response) => tracing::error!(status = response.status, "Discord API error"),
            Err(e) => tracing::error!("failed to send Discord notification: {e}"),
        }
    }
}
