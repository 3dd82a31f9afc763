use async_trait::async_trait;
use serenity::builder::ExecuteWebhook;
use serenity::http::Http;
use serenity::model::webhook::Webhook;
use std::sync::Arc;

use crate::core::mirror::AlertSink;

/// Discord rejects message content longer than this.
const MAX_MESSAGE_CHARS: usize = 2000;

/// Posts mirror errors to a Discord channel through a webhook.
pub struct WebhookAlerts {
    http: Arc<Http>,
    webhook: Webhook,
}

impl WebhookAlerts {
    /// Resolve the webhook once at startup.
    pub async fn connect(url: &str) -> Result<Self, serenity::Error> {
        // Executing a webhook only needs the token embedded in its URL
        let http = Arc::new(Http::new(""));
        let webhook = Webhook::from_url(&http, url).await?;
        Ok(Self { http, webhook })
    }
}

#[async_trait]
impl AlertSink for WebhookAlerts {
    async fn alert(&self, message: &str) {
        let content = alert_content(message);
        let builder = ExecuteWebhook::new().content(content);

        if let Err(err) = self.webhook.execute(&self.http, false, builder).await {
            tracing::warn!(error = %err, "Failed to send Discord alert");
        }
    }
}

fn alert_content(message: &str) -> String {
    let content = format!(
        "Removal mirror has had an error. Please check on it.\n{}",
        message
    );
    match content.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((cut, _)) => content[..cut].to_string(),
        None => content,
    }
}
