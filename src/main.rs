// This is the entry point of the removal mirror bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (Reddit API, configuration)
// - `discord/` = Discord-specific adapters (error alerts)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the polling loop, which runs until the process exits

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::mirror::{AlertSink, CommentModRoster, NoopAlerts, PollScheduler};
use crate::discord::alerts::WebhookAlerts;
use crate::infra::config::AppConfig;
use crate::infra::reddit::RedditApiClient;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = AppConfig::load().expect(
        "Invalid configuration! Set the REDDIT_* and *_SUBREDDIT variables or provide config.json.",
    );

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let client = Arc::new(
        RedditApiClient::new(config.reddit.clone()).expect("Failed to create Reddit API client"),
    );

    let alerts: Arc<dyn AlertSink> = match &config.discord_webhook_url {
        Some(url) => match WebhookAlerts::connect(url).await {
            Ok(webhook) => Arc::new(webhook),
            Err(e) => {
                tracing::warn!("Discord webhook unavailable, alerts disabled: {}", e);
                Arc::new(NoopAlerts)
            }
        },
        None => Arc::new(NoopAlerts),
    };

    let roster = Arc::new(match config.comment_mod_policy() {
        Some(policy) => CommentModRoster::new(policy),
        None => CommentModRoster::disabled(),
    });

    if config.dry_run {
        tracing::warn!("Dry run enabled, nothing will be submitted");
    }

    let scheduler = PollScheduler::new(
        client,
        alerts,
        roster,
        config.poll_settings(),
        config.forward_settings(),
    );

    tracing::info!(
        source = %config.source_subreddit,
        destination = %config.destination_subreddit,
        "Begin polling every {} seconds...",
        config.polling_interval_ms as f64 / 1000.0
    );
    scheduler.run().await;
}
