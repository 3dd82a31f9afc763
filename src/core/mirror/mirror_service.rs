// Forwarding pipeline - core business logic for mirroring removed posts.
//
// This service handles:
// - Ordering a mod-log batch oldest-first
// - Skip rules (spam filter, AutoModerator, ...)
// - Deduplication against the high-water mark
// - Fire-and-forget fetch + submit per removal
//
// NO HTTP or Discord dependencies here - just the ports and the domain logic.

use super::comment_mods::CommentModRoster;
use super::mirror_models::{
    ForwardSettings, HighWaterMark, LinkSubmission, ModLogQuery, ModerationEvent, Moderator,
    Submission,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Reddit API error: {0}")]
    Api(String),

    #[error("Rate limited by Reddit: {0}")]
    RateLimited(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Submission rejected: {0}")]
    Submit(String),

    #[error("Unexpected response shape: {0}")]
    Decode(String),
}

impl MirrorError {
    /// Short classification logged next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            MirrorError::Auth(_) => "AuthError",
            MirrorError::Api(_) => "ApiError",
            MirrorError::RateLimited(_) => "RateLimitError",
            MirrorError::NotFound(_) => "NotFoundError",
            MirrorError::Submit(_) => "SubmitError",
            MirrorError::Decode(_) => "DecodeError",
        }
    }
}

// ============================================================================
// PORTS
// ============================================================================

/// The Reddit operations the mirror needs.
#[async_trait]
pub trait RedditClient: Send + Sync {
    /// Most recent mod-log entries of a subreddit, newest first.
    async fn fetch_mod_log(
        &self,
        subreddit: &str,
        query: &ModLogQuery,
    ) -> Result<Vec<ModerationEvent>, MirrorError>;

    /// A submission by its bare id (no `t3_` prefix).
    async fn fetch_submission(&self, id: &str) -> Result<Submission, MirrorError>;

    /// Create a link post in `subreddit`.
    async fn submit_link(&self, subreddit: &str, link: &LinkSubmission)
        -> Result<(), MirrorError>;

    async fn list_moderators(&self, subreddit: &str) -> Result<Vec<Moderator>, MirrorError>;
}

/// Somewhere to tell a human that something went wrong.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, message: &str);
}

/// Alert sink used when no alert channel is configured.
pub struct NoopAlerts;

#[async_trait]
impl AlertSink for NoopAlerts {
    async fn alert(&self, _message: &str) {}
}

/// Log a classified error and pass it on to the alert sink.
pub async fn report_error(alerts: &dyn AlertSink, context: &str, err: &MirrorError) {
    tracing::error!(error_kind = err.kind(), error = %err, "{}", context);
    alerts
        .alert(&format!("{}: {}: {}", context, err.kind(), err))
        .await;
}

// ============================================================================
// IDENTIFIER EXTRACTION
// ============================================================================

/// Pull the bare id out of a fullname such as `t3_abc123`.
///
/// Returns the run of word characters after the first underscore that is
/// followed by at least one; `None` when there is no such underscore.
pub fn extract_thing_id(fullname: &str) -> Option<&str> {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';

    for (idx, _) in fullname.match_indices('_') {
        let rest = &fullname[idx + 1..];
        let end = rest.find(|c: char| !is_word(c)).unwrap_or(rest.len());
        if end > 0 {
            return Some(&rest[..end]);
        }
    }
    None
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Turns a batch of mod-log entries into mirror posts.
pub struct ForwardPipeline<C: RedditClient> {
    client: Arc<C>,
    alerts: Arc<dyn AlertSink>,
    roster: Arc<CommentModRoster>,
    settings: Arc<ForwardSettings>,
}

impl<C: RedditClient> Clone for ForwardPipeline<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            alerts: Arc::clone(&self.alerts),
            roster: Arc::clone(&self.roster),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<C: RedditClient + 'static> ForwardPipeline<C> {
    pub fn new(
        client: Arc<C>,
        alerts: Arc<dyn AlertSink>,
        roster: Arc<CommentModRoster>,
        settings: ForwardSettings,
    ) -> Self {
        Self {
            client,
            alerts,
            roster,
            settings: Arc::new(settings),
        }
    }

    /// Process a newest-first batch.
    ///
    /// Walks the batch oldest-first, advancing `mark` synchronously for every
    /// removal that passes the skip rules and is newer than the mark, then
    /// spawns the fetch + submit chain for it. The returned handles may be
    /// dropped; the chains run to completion either way.
    pub fn dispatch(
        &self,
        batch: Vec<ModerationEvent>,
        mark: &mut HighWaterMark,
    ) -> Vec<JoinHandle<()>> {
        let mut spawned = Vec::new();

        for event in batch.into_iter().rev() {
            if !mark.admits(event.created_utc) {
                continue;
            }

            if let Some(rule) = self.settings.skip_rules.iter().find(|r| r.matches(&event)) {
                tracing::debug!(
                    created_utc = event.created_utc,
                    "Skipping removal of '{}': {}",
                    event.target_title,
                    rule
                );
                continue;
            }

            mark.advance(event.created_utc);

            let Some(id) = extract_thing_id(&event.target_fullname).map(str::to_string) else {
                tracing::warn!(
                    created_utc = event.created_utc,
                    "Removal target '{}' has no id, skipping",
                    event.target_fullname
                );
                continue;
            };

            let pipeline = self.clone();
            spawned.push(tokio::spawn(async move {
                pipeline.forward(event, id).await;
            }));
        }

        spawned
    }

    /// Fetch the removed post and submit its mirror. Errors end this chain only.
    async fn forward(&self, event: ModerationEvent, id: String) {
        let submission = match self.client.fetch_submission(&id).await {
            Ok(submission) => submission,
            Err(err) => {
                report_error(self.alerts.as_ref(), "Error getting removed post", &err).await;
                return;
            }
        };

        let link = LinkSubmission::mirror_of(&submission, &self.settings.link_host);

        if self.settings.dry_run {
            tracing::info!(
                "DRY RUN: would submit '{}' to {}",
                link.title,
                self.settings.destination_subreddit
            );
            return;
        }

        match self
            .client
            .submit_link(&self.settings.destination_subreddit, &link)
            .await
        {
            Ok(()) => tracing::info!(
                "Successfully submitted removed post '{}'",
                event.target_title
            ),
            Err(err) => {
                report_error(self.alerts.as_ref(), "Error submitting removed post", &err).await;
                return;
            }
        }

        // Only removals that made it to the destination are cross-posted
        if let Some(removals) = &self.settings.removals_subreddit {
            if self.roster.contains(&event.moderator).await {
                match self.client.submit_link(removals, &link).await {
                    Ok(()) => tracing::info!(
                        "Submitted comment-mod removal '{}' to {}",
                        event.target_title,
                        removals
                    ),
                    Err(err) => {
                        report_error(
                            self.alerts.as_ref(),
                            "Error submitting comment-mod removal",
                            &err,
                        )
                        .await;
                    }
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
