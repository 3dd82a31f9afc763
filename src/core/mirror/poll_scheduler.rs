// The polling loop. Owns the high-water mark and hands each mod-log batch to
// the forwarding pipeline.
//
// Every tick is followed by the same fixed delay, whatever happened during it.
// Nothing here ever returns an error: failures are logged, alerted and the
// loop carries on.

use super::comment_mods::CommentModRoster;
use super::mirror_models::{
    ForwardSettings, HighWaterMark, ModLogQuery, ModerationEvent, PollSettings,
};
use super::mirror_service::{report_error, AlertSink, ForwardPipeline, RedditClient};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub struct PollScheduler<C: RedditClient> {
    client: Arc<C>,
    alerts: Arc<dyn AlertSink>,
    roster: Arc<CommentModRoster>,
    pipeline: ForwardPipeline<C>,
    settings: PollSettings,
    mark: HighWaterMark,
}

impl<C: RedditClient + 'static> PollScheduler<C> {
    pub fn new(
        client: Arc<C>,
        alerts: Arc<dyn AlertSink>,
        roster: Arc<CommentModRoster>,
        poll: PollSettings,
        forward: ForwardSettings,
    ) -> Self {
        let pipeline = ForwardPipeline::new(
            Arc::clone(&client),
            Arc::clone(&alerts),
            Arc::clone(&roster),
            forward,
        );

        Self {
            client,
            alerts,
            roster,
            pipeline,
            settings: poll,
            mark: HighWaterMark::unset(),
        }
    }

    #[allow(dead_code)]
    pub fn high_water_mark(&self) -> HighWaterMark {
        self.mark
    }

    /// Poll forever. Forwarding chains started by a tick are not waited for.
    pub async fn run(mut self) {
        loop {
            let _detached = self.tick().await;
            sleep(self.settings.interval).await;
        }
    }

    /// One round of the loop: seed the mark if it is still unset, otherwise
    /// fetch the latest removals and dispatch them.
    ///
    /// Returns the handles of the forwarding chains that were spawned.
    pub async fn tick(&mut self) -> Vec<JoinHandle<()>> {
        if !self.mark.is_set() {
            self.initialize().await;
            return Vec::new();
        }

        if self.roster.needs_refresh().await {
            if let Err(err) = self
                .roster
                .refresh(self.client.as_ref(), &self.settings.source_subreddit)
                .await
            {
                report_error(self.alerts.as_ref(), "Error refreshing comment mods", &err).await;
            }
        }

        let query = ModLogQuery::removals(self.settings.batch_limit);
        match self
            .client
            .fetch_mod_log(&self.settings.source_subreddit, &query)
            .await
        {
            Ok(batch) => {
                let warnings =
                    inspect_batch(&batch, self.settings.batch_limit, &self.mark);
                if warnings.unsorted {
                    tracing::warn!("Moderation log batch is not sorted newest-first");
                }
                if warnings.possibly_lossy {
                    tracing::warn!(
                        batch_limit = self.settings.batch_limit,
                        "Every removal in a full batch is new, older removals may have been missed"
                    );
                }
                self.pipeline.dispatch(batch, &mut self.mark)
            }
            Err(err) => {
                report_error(self.alerts.as_ref(), "Error getting moderator actions", &err).await;
                Vec::new()
            }
        }
    }

    /// Seed the mark from the single most recent mod-log entry.
    async fn initialize(&mut self) {
        tracing::info!(
            subreddit = %self.settings.source_subreddit,
            "Initializing from the latest moderator action..."
        );

        match self
            .client
            .fetch_mod_log(&self.settings.source_subreddit, &ModLogQuery::latest())
            .await
        {
            Ok(events) => match events.first() {
                Some(latest) => {
                    self.mark.advance(latest.created_utc);
                    tracing::info!(
                        created_utc = latest.created_utc,
                        "Initialized with last moderator action"
                    );
                }
                None => tracing::warn!("Moderation log is empty, will retry initialization"),
            },
            Err(err) => {
                report_error(self.alerts.as_ref(), "Error initializing mainloop", &err).await;
            }
        }

        tracing::info!("Mainloop initialized, starting loop...");
    }
}

/// Batch shapes the dedup guard cannot handle cleanly. Nothing is fixed up.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchWarnings {
    /// Not ordered newest-first
    pub unsorted: bool,
    /// Full batch with nothing already seen, so older removals may be lost
    pub possibly_lossy: bool,
}

pub fn inspect_batch(
    batch: &[ModerationEvent],
    batch_limit: usize,
    mark: &HighWaterMark,
) -> BatchWarnings {
    let unsorted = batch
        .windows(2)
        .any(|pair| pair[0].created_utc < pair[1].created_utc);

    let full = !batch.is_empty() && batch.len() >= batch_limit;
    let possibly_lossy = full
        && batch
            .iter()
            .map(|event| event.created_utc)
            .min()
            .is_some_and(|oldest| mark.admits(oldest));

    BatchWarnings {
        unsorted,
        possibly_lossy,
    }
}
