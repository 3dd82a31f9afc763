// Comment moderators are moderators whose permission set is exactly the
// configured one. Their removals are also posted to the removals subreddit.

use super::mirror_models::{CommentModPolicy, Moderator};
use super::mirror_service::{MirrorError, RedditClient};
use std::collections::HashSet;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Default)]
struct RosterState {
    names: HashSet<String>,
    /// Last attempt, successful or not
    attempted_at: Option<Instant>,
}

/// Cached set of comment-moderator names for the source subreddit.
pub struct CommentModRoster {
    policy: Option<CommentModPolicy>,
    state: RwLock<RosterState>,
}

impl CommentModRoster {
    pub fn new(policy: CommentModPolicy) -> Self {
        Self {
            policy: Some(policy),
            state: RwLock::new(RosterState::default()),
        }
    }

    /// A roster that never contains anyone and never refreshes.
    pub fn disabled() -> Self {
        Self {
            policy: None,
            state: RwLock::new(RosterState::default()),
        }
    }

    pub async fn contains(&self, moderator: &str) -> bool {
        self.state.read().await.names.contains(moderator)
    }

    pub async fn needs_refresh(&self) -> bool {
        let Some(policy) = &self.policy else {
            return false;
        };
        match self.state.read().await.attempted_at {
            Some(at) => at.elapsed() >= policy.refresh_every,
            None => true,
        }
    }

    /// Reload the roster from the subreddit's moderator list.
    ///
    /// On error the previous roster stays in place and the next attempt waits
    /// for the full refresh period, same as after a success.
    pub async fn refresh<C: RedditClient + ?Sized>(
        &self,
        client: &C,
        subreddit: &str,
    ) -> Result<usize, MirrorError> {
        let Some(policy) = &self.policy else {
            return Ok(0);
        };

        let listed = client.list_moderators(subreddit).await;

        let mut state = self.state.write().await;
        state.attempted_at = Some(Instant::now());
        let names = classify(&listed?, policy);
        let count = names.len();

        tracing::info!(subreddit, "Refreshed comment mods: {:?}", names);

        state.names = names;
        Ok(count)
    }
}

/// Names of the moderators that hold exactly the policy's permissions.
fn classify(moderators: &[Moderator], policy: &CommentModPolicy) -> HashSet<String> {
    let wanted: HashSet<&str> = policy.permissions.iter().map(String::as_str).collect();

    moderators
        .iter()
        .filter(|m| !policy.whitelist.contains(&m.name))
        .filter(|m| m.permissions.iter().map(String::as_str).collect::<HashSet<_>>() == wanted)
        .map(|m| m.name.clone())
        .collect()
}
