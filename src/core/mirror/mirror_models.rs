// Mirror domain models - the data that flows from the moderation log to the
// destination subreddit.
//
// These are pure domain types with no HTTP or Discord dependencies.
// The infra layer maps Reddit's JSON envelopes into them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reddit's mod-log action tag for a removed submission.
pub const REMOVE_LINK_ACTION: &str = "removelink";

/// Derived titles longer than this many characters get cut and suffixed with `...`.
pub const MAX_TITLE_CHARS: usize = 275;

/// One entry of a subreddit's moderation log.
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationEvent {
    /// Unix timestamp (seconds) of the action
    pub created_utc: i64,
    /// Action tag, e.g. `removelink`
    pub action: String,
    /// Name of the moderator (or bot) that performed the action
    pub moderator: String,
    /// Fullname of the affected thing, `<kind>_<id>`
    pub target_fullname: String,
    /// Title of the affected post, only used for logging
    pub target_title: String,
    /// Free-text annotation. `confirm_spam` marks a spam-filter removal.
    pub details: String,
}

/// Parameters for a mod-log fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModLogQuery {
    pub limit: usize,
    pub action: Option<String>,
}

impl ModLogQuery {
    /// The single most recent action of any type, used to seed the high-water mark.
    pub fn latest() -> Self {
        Self {
            limit: 1,
            action: None,
        }
    }

    /// The most recent `limit` submission removals.
    pub fn removals(limit: usize) -> Self {
        Self {
            limit,
            action: Some(REMOVE_LINK_ACTION.to_string()),
        }
    }
}

/// The original (removed) post.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub score: i64,
    pub title: String,
    /// Site-relative permalink, e.g. `/r/x/comments/1/hello/`
    pub permalink: String,
}

/// A link post to be created in a destination subreddit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSubmission {
    pub title: String,
    pub url: String,
    pub send_replies: bool,
}

impl LinkSubmission {
    /// Build the mirror post for a removed submission.
    ///
    /// Title is `[<score>] <title>` (truncated past [`MAX_TITLE_CHARS`]),
    /// URL is `link_host` followed by the permalink, unmodified.
    pub fn mirror_of(submission: &Submission, link_host: &str) -> Self {
        let full_title = format!("[{}] {}", submission.score, submission.title);

        Self {
            title: truncate_title(&full_title),
            url: format!("{}{}", link_host, submission.permalink),
            send_replies: false,
        }
    }
}

/// Cut a title down to [`MAX_TITLE_CHARS`] characters plus `...`.
pub fn truncate_title(title: &str) -> String {
    match title.char_indices().nth(MAX_TITLE_CHARS) {
        Some((cut, _)) => format!("{}...", &title[..cut]),
        None => title.to_string(),
    }
}

/// A moderator of a subreddit with their granted permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moderator {
    pub name: String,
    pub permissions: Vec<String>,
}

/// Timestamp of the most recently processed moderation event.
///
/// Starts unset and only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighWaterMark(Option<i64>);

impl HighWaterMark {
    pub fn unset() -> Self {
        Self(None)
    }

    #[allow(dead_code)]
    pub fn at(created_utc: i64) -> Self {
        Self(Some(created_utc))
    }

    #[allow(dead_code)]
    pub fn get(&self) -> Option<i64> {
        self.0
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Whether an event at `created_utc` has not been seen yet.
    /// Everything is new to an unset mark.
    pub fn admits(&self, created_utc: i64) -> bool {
        match self.0 {
            Some(mark) => created_utc > mark,
            None => true,
        }
    }

    /// Move the mark forward to `created_utc`. Returns false (and leaves the
    /// mark alone) if that would move it backwards.
    pub fn advance(&mut self, created_utc: i64) -> bool {
        if let Some(mark) = self.0 {
            if created_utc < mark {
                return false;
            }
        }
        self.0 = Some(created_utc);
        true
    }
}

/// A reason to leave a removal alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipRule {
    /// Removal performed by this moderator (e.g. `AutoModerator`)
    Moderator(String),
    /// Removal annotated with exactly this detail (e.g. `confirm_spam`)
    Details(String),
}

impl SkipRule {
    pub fn matches(&self, event: &ModerationEvent) -> bool {
        match self {
            SkipRule::Moderator(name) => event.moderator == *name,
            SkipRule::Details(details) => event.details == *details,
        }
    }

    /// Spam-filter confirmations and AutoModerator removals.
    pub fn defaults() -> Vec<SkipRule> {
        vec![
            SkipRule::Details("confirm_spam".to_string()),
            SkipRule::Moderator("AutoModerator".to_string()),
        ]
    }
}

impl std::fmt::Display for SkipRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipRule::Moderator(name) => write!(f, "moderator is {}", name),
            SkipRule::Details(details) => write!(f, "details are {}", details),
        }
    }
}

/// Settings for forwarding a single removal.
#[derive(Debug, Clone)]
pub struct ForwardSettings {
    pub destination_subreddit: String,
    /// Extra destination for removals made by comment moderators
    pub removals_subreddit: Option<String>,
    pub link_host: String,
    pub skip_rules: Vec<SkipRule>,
    /// Fetch and build everything but never submit
    pub dry_run: bool,
}

/// Settings for the polling loop.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub source_subreddit: String,
    pub batch_limit: usize,
    pub interval: Duration,
}

/// How comment moderators are recognised among the source subreddit's moderators.
#[derive(Debug, Clone)]
pub struct CommentModPolicy {
    /// A comment moderator has exactly this permission set
    pub permissions: Vec<String>,
    /// Moderators never treated as comment moderators
    pub whitelist: Vec<String>,
    pub refresh_every: Duration,
}
