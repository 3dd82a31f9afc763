// Application configuration.
//
// Values come from an optional JSON file (`MIRROR_CONFIG`, default `config.json`)
// and are then overridden by environment variables, so deployments can keep
// secrets out of the file entirely.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::mirror::{CommentModPolicy, ForwardSettings, PollSettings, SkipRule};
use crate::infra::reddit::RedditCredentials;

const DEFAULT_CONFIG_PATH: &str = "config.json";
const COMMENT_MOD_REFRESH: Duration = Duration::from_secs(60 * 60 * 24);

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub reddit: RedditCredentials,
    #[serde(default, alias = "target_sub")]
    pub source_subreddit: String,
    #[serde(default, alias = "destination_sub")]
    pub destination_subreddit: String,
    #[serde(default)]
    pub removals_subreddit: Option<String>,
    #[serde(default = "default_polling_interval_ms", alias = "polling_interval")]
    pub polling_interval_ms: u64,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_skip_moderators")]
    pub skip_moderators: Vec<String>,
    #[serde(default = "default_skip_details")]
    pub skip_details: Vec<String>,
    #[serde(default = "default_link_host")]
    pub link_host: String,
    #[serde(default = "default_comment_mod_permissions")]
    pub comment_mod_permissions: Vec<String>,
    #[serde(default)]
    pub comment_mod_whitelist: Vec<String>,
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
}

fn default_polling_interval_ms() -> u64 {
    60_000
}

fn default_batch_limit() -> usize {
    15
}

fn default_skip_moderators() -> Vec<String> {
    SkipRule::defaults()
        .into_iter()
        .filter_map(|rule| match rule {
            SkipRule::Moderator(name) => Some(name),
            SkipRule::Details(_) => None,
        })
        .collect()
}

fn default_skip_details() -> Vec<String> {
    SkipRule::defaults()
        .into_iter()
        .filter_map(|rule| match rule {
            SkipRule::Details(details) => Some(details),
            SkipRule::Moderator(_) => None,
        })
        .collect()
}

fn default_link_host() -> String {
    "https://np.reddit.com".to_string()
}

fn default_comment_mod_permissions() -> Vec<String> {
    vec!["posts".to_string(), "mail".to_string(), "wiki".to_string()]
}

/// Look up and parse a typed override. Unparseable values are logged and
/// the current setting is kept.
fn parse_override<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "Ignoring unparseable config override");
    }
    parsed
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reddit: RedditCredentials::default(),
            source_subreddit: String::new(),
            destination_subreddit: String::new(),
            removals_subreddit: None,
            polling_interval_ms: default_polling_interval_ms(),
            batch_limit: default_batch_limit(),
            dry_run: false,
            skip_moderators: default_skip_moderators(),
            skip_details: default_skip_details(),
            link_host: default_link_host(),
            comment_mod_permissions: default_comment_mod_permissions(),
            comment_mod_whitelist: Vec::new(),
            discord_webhook_url: None,
        }
    }
}

impl AppConfig {
    /// Load from the config file (if any) and the process environment.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("MIRROR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file. A missing file yields the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Override fields from environment-style variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        };

        set(&mut self.reddit.client_id, "REDDIT_CLIENT_ID");
        set(&mut self.reddit.client_secret, "REDDIT_CLIENT_SECRET");
        set(&mut self.reddit.username, "REDDIT_USERNAME");
        set(&mut self.reddit.password, "REDDIT_PASSWORD");
        set(&mut self.reddit.user_agent, "REDDIT_USER_AGENT");
        set(&mut self.source_subreddit, "SOURCE_SUBREDDIT");
        set(&mut self.destination_subreddit, "DESTINATION_SUBREDDIT");

        if let Some(value) = lookup("REMOVALS_SUBREDDIT") {
            self.removals_subreddit = Some(value).filter(|v| !v.is_empty());
        }
        if let Some(value) = lookup("DISCORD_WEBHOOK_URL") {
            self.discord_webhook_url = Some(value).filter(|v| !v.is_empty());
        }
        if let Some(value) = parse_override(&lookup, "POLLING_INTERVAL_MS", |v| v.parse().ok()) {
            self.polling_interval_ms = value;
        }
        if let Some(value) = parse_override(&lookup, "BATCH_LIMIT", |v| v.parse().ok()) {
            self.batch_limit = value;
        }
        if let Some(value) = parse_override(&lookup, "DRY_RUN", parse_flag) {
            self.dry_run = value;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("REDDIT_CLIENT_ID", &self.reddit.client_id),
            ("REDDIT_CLIENT_SECRET", &self.reddit.client_secret),
            ("REDDIT_USERNAME", &self.reddit.username),
            ("REDDIT_PASSWORD", &self.reddit.password),
            ("SOURCE_SUBREDDIT", &self.source_subreddit),
            ("DESTINATION_SUBREDDIT", &self.destination_subreddit),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                bail!("Missing {} (set it in the environment or the config file)", key);
            }
        }

        if self.polling_interval_ms == 0 {
            bail!("POLLING_INTERVAL_MS must be positive");
        }
        if self.batch_limit == 0 {
            bail!("BATCH_LIMIT must be positive");
        }
        Ok(())
    }

    pub fn skip_rules(&self) -> Vec<SkipRule> {
        self.skip_details
            .iter()
            .cloned()
            .map(SkipRule::Details)
            .chain(self.skip_moderators.iter().cloned().map(SkipRule::Moderator))
            .collect()
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            source_subreddit: self.source_subreddit.clone(),
            batch_limit: self.batch_limit,
            interval: Duration::from_millis(self.polling_interval_ms),
        }
    }

    pub fn forward_settings(&self) -> ForwardSettings {
        ForwardSettings {
            destination_subreddit: self.destination_subreddit.clone(),
            removals_subreddit: self.removals_subreddit.clone(),
            link_host: self.link_host.clone(),
            skip_rules: self.skip_rules(),
            dry_run: self.dry_run,
        }
    }

    /// Only needed when there is a removals subreddit to feed.
    pub fn comment_mod_policy(&self) -> Option<CommentModPolicy> {
        self.removals_subreddit.as_ref().map(|_| CommentModPolicy {
            permissions: self.comment_mod_permissions.clone(),
            whitelist: self.comment_mod_whitelist.clone(),
            refresh_every: COMMENT_MOD_REFRESH,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.polling_interval_ms, 60_000);
        assert_eq!(config.batch_limit, 15);
        assert!(!config.dry_run);
        assert_eq!(config.link_host, "https://np.reddit.com");
        assert_eq!(config.skip_rules(), SkipRule::defaults());
        assert!(config.comment_mod_policy().is_none());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_then_env_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "reddit": {{"client_id": "id", "client_secret": "secret",
                           "username": "bot", "password": "file-pass"}},
                "target_sub": "collapse",
                "destination_sub": "collapse_wilds",
                "polling_interval": 30000,
                "comment_mod_whitelist": ["StatementBot"]
            }}"#
        )
        .unwrap();

        let mut config = AppConfig::from_file(file.path()).unwrap();
        let vars = env(&[
            ("REDDIT_PASSWORD", "env-pass"),
            ("REMOVALS_SUBREDDIT", "collapseremovals"),
            ("DRY_RUN", "true"),
            ("BATCH_LIMIT", "not a number"),
        ]);
        config.apply_overrides(|key| vars.get(key).cloned());

        assert!(config.validate().is_ok());
        assert_eq!(config.reddit.password, "env-pass");
        assert_eq!(config.source_subreddit, "collapse");
        assert_eq!(config.batch_limit, 15);
        assert!(config.dry_run);

        let poll = config.poll_settings();
        assert_eq!(poll.interval, Duration::from_millis(30_000));

        let forward = config.forward_settings();
        assert_eq!(forward.destination_subreddit, "collapse_wilds");
        assert_eq!(forward.removals_subreddit.as_deref(), Some("collapseremovals"));

        let policy = config.comment_mod_policy().unwrap();
        assert_eq!(policy.whitelist, vec!["StatementBot".to_string()]);
        assert_eq!(policy.permissions.len(), 3);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_owned();
        drop(tmp);

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.batch_limit, 15);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        assert!(AppConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_validation_names_missing_key() {
        let mut config = AppConfig::default();
        let vars = env(&[
            ("REDDIT_CLIENT_ID", "id"),
            ("REDDIT_CLIENT_SECRET", "secret"),
            ("REDDIT_USERNAME", "bot"),
            ("REDDIT_PASSWORD", "pass"),
            ("SOURCE_SUBREDDIT", "source"),
        ]);
        config.apply_overrides(|key| vars.get(key).cloned());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("DESTINATION_SUBREDDIT"));

        config.destination_subreddit = "mirror".to_string();
        config.polling_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overriding_one_skip_list_keeps_the_other_default() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"skip_moderators": ["SpamBot"]}}"#).unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();

        assert_eq!(
            config.skip_rules(),
            vec![
                SkipRule::Details("confirm_spam".to_string()),
                SkipRule::Moderator("SpamBot".to_string()),
            ]
        );
    }

    #[test]
    fn test_dry_run_accepts_common_flag_spellings() {
        for (raw, expected) in [("1", true), ("yes", true), ("ON", true), ("0", false), ("no", false)] {
            let mut config = AppConfig {
                dry_run: !expected,
                ..AppConfig::default()
            };
            let vars = env(&[("DRY_RUN", raw)]);
            config.apply_overrides(|key| vars.get(key).cloned());
            assert_eq!(config.dry_run, expected, "DRY_RUN={}", raw);
        }
    }

    #[test]
    fn test_unparseable_overrides_keep_current_values() {
        let mut config = AppConfig {
            polling_interval_ms: 30_000,
            batch_limit: 25,
            dry_run: true,
            ..AppConfig::default()
        };
        let vars = env(&[
            ("POLLING_INTERVAL_MS", "1m"),
            ("BATCH_LIMIT", "-5"),
            ("DRY_RUN", "maybe"),
        ]);
        config.apply_overrides(|key| vars.get(key).cloned());

        assert_eq!(config.polling_interval_ms, 30_000);
        assert_eq!(config.batch_limit, 25);
        assert!(config.dry_run);
    }
}
