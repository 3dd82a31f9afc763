use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::core::mirror::{
    LinkSubmission, MirrorError, ModLogQuery, ModerationEvent, Moderator, RedditClient,
    Submission,
};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const OAUTH_BASE_URL: &str = "https://oauth.reddit.com";

/// Script-app credentials for Reddit's password grant.
#[derive(Debug, Clone, Deserialize)]
pub struct RedditCredentials {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    format!("removal_mirror_bot/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for RedditCredentials {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
            user_agent: default_user_agent(),
        }
    }
}

/// Cached bearer token with expiration.
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Minimal Reddit OAuth API client. It only exposes the calls the mirror needs.
pub struct RedditApiClient {
    client: Client,
    credentials: RedditCredentials,
    token_url: String,
    base_url: String,
    cached_token: RwLock<Option<CachedToken>>,
}

impl RedditApiClient {
    pub fn new(credentials: RedditCredentials) -> Result<Self, MirrorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&credentials.user_agent)
                .map_err(|e| MirrorError::Api(e.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| MirrorError::Api(e.to_string()))?;

        Ok(Self {
            client,
            credentials,
            token_url: TOKEN_URL.to_string(),
            base_url: OAUTH_BASE_URL.to_string(),
            cached_token: RwLock::new(None),
        })
    }

    /// Gets a valid access token, refreshing if necessary.
    async fn access_token(&self) -> Result<String, MirrorError> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Utc::now() + Duration::seconds(60) {
                    return Ok(token.token.clone());
                }
            }
        }

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MirrorError::Api(e.to_string()))?;

        let token: ApiToken = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| MirrorError::Decode(e.to_string()))?;

        // Reddit reports bad credentials with a 200 and an `error` field
        let access_token = match (token.access_token, token.error) {
            (Some(access_token), None) => access_token,
            (_, Some(error)) => return Err(MirrorError::Auth(error)),
            (None, None) => {
                return Err(MirrorError::Auth(
                    "token response had no access_token".to_string(),
                ))
            }
        };

        tracing::debug!(expires_in = token.expires_in, "Refreshed Reddit access token");

        let mut cached = self.cached_token.write().await;
        *cached = Some(CachedToken {
            token: access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        });

        Ok(access_token)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MirrorError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .query(query)
            .query(&[("raw_json", "1")])
            .send()
            .await
            .map_err(|e| MirrorError::Api(e.to_string()))?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| MirrorError::Decode(e.to_string()))
    }
}

/// Turn non-2xx responses into classified errors.
async fn check_status(response: Response) -> Result<Response, MirrorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &format!("{} for {}: {}", status, url, body)))
}

fn classify_status(status: StatusCode, message: &str) -> MirrorError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MirrorError::Auth(message.to_string()),
        StatusCode::TOO_MANY_REQUESTS => MirrorError::RateLimited(message.to_string()),
        StatusCode::NOT_FOUND => MirrorError::NotFound(message.to_string()),
        _ => MirrorError::Api(message.to_string()),
    }
}

#[async_trait]
impl RedditClient for RedditApiClient {
    async fn fetch_mod_log(
        &self,
        subreddit: &str,
        query: &ModLogQuery,
    ) -> Result<Vec<ModerationEvent>, MirrorError> {
        let mut params = vec![("limit", query.limit.to_string())];
        if let Some(action) = &query.action {
            params.push(("type", action.clone()));
        }

        let listing: Listing<Thing<ApiModAction>> = self
            .get_json(&format!("/r/{}/about/log", subreddit), &params)
            .await?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|thing| thing.data.into())
            .collect())
    }

    async fn fetch_submission(&self, id: &str) -> Result<Submission, MirrorError> {
        let fullname = format!("t3_{}", id);
        let listing: Listing<Thing<ApiSubmission>> = self
            .get_json("/api/info", &[("id", fullname.clone())])
            .await?;

        listing
            .data
            .children
            .into_iter()
            .next()
            .map(|thing| thing.data.into())
            .ok_or(MirrorError::NotFound(fullname))
    }

    async fn submit_link(
        &self,
        subreddit: &str,
        link: &LinkSubmission,
    ) -> Result<(), MirrorError> {
        let token = self.access_token().await?;
        let send_replies = link.send_replies.to_string();

        let response = self
            .client
            .post(format!("{}/api/submit", self.base_url))
            .bearer_auth(token)
            .form(&[
                ("api_type", "json"),
                ("kind", "link"),
                ("sr", subreddit),
                ("title", link.title.as_str()),
                ("url", link.url.as_str()),
                ("sendreplies", send_replies.as_str()),
                ("resubmit", "true"),
            ])
            .send()
            .await
            .map_err(|e| MirrorError::Api(e.to_string()))?;

        let result: ApiSubmitResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| MirrorError::Decode(e.to_string()))?;

        result.into_result()
    }

    async fn list_moderators(&self, subreddit: &str) -> Result<Vec<Moderator>, MirrorError> {
        let listing: Listing<ApiModerator> = self
            .get_json(&format!("/r/{}/about/moderators", subreddit), &[])
            .await?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|m| Moderator {
                name: m.name,
                permissions: m.mod_permissions,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct ApiToken {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    children: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ApiModAction {
    created_utc: f64,
    #[serde(default)]
    action: String,
    #[serde(rename = "mod", default)]
    moderator: String,
    #[serde(default)]
    target_fullname: Option<String>,
    #[serde(default)]
    target_title: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl From<ApiModAction> for ModerationEvent {
    fn from(api: ApiModAction) -> Self {
        ModerationEvent {
            created_utc: api.created_utc as i64,
            action: api.action,
            moderator: api.moderator,
            target_fullname: api.target_fullname.unwrap_or_default(),
            target_title: api.target_title.unwrap_or_default(),
            details: api.details.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiSubmission {
    #[serde(default)]
    score: i64,
    title: String,
    permalink: String,
}

impl From<ApiSubmission> for Submission {
    fn from(api: ApiSubmission) -> Self {
        Submission {
            score: api.score,
            title: api.title,
            permalink: api.permalink,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiModerator {
    name: String,
    #[serde(default)]
    mod_permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSubmitResponse {
    json: ApiSubmitBody,
}

#[derive(Debug, Deserialize)]
struct ApiSubmitBody {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
}

impl ApiSubmitResponse {
    /// Reddit returns validation failures as `[code, message, field]` triples.
    fn into_result(self) -> Result<(), MirrorError> {
        if self.json.errors.is_empty() {
            return Ok(());
        }

        let reasons = self
            .json
            .errors
            .iter()
            .map(|error| {
                error
                    .iter()
                    .filter_map(|part| part.as_str())
                    .collect::<Vec<_>>()
                    .join(": ")
            })
            .collect::<Vec<_>>()
            .join("; ");
        Err(MirrorError::Submit(reasons))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mod_log_listing_maps_to_events() {
        let body = r#"{
            "kind": "Listing",
            "data": {
                "children": [
                    {"kind": "modaction", "data": {
                        "created_utc": 1700000300.0, "action": "removelink",
                        "mod": "human", "target_fullname": "t3_ccc",
                        "target_title": "Third", "details": "remove"
                    }},
                    {"kind": "modaction", "data": {
                        "created_utc": 1700000200.0, "action": "removelink",
                        "mod": "AutoModerator", "target_fullname": "t3_bbb",
                        "target_title": null, "details": null
                    }}
                ]
            }
        }"#;

        let listing: Listing<Thing<ApiModAction>> = serde_json::from_str(body).unwrap();
        let events: Vec<ModerationEvent> = listing
            .data
            .children
            .into_iter()
            .map(|t| t.data.into())
            .collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].created_utc, 1700000300);
        assert_eq!(events[0].moderator, "human");
        assert_eq!(events[0].target_fullname, "t3_ccc");
        assert_eq!(events[1].details, "");
        assert_eq!(events[1].target_title, "");
    }

    #[test]
    fn test_submission_listing_maps_to_submission() {
        let body = r#"{"kind": "Listing", "data": {"children": [
            {"kind": "t3", "data": {"score": 42, "title": "Hello",
             "permalink": "/r/x/comments/1/hello/", "num_comments": 3}}
        ]}}"#;

        let listing: Listing<Thing<ApiSubmission>> = serde_json::from_str(body).unwrap();
        let submission: Submission = listing.data.children.into_iter().next().unwrap().data.into();

        assert_eq!(submission.score, 42);
        assert_eq!(submission.title, "Hello");
        assert_eq!(submission.permalink, "/r/x/comments/1/hello/");
    }

    #[test]
    fn test_submit_errors_are_reported() {
        let ok: ApiSubmitResponse =
            serde_json::from_str(r#"{"json": {"errors": [], "data": {"id": "abc"}}}"#).unwrap();
        assert!(ok.into_result().is_ok());

        let rejected: ApiSubmitResponse = serde_json::from_str(
            r#"{"json": {"errors": [["SUBREDDIT_NOEXIST", "that subreddit doesn't exist", "sr"]]}}"#,
        )
        .unwrap();
        match rejected.into_result() {
            Err(MirrorError::Submit(reason)) => {
                assert_eq!(reason, "SUBREDDIT_NOEXIST: that subreddit doesn't exist: sr")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_moderator_list_parses_permissions() {
        let body = r#"{"kind": "UserList", "data": {"children": [
            {"name": "alice", "id": "t2_1", "mod_permissions": ["posts", "mail", "wiki"]},
            {"name": "AutoModerator", "id": "t2_2", "mod_permissions": ["all"]}
        ]}}"#;

        let listing: Listing<ApiModerator> = serde_json::from_str(body).unwrap();

        assert_eq!(listing.data.children[0].mod_permissions.len(), 3);
        assert_eq!(listing.data.children[1].name, "AutoModerator");
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, "x").kind(),
            "AuthError"
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "x").kind(),
            "RateLimitError"
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, "x").kind(),
            "NotFoundError"
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, "x").kind(),
            "ApiError"
        );
    }

    #[test]
    fn test_token_error_field_is_parsed() {
        let token: ApiToken = serde_json::from_str(r#"{"error": "invalid_grant"}"#).unwrap();
        assert!(token.access_token.is_none());
        assert_eq!(token.error.as_deref(), Some("invalid_grant"));
    }
}
