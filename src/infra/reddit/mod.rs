// Reddit infra layer.
// - `reddit_client.rs` talks to Reddit's OAuth HTTP API.

#[path = "reddit_client.rs"]
pub mod reddit_client;

pub use reddit_client::{RedditApiClient, RedditCredentials};
