// Core mirror module - watches a moderation log and reposts removed submissions.
// Following the same layout as the other core modules: models, ports + service, loop.

pub mod comment_mods;
pub mod mirror_models;
pub mod mirror_service;
pub mod poll_scheduler;

pub use comment_mods::CommentModRoster;
pub use mirror_models::*;
pub use mirror_service::*;
pub use poll_scheduler::PollScheduler;
