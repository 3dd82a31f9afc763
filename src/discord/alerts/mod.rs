// Discord alert adapter - reports mirror errors to moderators.

#[path = "webhook_alerts.rs"]
pub mod webhook_alerts;

pub use webhook_alerts::WebhookAlerts;
