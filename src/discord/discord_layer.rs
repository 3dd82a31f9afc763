// Discord layer - adapters that talk to Discord.

#[path = "alerts/mod.rs"]
pub mod alerts;
