// Configuration loading (JSON file + environment overrides).

pub mod app_config;

pub use app_config::AppConfig;
