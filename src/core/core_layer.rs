// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "mirror/mod.rs"]
pub mod mirror;
