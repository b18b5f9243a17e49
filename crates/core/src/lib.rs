//! Core business logic for tunepoll.
//!
//! - [`models`]: tracks, poll periods, the weekly poll and app users
//! - [`projector`]: what a user's home tab shows for a poll
//! - [`store`]: document persistence with revision-checked updates
//! - [`services`]: poll actions, user provisioning, installations
//! - [`clients`]: Slack and Spotify

pub mod clients;
pub mod models;
pub mod projector;
pub mod services;
pub mod store;

pub use services::*;
