//! HTTP layer for tunepoll.
//!
//! This crate receives everything Slack and Spotify send to the app:
//!
//! - **Endpoints**: Events API, interactivity, OAuth installs, health check
//! - **Middleware**: Slack request signature verification
//! - **Views**: Block Kit rendering of the home tab and modals
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod middleware;
pub mod views;

pub use endpoints::router;
pub use middleware::AppState;
