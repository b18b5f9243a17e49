//! Common utilities and shared types for tunepoll.
//!
//! This crate provides foundational components used across all tunepoll crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`], [`AppResult`]
//!   and the domain [`Rejection`]s reported back to Slack users
//! - **Cache**: Read-through document caches ([`MemoryCache`], [`RedisCache`])
//! - **Signing**: Slack request verification and sealed OAuth state
//!
//! # Example
//!
//! ```no_run
//! use tunepoll_common::{AppResult, Config};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     println!("Listening on port {}", config.server.port);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod signing;

pub use cache::{DocumentCache, MemoryCache, NoCache, RedisCache};
pub use config::{CacheBackend, Config};
pub use error::{AppError, AppResult, Rejection};
pub use signing::{OAuthState, slack_signature, verify_slack_signature};
