//! Clients for the chat platform and music service.

#![allow(missing_docs)]

pub mod chat;
pub mod music;
pub mod slack;
pub mod spotify;

pub use chat::{ChatClient, SlackProfile, SlackUser};
pub use music::{MusicCatalog, TrackMetadata};
pub use slack::SlackClient;
pub use spotify::{SpotifyClient, TokenGrant};
