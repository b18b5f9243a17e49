//! Business logic services.

#![allow(missing_docs)]

pub mod installation;
pub mod poll;
pub mod spotify_installation;
pub mod user;

pub use installation::{InstallationService, SlackInstallation};
pub use poll::{Clock, Home, PollService};
pub use spotify_installation::{SpotifyInstallation, SpotifyInstallationService};
pub use user::UserService;
