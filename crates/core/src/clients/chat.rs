//! Chat platform client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tunepoll_common::AppResult;

use crate::models::{AppUser, Participation, user::USER_SCHEMA_VERSION};

/// Profile fields of a `users.info` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackProfile {
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub image_192: Option<String>,
}

/// The `user` object of a `users.info` response.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub tz: Option<String>,
    #[serde(default)]
    pub profile: SlackProfile,
}

impl SlackUser {
    /// Build a new app user from this profile.
    #[must_use]
    pub fn into_app_user(self, team_id: &str) -> AppUser {
        let real_name = if self.real_name.is_empty() {
            self.profile.real_name
        } else {
            self.real_name
        };
        AppUser {
            id: self.id,
            team_id: team_id.to_string(),
            name: self.name,
            real_name,
            is_admin: self.is_admin,
            is_owner: self.is_owner,
            is_bot: self.is_bot,
            tz: self.tz,
            image_url: self.profile.image_192,
            participation: Participation::default(),
            schema_version: USER_SCHEMA_VERSION,
        }
    }
}

/// Outbound calls to the chat platform, scoped by team.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Fetch a user's profile.
    async fn users_info(&self, team_id: &str, user_id: &str) -> AppResult<SlackUser>;

    /// Publish a view to a user's home tab.
    async fn publish_view(&self, team_id: &str, user_id: &str, view: Value) -> AppResult<()>;

    /// Open a modal in response to an interaction.
    async fn open_modal(&self, team_id: &str, trigger_id: &str, view: Value) -> AppResult<()>;

    /// Post a plain message to a channel or DM.
    async fn post_message(&self, team_id: &str, channel: &str, text: &str) -> AppResult<()>;
}
