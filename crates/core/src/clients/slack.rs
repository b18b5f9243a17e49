//! Slack Web API client.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use tunepoll_common::config::SlackConfig;
use tunepoll_common::{AppError, AppResult};

use super::chat::{ChatClient, SlackUser};
use crate::services::{InstallationService, SlackInstallation};

/// Every Web API response carries `ok` and, on failure, `error`.
#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    rest: Value,
}

/// Slack Web API client using each team's bot token.
#[derive(Clone)]
pub struct SlackClient {
    http_client: reqwest::Client,
    config: SlackConfig,
    installations: InstallationService,
}

impl SlackClient {
    /// Create a new Slack client.
    #[must_use]
    pub fn new(config: SlackConfig, installations: InstallationService) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
            installations,
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.config.api_base.trim_end_matches('/'))
    }

    async fn bot_token(&self, team_id: &str) -> AppResult<String> {
        self.installations
            .find(None, team_id, None)
            .await?
            .map(|installation| installation.bot_token)
            .ok_or_else(|| AppError::NotFound(format!("Slack installation for team {team_id}")))
    }

    async fn read<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> AppResult<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Slack {method} error: {status} - {body}"
            )));
        }

        let envelope: Envelope = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse Slack {method} response: {e}"))
        })?;

        if !envelope.ok {
            return Err(AppError::ExternalService(format!(
                "Slack {method} failed: {}",
                envelope.error.unwrap_or_else(|| "unknown_error".to_string())
            )));
        }

        serde_json::from_value(envelope.rest).map_err(|e| {
            AppError::ExternalService(format!("Unexpected Slack {method} response: {e}"))
        })
    }

    async fn post_json(&self, team_id: &str, method: &str, body: Value) -> AppResult<Value> {
        let token = self.bot_token(team_id).await?;
        let response = self
            .http_client
            .post(self.url(method))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Slack {method} request failed: {e}")))?;

        debug!(team_id = %team_id, method, "Called Slack API");
        Self::read(method, response).await
    }

    /// Complete an OAuth v2 install by exchanging `code`.
    pub async fn oauth_v2_access(&self, code: &str, redirect_uri: &str) -> AppResult<SlackInstallation> {
        #[derive(Deserialize)]
        struct Named {
            id: String,
        }

        #[derive(Deserialize)]
        struct AuthedUser {
            id: String,
            #[serde(default)]
            access_token: Option<String>,
        }

        #[derive(Deserialize)]
        struct OAuthAccess {
            access_token: String,
            #[serde(default)]
            scope: String,
            bot_user_id: String,
            team: Named,
            #[serde(default)]
            enterprise: Option<Named>,
            authed_user: AuthedUser,
            #[serde(default)]
            is_enterprise_install: bool,
        }

        let response = self
            .http_client
            .post(self.url("oauth.v2.access"))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Slack oauth.v2.access request failed: {e}")))?;

        let access: OAuthAccess = Self::read("oauth.v2.access", response).await?;

        Ok(SlackInstallation {
            enterprise_id: access.enterprise.map(|e| e.id),
            team_id: access.team.id,
            user_id: access.authed_user.id,
            bot_token: access.access_token,
            bot_user_id: access.bot_user_id,
            bot_scopes: access
                .scope
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            user_token: access.authed_user.access_token,
            is_enterprise_install: access.is_enterprise_install,
            installed_at: Utc::now(),
        })
    }

    /// URL of Slack's authorize page for this app.
    pub fn install_url(&self, redirect_uri: &str) -> AppResult<String> {
        let mut url = url::Url::parse("https://slack.com/oauth/v2/authorize")
            .map_err(|e| AppError::Internal(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("scope", &self.config.scopes.join(","))
            .append_pair("redirect_uri", redirect_uri);
        Ok(url.into())
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn users_info(&self, team_id: &str, user_id: &str) -> AppResult<SlackUser> {
        #[derive(Deserialize)]
        struct UsersInfo {
            user: SlackUser,
        }

        let token = self.bot_token(team_id).await?;
        let response = self
            .http_client
            .post(self.url("users.info"))
            .bearer_auth(token)
            .form(&[("user", user_id)])
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Slack users.info request failed: {e}")))?;

        let info: UsersInfo = Self::read("users.info", response).await?;
        Ok(info.user)
    }

    async fn publish_view(&self, team_id: &str, user_id: &str, view: Value) -> AppResult<()> {
        self.post_json(team_id, "views.publish", json!({ "user_id": user_id, "view": view }))
            .await?;
        Ok(())
    }

    async fn open_modal(&self, team_id: &str, trigger_id: &str, view: Value) -> AppResult<()> {
        self.post_json(team_id, "views.open", json!({ "trigger_id": trigger_id, "view": view }))
            .await?;
        Ok(())
    }

    async fn post_message(&self, team_id: &str, channel: &str, text: &str) -> AppResult<()> {
        self.post_json(team_id, "chat.postMessage", json!({ "channel": channel, "text": text }))
            .await?;
        Ok(())
    }
}
