//! Slack installation store.
//!
//! Installations are kept per team under `team/{team_id}/installations`:
//! one document per installer (`{enterprise}-{user}`) plus a `{enterprise}-latest`
//! document that is overwritten on every save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use tunepoll_common::AppResult;

use crate::store::{Aggregate, AggregateStore, Collection};

const NO_ENTERPRISE: &str = "none";

/// A completed Slack OAuth installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackInstallation {
    #[serde(default)]
    pub enterprise_id: Option<String>,
    pub team_id: String,
    /// User who ran the install.
    pub user_id: String,
    pub bot_token: String,
    pub bot_user_id: String,
    #[serde(default)]
    pub bot_scopes: Vec<String>,
    #[serde(default)]
    pub user_token: Option<String>,
    #[serde(default)]
    pub is_enterprise_install: bool,
    pub installed_at: DateTime<Utc>,
}

impl Aggregate for SlackInstallation {
    const COLLECTION: Collection = Collection::Installations;
}

fn doc_id(enterprise_id: Option<&str>, user: &str) -> String {
    format!("{}-{user}", enterprise_id.unwrap_or(NO_ENTERPRISE))
}

/// Persists and looks up Slack installations.
#[derive(Clone)]
pub struct InstallationService {
    store: AggregateStore<SlackInstallation>,
}

impl InstallationService {
    /// Create a new installation service.
    #[must_use]
    pub const fn new(store: AggregateStore<SlackInstallation>) -> Self {
        Self { store }
    }

    /// Save an installation and make it the team's latest.
    pub async fn save(&self, installation: &SlackInstallation) -> AppResult<()> {
        let enterprise_id = installation.enterprise_id.as_deref();
        let team_id = &installation.team_id;

        self.store
            .put(team_id, &doc_id(enterprise_id, &installation.user_id), installation)
            .await?;
        self.store
            .put(team_id, &doc_id(enterprise_id, "latest"), installation)
            .await?;

        info!(
            team_id = %team_id,
            user_id = %installation.user_id,
            enterprise_id = ?enterprise_id,
            "Saved Slack installation"
        );
        Ok(())
    }

    /// Find the installation made by `user_id`, or the team's latest when
    /// `user_id` is `None`.
    pub async fn find(
        &self,
        enterprise_id: Option<&str>,
        team_id: &str,
        user_id: Option<&str>,
    ) -> AppResult<Option<SlackInstallation>> {
        let id = doc_id(enterprise_id, user_id.unwrap_or("latest"));
        self.store.find(team_id, &id).await
    }
}
