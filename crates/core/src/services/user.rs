//! User service.

use std::sync::Arc;

use tracing::info;
use tunepoll_common::AppResult;

use crate::clients::ChatClient;
use crate::models::AppUser;
use crate::store::{Aggregate, AggregateStore, Collection};

impl Aggregate for AppUser {
    const COLLECTION: Collection = Collection::Users;

    fn upgrade(&mut self) {
        self.upgrade_schema();
    }
}

/// Looks up app users, provisioning them from Slack on first contact.
#[derive(Clone)]
pub struct UserService {
    store: AggregateStore<AppUser>,
    chat: Arc<dyn ChatClient>,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub fn new(store: AggregateStore<AppUser>, chat: Arc<dyn ChatClient>) -> Self {
        Self { store, chat }
    }

    pub async fn get(&self, team_id: &str, user_id: &str) -> AppResult<Option<AppUser>> {
        self.store.find(team_id, user_id).await
    }

    /// Get a user, fetching their profile from Slack if they are new.
    pub async fn get_or_create(&self, team_id: &str, user_id: &str) -> AppResult<AppUser> {
        if let Some(user) = self.store.find(team_id, user_id).await? {
            return Ok(user);
        }

        let profile = self.chat.users_info(team_id, user_id).await?;
        let fresh = profile.into_app_user(team_id);
        let user = self.store.get_or_create(team_id, user_id, || fresh).await?;

        info!(team_id = %team_id, user_id = %user_id, is_admin = user.is_admin, "Provisioned user");
        Ok(user)
    }

    /// Read-modify-write a stored user.
    pub async fn update<R, F>(&self, team_id: &str, user_id: &str, apply: F) -> AppResult<(AppUser, R)>
    where
        F: FnMut(&mut AppUser) -> AppResult<R> + Send,
        R: Send,
    {
        self.store.update(team_id, user_id, apply).await
    }
}
