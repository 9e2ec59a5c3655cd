use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use pollbot_core::config::MattermostConfig;

/// Shown in place of voter names when the lookup fails.
pub const UNRESOLVED_USERNAMES: &str = "<Failed to resolve usernames>";

/// User and team lookups against the chat platform.
///
/// Lookups never fail the request: implementations fall back to English, no
/// elevated rights and a placeholder name list.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_locale(&self, user_id: &str) -> String;
    async fn is_admin_user(&self, user_id: &str) -> bool;
    async fn is_team_admin(&self, user_id: &str, team_id: &str) -> bool;
    async fn resolve_usernames(&self, user_ids: &[String]) -> Vec<String>;
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("no personal access token configured")]
    MissingToken,
    #[error("request to `{url}` failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("`{url}` returned status {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    #[serde(default)]
    username: String,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    roles: String,
}

#[derive(Debug, Deserialize)]
struct TeamMemberRecord {
    #[serde(default)]
    roles: String,
}

/// `UserDirectory` backed by the Mattermost v4 REST API.
#[derive(Clone)]
pub struct MattermostDirectory {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl MattermostDirectory {
    pub fn new(config: &MattermostConfig) -> Result<Self, reqwest::Error> {
        let client =
            Client::builder().timeout(Duration::from_secs(config.timeout_secs.max(1))).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.personal_access_token.clone(),
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    async fn get<T>(&self, path: &str) -> Result<T, DirectoryError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let token = self.token.as_ref().ok_or(DirectoryError::MissingToken)?;
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|source| DirectoryError::Request { url: url.clone(), source })?;

        if !response.status().is_success() {
            return Err(DirectoryError::Status { url, status: response.status().as_u16() });
        }
        response.json::<T>().await.map_err(|source| DirectoryError::Request { url, source })
    }

    async fn fetch_user(&self, user_id: &str) -> Result<UserRecord, DirectoryError> {
        self.get(&format!("/api/v4/users/{user_id}")).await
    }

    async fn fetch_team_member(
        &self,
        user_id: &str,
        team_id: &str,
    ) -> Result<TeamMemberRecord, DirectoryError> {
        self.get(&format!("/api/v4/teams/{team_id}/members/{user_id}")).await
    }

    async fn fetch_usernames(&self, user_ids: &[String]) -> Result<Vec<String>, DirectoryError> {
        let token = self.token.as_ref().ok_or(DirectoryError::MissingToken)?;
        let url = format!("{}/api/v4/users/ids", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(user_ids)
            .send()
            .await
            .map_err(|source| DirectoryError::Request { url: url.clone(), source })?;

        if !response.status().is_success() {
            return Err(DirectoryError::Status { url, status: response.status().as_u16() });
        }
        let users: Vec<UserRecord> = response
            .json()
            .await
            .map_err(|source| DirectoryError::Request { url, source })?;
        Ok(users.into_iter().map(|user| user.username).collect())
    }
}

fn has_role(roles: &str, role: &str) -> bool {
    roles.split_whitespace().any(|candidate| candidate == role)
}

#[async_trait]
impl UserDirectory for MattermostDirectory {
    async fn user_locale(&self, user_id: &str) -> String {
        if !self.has_token() {
            return "en".to_string();
        }
        match self.fetch_user(user_id).await {
            Ok(user) => user
                .locale
                .filter(|locale| !locale.trim().is_empty())
                .unwrap_or_else(|| "en".to_string()),
            Err(error) => {
                warn!(
                    event_name = "mattermost.user.lookup_failed",
                    user_id,
                    error = %error,
                    "falling back to default locale"
                );
                "en".to_string()
            }
        }
    }

    async fn is_admin_user(&self, user_id: &str) -> bool {
        if !self.has_token() {
            return false;
        }
        match self.fetch_user(user_id).await {
            Ok(user) => has_role(&user.roles, "system_admin"),
            Err(error) => {
                warn!(
                    event_name = "mattermost.user.lookup_failed",
                    user_id,
                    error = %error,
                    "treating user as non-admin"
                );
                false
            }
        }
    }

    async fn is_team_admin(&self, user_id: &str, team_id: &str) -> bool {
        if !self.has_token() {
            return false;
        }
        match self.fetch_team_member(user_id, team_id).await {
            Ok(member) => has_role(&member.roles, "team_admin"),
            Err(error) => {
                warn!(
                    event_name = "mattermost.team_member.lookup_failed",
                    user_id,
                    team_id,
                    error = %error,
                    "treating user as non-team-admin"
                );
                false
            }
        }
    }

    async fn resolve_usernames(&self, user_ids: &[String]) -> Vec<String> {
        if user_ids.is_empty() {
            return Vec::new();
        }
        match self.fetch_usernames(user_ids).await {
            Ok(usernames) => usernames,
            Err(error) => {
                warn!(
                    event_name = "mattermost.usernames.lookup_failed",
                    count = user_ids.len(),
                    error = %error,
                    "username query failed"
                );
                vec![UNRESOLVED_USERNAMES.to_string()]
            }
        }
    }
}
