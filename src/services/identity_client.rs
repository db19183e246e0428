//! Identity provider client
//!
//! Users are owned by the platform identity service; this module is the
//! narrow read interface the messaging core consumes: profile lookup and
//! existence checks when conversations are created or members added.
//!
//! The provider is optional in `AppState`. When it is not configured the
//! existence checks are skipped with a warning so the service keeps working
//! in degraded environments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<UserProfile>>;

    async fn user_exists(&self, user_id: Uuid) -> AppResult<bool> {
        Ok(self.get_user(user_id).await?.is_some())
    }
}

/// HTTP client against the identity service.
pub struct HttpIdentityClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpIdentityClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityClient {
    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        let url = format!("{}/users/{}", self.base_url, user_id);
        let response = self.http.get(&url).send().await.map_err(|e| {
            tracing::error!(user_id = %user_id, error = %e, "identity service request failed");
            AppError::Unavailable(format!("identity service: {e}"))
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::Unavailable(format!(
                "identity service returned {}",
                response.status()
            )));
        }

        let profile = response
            .json::<UserProfile>()
            .await
            .map_err(|e| AppError::Unavailable(format!("identity service payload: {e}")))?;
        Ok(Some(profile))
    }
}

/// Validate that every id refers to a known user. Without a configured
/// provider the check degrades to a warning, matching how the rest of the
/// platform behaves during partial rollouts.
pub async fn ensure_users_exist(
    identity: Option<&Arc<dyn IdentityProvider>>,
    user_ids: &[Uuid],
) -> AppResult<()> {
    let Some(identity) = identity else {
        tracing::warn!("identity provider not configured, skipping user existence check");
        return Ok(());
    };

    for user_id in user_ids {
        if !identity.user_exists(*user_id).await? {
            return Err(AppError::BadRequest(format!(
                "User {} does not exist",
                user_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDirectory(Vec<Uuid>);

    #[async_trait]
    impl IdentityProvider for FixedDirectory {
        async fn get_user(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
            Ok(self.0.contains(&user_id).then(|| UserProfile {
                id: user_id,
                display_name: "someone".into(),
                avatar_url: None,
            }))
        }
    }

    #[tokio::test]
    async fn test_ensure_users_exist_rejects_unknown_ids() {
        let known = Uuid::new_v4();
        let unknown = Uuid::new_v4();
        let provider: Arc<dyn IdentityProvider> = Arc::new(FixedDirectory(vec![known]));

        assert!(ensure_users_exist(Some(&provider), &[known]).await.is_ok());
        let err = ensure_users_exist(Some(&provider), &[known, unknown])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_missing_provider_degrades_gracefully() {
        assert!(ensure_users_exist(None, &[Uuid::new_v4()]).await.is_ok());
    }
}
