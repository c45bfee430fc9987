use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use service_core::observability::TracedClientExt;
use uuid::Uuid;

use super::ProviderError;
use crate::config::RoleStoreSettings;
use crate::models::RoleRecord;

const ROLE_COLUMNS: &str = "id,name,email,role,is_active";

#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Single-row lookup by identity id. `Ok(None)` when no row exists.
    async fn role_record(&self, identity_id: Uuid) -> Result<Option<RoleRecord>, ProviderError>;
}

/// Reads role rows through a PostgREST-style data API.
pub struct RestRoleStore {
    client: Client,
    settings: RoleStoreSettings,
}

impl RestRoleStore {
    pub fn new(settings: RoleStoreSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }
}

#[async_trait]
impl RoleStore for RestRoleStore {
    async fn role_record(&self, identity_id: Uuid) -> Result<Option<RoleRecord>, ProviderError> {
        let url = format!(
            "{}/{}",
            self.settings.rest_url.trim_end_matches('/'),
            self.settings.table
        );
        let key = self.settings.api_key.expose_secret();
        let id_filter = format!("eq.{}", identity_id);

        let response = self
            .client
            .traced_get(&url)
            .query(&[
                ("id", id_filter.as_str()),
                ("select", ROLE_COLUMNS),
                ("limit", "1"),
            ])
            .header("apikey", key)
            .header("Accept", "application/json")
            .bearer_auth(key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url = %url, "Role lookup request failed");
                ProviderError::from(e)
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        let rows: Vec<RoleRecord> = response.json().await?;
        Ok(rows.into_iter().next())
    }
}
