//! API key management on `/keys/`.

use super::api_client::{ApiClient, ApiRequest};
use crate::error::Result;
use crate::models::api_key::ApiKeyCreate;
use crate::models::{ApiKey, ApiKeyCreated, ApiKeyUpdate};

const KEYS: &str = "/keys/";

/// Client for the signed-in user's API keys.
#[derive(Clone)]
pub struct ApiKeysApi {
    client: ApiClient,
}

impl ApiKeysApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Keys owned by the current user, newest first.
    pub async fn list(&self) -> Result<Vec<ApiKey>> {
        self.client.send(ApiRequest::get(KEYS)).await
    }

    /// Create a key. The returned secret is shown only once.
    pub async fn create(&self, name: &str) -> Result<ApiKeyCreated> {
        let created: ApiKeyCreated = self
            .client
            .send(ApiRequest::post(KEYS).json(&ApiKeyCreate { name })?)
            .await?;
        tracing::info!(key_id = %created.id, prefix = %created.prefix, "API key created");
        Ok(created)
    }

    pub async fn get(&self, id: &str) -> Result<ApiKey> {
        self.client.send(ApiRequest::get(key_path(id))).await
    }

    pub async fn update(&self, id: &str, update: &ApiKeyUpdate) -> Result<ApiKey> {
        self.client
            .send(ApiRequest::patch(key_path(id)).json(update)?)
            .await
    }

    /// Deactivate without deleting, keeping the key's history.
    pub async fn revoke(&self, id: &str) -> Result<ApiKey> {
        let update = ApiKeyUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        self.update(id, &update).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.client
            .send_empty(ApiRequest::delete(key_path(id)))
            .await?;
        tracing::info!(key_id = %id, "API key deleted");
        Ok(())
    }
}

fn key_path(id: &str) -> String {
    format!("{}{}/", KEYS, id.trim_matches('/'))
}
