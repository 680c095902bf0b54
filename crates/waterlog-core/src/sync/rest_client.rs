//! REST client for the cloud activity table.
//!
//! Talks to a PostgREST-style endpoint at `{url}/rest/v1/{table}`. Every
//! request carries the project key in `apikey` and a bearer token: the
//! signed-in user's access token when one exists, the project key otherwise.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::storage::RemoteConfig;
use crate::sync::ports::{AuthOracle, RemoteActivityStore};
use crate::sync::remote_codec::{format_cursor, RemoteActivity, RemoteActivityRow};
use crate::sync::types::SyncError;

/// [`RemoteActivityStore`] backed by HTTP.
pub struct RestActivityStore {
    config: RemoteConfig,
    auth: Arc<dyn AuthOracle>,
    http: reqwest::Client,
}

impl RestActivityStore {
    /// Build a client with the configured request timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: RemoteConfig, auth: Arc<dyn AuthOracle>) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self { config, auth, http })
    }

    fn table_url(&self) -> Result<String, SyncError> {
        if !self.config.is_configured() {
            return Err(SyncError::NotConfigured);
        }
        let base = url::Url::parse(self.config.url.trim())?;
        Ok(format!(
            "{}/rest/v1/{}",
            base.as_str().trim_end_matches('/'),
            urlencoding::encode(&self.config.table)
        ))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self
            .auth
            .access_token()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.config.api_key.clone());
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(token)
    }
}

/// Turn a non-2xx response into [`SyncError::Rejected`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteActivityStore for RestActivityStore {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn insert(&self, activity: &RemoteActivity) -> Result<RemoteActivityRow, SyncError> {
        let url = self.table_url()?;
        let response = self
            .authorized(self.http.post(&url))
            .header("Prefer", "return=representation")
            .json(activity)
            .send()
            .await?;
        let response = check_status(response).await?;

        // PostgREST answers with an array of the inserted rows.
        let body: serde_json::Value = response.json().await?;
        let row = match body {
            serde_json::Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
            serde_json::Value::Object(_) => body,
            other => {
                return Err(SyncError::MalformedResponse(format!(
                    "insert returned no row: {other}"
                )))
            }
        };
        Ok(serde_json::from_value(row)?)
    }

    async fn query_synced_after(
        &self,
        user_id: &str,
        cursor: DateTime<Utc>,
    ) -> Result<Vec<RemoteActivityRow>, SyncError> {
        let mut url = self.table_url()?;
        let params = [
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("synced_at", format!("gt.{}", format_cursor(cursor))),
            ("order", "synced_at.asc".to_string()),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.push('?');
        url.push_str(&query);

        let response = self.authorized(self.http.get(&url)).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}
