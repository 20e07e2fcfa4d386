use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::models::{AuthorizeResponse, RemoteState, RemoteStatePatch, SyncResponse};
use crate::error::ApiError;

/// The three calls the AutoLogout server exposes to a managing device.
#[async_trait]
pub trait StateService: Send + Sync {
    /// Full state of a managed computer
    async fn fetch_state(&self, id: &str, token: &str) -> Result<RemoteState, ApiError>;

    /// Exchange the parent password for a new auth key. Sent unauthenticated.
    async fn authorize(&self, id: &str, password: &str) -> Result<AuthorizeResponse, ApiError>;

    /// Submit a partial state. With `parent_mode` the server may override submitted
    /// values and report the overrides in the response delta.
    async fn sync_state(
        &self,
        id: &str,
        patch: &RemoteStatePatch,
        parent_mode: bool,
        token: &str,
    ) -> Result<SyncResponse, ApiError>;
}

/// HTTP client for the AutoLogout state server.
pub struct HttpStateApi {
    client: Client,
    base_url: Url,
}

impl HttpStateApi {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, action: &str, id: &str) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport(format!("base URL {} cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .extend(["api", action, id]);
        Ok(url)
    }

    /// Turn a response into a typed body, keeping non-success statuses apart from
    /// undecodable payloads.
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Transport(format!("malformed response payload: {}", e)))
    }
}

#[async_trait]
impl StateService for HttpStateApi {
    async fn fetch_state(&self, id: &str, token: &str) -> Result<RemoteState, ApiError> {
        let url = self.endpoint("get", id)?;
        debug!("Fetching state for {}", id);

        let response = self.client.get(url).bearer_auth(token).send().await?;
        Self::decode(response).await
    }

    async fn authorize(&self, id: &str, password: &str) -> Result<AuthorizeResponse, ApiError> {
        let url = self.endpoint("auth", id)?;
        debug!("Requesting auth key for {}", id);

        let response = self
            .client
            .get(url)
            .query(&[("password", password)])
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn sync_state(
        &self,
        id: &str,
        patch: &RemoteStatePatch,
        parent_mode: bool,
        token: &str,
    ) -> Result<SyncResponse, ApiError> {
        let url = self.endpoint("sync", id)?;
        debug!("Pushing state for {} (parent mode: {})", id, parent_mode);

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .query(&[("parentMode", parent_mode)])
            .json(patch)
            .send()
            .await?;
        Self::decode(response).await
    }
}
