use std::time::Duration;

use async_trait::async_trait;
use axis_protocol::{ItemDetail, RegistryItem};
use reqwest::{StatusCode, Url};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProviderError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Upstream source of registry items.
#[async_trait]
pub(crate) trait Provider: Send + Sync {
    async fn list_all(&self) -> Result<Vec<RegistryItem>, ProviderError>;

    async fn get_detail(&self, id: &str) -> Result<ItemDetail, ProviderError>;

    async fn delete(&self, id: &str) -> Result<(), ProviderError>;
}

/// JSON upstream: `GET {base}/items`, `GET {base}/items/{id}`,
/// `DELETE {base}/items/{id}`.
pub(crate) struct HttpProvider {
    client: reqwest::Client,
    base: Url,
}

impl HttpProvider {
    pub fn new(base: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            anyhow::bail!("provider url cannot be a base: {base}");
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    fn url(&self, id: Option<&str>) -> Result<Url, ProviderError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ProviderError::Unavailable("invalid base url".into()))?;
            segments.pop_if_empty().push("items");
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn check(resp: reqwest::Response, id: Option<&str>) -> Result<reqwest::Response, ProviderError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(ProviderError::NotFound(id.to_string()));
            }
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn list_all(&self) -> Result<Vec<RegistryItem>, ProviderError> {
        let resp = self.client.get(self.url(None)?).send().await?;
        let items: Vec<RegistryItem> = Self::check(resp, None).await?.json().await?;
        debug!(target: "axis::provider", count = items.len(), "listed items");
        Ok(items)
    }

    async fn get_detail(&self, id: &str) -> Result<ItemDetail, ProviderError> {
        let resp = self.client.get(self.url(Some(id))?).send().await?;
        Ok(Self::check(resp, Some(id)).await?.json().await?)
    }

    async fn delete(&self, id: &str) -> Result<(), ProviderError> {
        let resp = self.client.delete(self.url(Some(id))?).send().await?;
        Self::check(resp, Some(id)).await?;
        Ok(())
    }
}

/// Stand-in when no upstream is configured: every call fails, so the
/// dashboard serves an empty (or previously cached) registry.
pub(crate) struct UnconfiguredProvider;

#[async_trait]
impl Provider for UnconfiguredProvider {
    async fn list_all(&self) -> Result<Vec<RegistryItem>, ProviderError> {
        Err(ProviderError::Unavailable("no provider configured".into()))
    }

    async fn get_detail(&self, _id: &str) -> Result<ItemDetail, ProviderError> {
        Err(ProviderError::Unavailable("no provider configured".into()))
    }

    async fn delete(&self, _id: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unavailable("no provider configured".into()))
    }
}
