use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{CatalogPost, Credential, GatewayError, GatewayResult, PostCatalog, Relationships};
use crate::feed::domain::RawId;

/// Relationship type for "following" in the relationship API.
const FOLLOWING: &str = "1";

#[derive(Deserialize)]
struct Items<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

fn build_client(timeout: Duration) -> GatewayResult<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// `base` joined with `segments`, keeping any path prefix already on `base`.
fn endpoint(base: &Url, segments: &[&str]) -> GatewayResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| GatewayError::BaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn decode<T: DeserializeOwned>(response: Response) -> GatewayResult<Vec<T>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<Items<T>>().await?.items)
}

#[derive(Debug, Clone)]
pub struct HttpRelationships {
    client: Client,
    base: Url,
}

impl HttpRelationships {
    pub fn new(base: Url, timeout: Duration) -> GatewayResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base,
        })
    }
}

#[async_trait]
impl Relationships for HttpRelationships {
    async fn following(&self, credential: &Credential, limit: usize) -> GatewayResult<Vec<String>> {
        let mut url = endpoint(&self.base, &["relationships"])?;
        url.query_pairs_mut()
            .append_pair("type", FOLLOWING)
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", "0");

        let response = self
            .client
            .get(url)
            .bearer_auth(credential.as_str())
            .send()
            .await?;
        let ids: Vec<RawId> = decode(response).await?;
        Ok(ids.into_iter().map(String::from).collect())
    }
}

#[derive(Debug, Clone)]
pub struct HttpPostCatalog {
    client: Client,
    base: Url,
}

impl HttpPostCatalog {
    pub fn new(base: Url, timeout: Duration) -> GatewayResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base,
        })
    }
}

#[async_trait]
impl PostCatalog for HttpPostCatalog {
    async fn recent_posts(
        &self,
        author_id: &str,
        limit: usize,
        credential: Option<&Credential>,
    ) -> GatewayResult<Vec<CatalogPost>> {
        let mut url = endpoint(&self.base, &["users", author_id, "posts"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", "0");

        let mut request = self.client.get(url);
        if let Some(credential) = credential {
            request = request.bearer_auth(credential.as_str());
        }
        decode(request.send().await?).await
    }
}
