//! Release page and cover fetching.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;

const MAX_COVER_BYTES: usize = 20_000_000;

#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String>;
    async fn fetch_binary(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpReleaseSource {
    client: Client,
}

impl HttpReleaseSource {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetch {url}"))?;
        if !resp.status().is_success() {
            return Err(anyhow!("fetch {url} failed with status {}", resp.status()));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ReleaseSource for HttpReleaseSource {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let resp = self.get(url).await?;
        resp.text()
            .await
            .with_context(|| format!("read page body {url}"))
    }

    async fn fetch_binary(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.get(url).await?;
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("read bytes {url}"))?;
        if bytes.len() > MAX_COVER_BYTES {
            return Err(anyhow!("{url} exceeds {MAX_COVER_BYTES} bytes"));
        }
        Ok(bytes.to_vec())
    }
}
