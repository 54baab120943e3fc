//! Client for the external scraping API.
//!
//! The heavy lifting (headless rendering, markdown conversion, link
//! extraction) happens on the provider's side; this module only speaks the
//! `/v1/scrape` wire format and hands back a [`FetchedPage`]. No retries —
//! a failed fetch surfaces straight to the pipeline.

use crate::config::FetcherConfig;
use crate::models::FetchedPage;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Swappable page-fetch abstraction.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: &'a [&'a str],
    #[serde(rename = "waitFor")]
    wait_for: u64,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<ScrapeData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ScrapeData {
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    html: String,
    #[serde(default)]
    links: Vec<String>,
}

// ── Firecrawl-style client ───────────────────────────────────────────────────

pub struct FirecrawlFetcher {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    wait_for_ms: u64,
}

impl FirecrawlFetcher {
    pub fn new(config: &FetcherConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            wait_for_ms: config.wait_for_ms,
        })
    }
}

#[async_trait]
impl PageFetcher for FirecrawlFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let endpoint = format!("{}/v1/scrape", self.api_url);
        debug!("POST {} for {}", endpoint, url);

        let body = ScrapeRequest {
            url,
            formats: &["markdown", "html", "links"],
            wait_for: self.wait_for_ms,
        };

        let resp = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Scrape request failed for {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Scraping API returned HTTP {}: {}", status, text);
        }

        let parsed: ScrapeResponse = resp
            .json()
            .await
            .context("Scraping API returned malformed JSON")?;

        if !parsed.success {
            bail!(
                "Scraping API reported failure: {}",
                parsed.error.unwrap_or_else(|| "no error detail".into())
            );
        }

        let data = parsed.data.unwrap_or_default();
        debug!(
            "Fetched {}: {} markdown bytes, {} links",
            url,
            data.markdown.len(),
            data.links.len()
        );

        Ok(FetchedPage {
            markdown: data.markdown,
            html: data.html,
            links: data.links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_response_tolerates_missing_fields() {
        let parsed: ScrapeResponse =
            serde_json::from_str(r##"{"success":true,"data":{"markdown":"# hi"}}"##).unwrap();
        assert!(parsed.success);
        let data = parsed.data.unwrap();
        assert_eq!(data.markdown, "# hi");
        assert!(data.html.is_empty());
        assert!(data.links.is_empty());
    }

    #[test]
    fn scrape_response_carries_error() {
        let parsed: ScrapeResponse =
            serde_json::from_str(r#"{"success":false,"error":"rate limited"}"#).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error.as_deref(), Some("rate limited"));
    }
}
