//! Async STAC client for searching spatio-temporal asset catalogs.
//!
//! Earth Search is the default; Planetary Computer (with SAS signing of
//! asset hrefs) and arbitrary STAC API endpoints are also supported.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;

use crate::error::{CloudError, Result};
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

const PC_SIGN_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/sign";

/// Well-known STAC catalogs plus custom endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StacCatalog {
    /// AWS Earth Search (Element 84).
    #[default]
    EarthSearch,
    /// Microsoft Planetary Computer.
    PlanetaryComputer,
    /// Any STAC API root, e.g. `"https://stac.example.com/api/v1"`.
    Custom(String),
}

impl StacCatalog {
    /// Full `POST /search` URL.
    pub fn search_url(&self) -> String {
        match self {
            Self::PlanetaryComputer => {
                "https://planetarycomputer.microsoft.com/api/stac/v1/search".to_string()
            }
            Self::EarthSearch => "https://earth-search.aws.element84.com/v1/search".to_string(),
            Self::Custom(base) => {
                let base = base.trim_end_matches('/');
                if base.ends_with("/search") {
                    base.to_string()
                } else {
                    format!("{}/search", base)
                }
            }
        }
    }

    /// Whether asset hrefs need a SAS token before they can be read.
    pub fn needs_signing(&self) -> bool {
        matches!(self, Self::PlanetaryComputer)
    }
}

impl FromStr for StacCatalog {
    type Err = std::convert::Infallible;

    /// `es`/`earth-search`, `pc`/`planetary-computer`, otherwise a URL.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            _ => Self::Custom(s.to_string()),
        })
    }
}

impl fmt::Display for StacCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EarthSearch => write!(f, "earth-search"),
            Self::PlanetaryComputer => write!(f, "planetary-computer"),
            Self::Custom(url) => write!(f, "{}", url),
        }
    }
}

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// Retries on transient failures (default 3).
    pub max_retries: u32,
    /// Items requested per page (default 100).
    pub page_size: u32,
    /// Cap on items collected across pages (default 1000).
    pub max_items: usize,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            page_size: 100,
            max_items: 1000,
        }
    }
}

/// Async client for STAC Item Search.
pub struct StacClient {
    catalog: StacCatalog,
    client: reqwest::Client,
    options: StacClientOptions,
}

impl StacClient {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            catalog,
            client,
            options,
        })
    }

    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &StacClientOptions {
        &self.options
    }

    /// One page of results.
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        let body = to_body(params)?;
        self.post_search(&self.catalog.search_url(), &body).await
    }

    /// All pages, up to `max_items` items.
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let max = self.options.max_items;
        let mut body = to_body(params)?;
        let mut page = self.post_search(&self.catalog.search_url(), &body).await?;
        let mut items: Vec<StacItem> = Vec::new();

        loop {
            let next = page.next_link().cloned();
            items.append(&mut page.features);
            if items.len() >= max {
                tracing::warn!("STAC search truncated at {} items", max);
                break;
            }
            let Some(link) = next else { break };
            page = self.follow_next(&link, &mut body).await?;
            if page.is_empty() {
                break;
            }
        }

        items.truncate(max);
        tracing::debug!("STAC search returned {} items from {}", items.len(), self.catalog);
        Ok(items)
    }

    /// Sign an asset href for Planetary Computer; unchanged elsewhere.
    pub async fn sign_asset_href(&self, href: &str) -> Result<String> {
        if !self.catalog.needs_signing() {
            return Ok(href.to_string());
        }

        let resp = self
            .client
            .get(PC_SIGN_URL)
            .query(&[("href", href)])
            .send()
            .await
            .map_err(|e| CloudError::Auth(format!("PC sign request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Auth(format!(
                "PC sign returned HTTP {}: {}",
                status,
                truncate(&body, 300)
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| CloudError::Auth(format!("parsing PC sign response: {e}")))?;
        body["href"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CloudError::Auth("PC sign response missing 'href' field".into()))
    }

    // ── Private helpers ─────────────────────────────────────────────

    async fn post_search(&self, url: &str, body: &Value) -> Result<StacItemCollection> {
        let mut last_err = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                // 500 ms, 1 s, 2 s, ...
                let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                tracing::debug!("retrying STAC search in {:?}", delay);
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(url).json(body).send().await;
            match resp {
                Ok(r) if r.status().is_success() => {
                    let text = r
                        .text()
                        .await
                        .map_err(|e| CloudError::Network(format!("reading response body: {e}")))?;
                    return serde_json::from_str(&text)
                        .map_err(|e| CloudError::Network(format!("parsing STAC response: {e}")));
                }
                Ok(r) => {
                    let status = r.status();
                    let text = r.text().await.unwrap_or_default();
                    last_err = Some(CloudError::Network(format!(
                        "STAC search returned HTTP {}: {}",
                        status,
                        truncate(&text, 500)
                    )));
                    // 4xx will not improve on retry
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    last_err = Some(CloudError::Network(format!("STAC search request failed: {e}")));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| CloudError::Network("STAC search failed".into())))
    }

    /// Follow a `next` link. POST links update `body` for the following page.
    async fn follow_next(&self, link: &StacLink, body: &mut Value) -> Result<StacItemCollection> {
        let method = link.method.as_deref().unwrap_or("GET").to_uppercase();
        if method == "POST" {
            *body = next_body(body, link);
            return self.post_search(&link.href, body).await;
        }

        let resp = self
            .client
            .get(&link.href)
            .send()
            .await
            .map_err(|e| CloudError::Network(format!("GET pagination: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CloudError::Network(format!(
                "STAC pagination returned HTTP {}: {}",
                status,
                truncate(&text, 500)
            )));
        }
        resp.json()
            .await
            .map_err(|e| CloudError::Network(format!("parsing pagination response: {e}")))
    }
}

fn to_body(params: &StacSearchParams) -> Result<Value> {
    serde_json::to_value(params).map_err(|e| CloudError::Network(format!("serializing params: {e}")))
}

/// Request body for a POST `next` link: the link body merged over the
/// previous body when `merge` is set, the link body alone otherwise.
fn next_body(previous: &Value, link: &StacLink) -> Value {
    match (&link.body, link.merge.unwrap_or(false)) {
        (Some(link_body), true) => {
            let mut merged = previous.clone();
            if let (Some(base), Some(overlay)) = (merged.as_object_mut(), link_body.as_object()) {
                for (k, v) in overlay {
                    base.insert(k.clone(), v.clone());
                }
            }
            merged
        }
        (Some(link_body), false) => link_body.clone(),
        (None, _) => previous.clone(),
    }
}

fn truncate(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_search_urls() {
        assert_eq!(
            StacCatalog::PlanetaryComputer.search_url(),
            "https://planetarycomputer.microsoft.com/api/stac/v1/search"
        );
        assert_eq!(
            StacCatalog::EarthSearch.search_url(),
            "https://earth-search.aws.element84.com/v1/search"
        );
        for base in ["https://example.com/stac", "https://example.com/stac/", "https://example.com/stac/search"] {
            assert_eq!(
                StacCatalog::Custom(base.into()).search_url(),
                "https://example.com/stac/search"
            );
        }
    }

    #[test]
    fn catalog_from_str() {
        assert_eq!("pc".parse::<StacCatalog>().unwrap(), StacCatalog::PlanetaryComputer);
        assert_eq!("Earth-Search".parse::<StacCatalog>().unwrap(), StacCatalog::EarthSearch);
        assert_eq!(
            "https://my-stac.com".parse::<StacCatalog>().unwrap(),
            StacCatalog::Custom("https://my-stac.com".into())
        );
        assert_eq!(StacCatalog::default(), StacCatalog::EarthSearch);
    }

    #[test]
    fn only_planetary_computer_signs() {
        assert!(StacCatalog::PlanetaryComputer.needs_signing());
        assert!(!StacCatalog::EarthSearch.needs_signing());
        assert!(!StacCatalog::Custom("https://x.com".into()).needs_signing());
    }

    fn link(body: Option<Value>, merge: Option<bool>) -> StacLink {
        StacLink {
            rel: "next".into(),
            href: "https://example.com/search".into(),
            method: Some("POST".into()),
            body,
            merge,
        }
    }

    #[test]
    fn next_body_merges_token_into_previous() {
        let previous = json!({"collections": ["sentinel-2-l2a"], "limit": 100});
        let body = next_body(&previous, &link(Some(json!({"next": "abc"})), Some(true)));
        assert_eq!(body["next"], "abc");
        assert_eq!(body["collections"], json!(["sentinel-2-l2a"]));
    }

    #[test]
    fn next_body_replaces_without_merge() {
        let previous = json!({"limit": 100});
        let body = next_body(&previous, &link(Some(json!({"token": "t2"})), None));
        assert_eq!(body, json!({"token": "t2"}));

        let same = next_body(&previous, &link(None, Some(true)));
        assert_eq!(same, previous);
    }
}
