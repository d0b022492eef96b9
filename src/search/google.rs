//! Google Programmable Search (Custom Search JSON API) backend.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::Error;
use crate::search::{SearchBackend, SearchResult};

const ENDPOINT: &str = "https://customsearch.googleapis.com/customsearch/v1";

/// [`SearchBackend`] over the Custom Search JSON API.
#[derive(Debug, Clone)]
pub struct GoogleSearchBackend {
    client: reqwest::Client,
    api_key: String,
    cse_id: String,
}

impl GoogleSearchBackend {
    pub fn new(client: reqwest::Client, api_key: String, cse_id: String) -> Self {
        Self {
            client,
            api_key,
            cse_id,
        }
    }
}

#[async_trait]
impl SearchBackend for GoogleSearchBackend {
    async fn fetch(
        &self,
        query: &str,
        count: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, Error> {
        // The API indexes results from 1.
        let start = offset + 1;
        debug!(%query, count, start, "google cse request");
        let response = self
            .client
            .get(ENDPOINT)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", query),
                ("num", &count.to_string()),
                ("start", &start.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::SearchBackend {
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SearchBackend {
                message: format!("google cse returned {status}: {body}"),
            });
        }

        let parsed: CseResponse = response.json().await.map_err(|e| Error::SearchBackend {
            message: format!("invalid response body: {e}"),
        })?;
        Ok(parsed
            .items
            .into_iter()
            .map(CseItem::into_result)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Debug, Deserialize)]
struct CseItem {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    pagemap: Option<PageMap>,
}

#[derive(Debug, Deserialize)]
struct PageMap {
    #[serde(default)]
    metatags: Vec<MetaTags>,
}

#[derive(Debug, Deserialize)]
struct MetaTags {
    #[serde(rename = "article:published_time")]
    published_time: Option<String>,
}

impl CseItem {
    fn into_result(self) -> SearchResult {
        let published = self
            .pagemap
            .and_then(|map| map.metatags.into_iter().next())
            .and_then(|tags| tags.published_time);
        SearchResult {
            url: self.link,
            title: self.title,
            snippet: self.snippet,
            published,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_item_extracts_published_time() {
        let raw = r#"{
            "items": [{
                "link": "https://a.example/story",
                "title": "A story",
                "snippet": "What happened",
                "pagemap": {
                    "metatags": [{"article:published_time": "2024-01-02T10:00:00Z"}]
                }
            }]
        }"#;
        let parsed: CseResponse =
            serde_json::from_str(raw).unwrap_or_else(|e| panic!("parse failed: {e}"));
        let results: Vec<SearchResult> =
            parsed.items.into_iter().map(CseItem::into_result).collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://a.example/story");
        assert_eq!(
            results[0].published.as_deref(),
            Some("2024-01-02T10:00:00Z")
        );
    }

    #[test]
    fn test_missing_items_is_empty() {
        let parsed: CseResponse =
            serde_json::from_str("{}").unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert!(parsed.items.is_empty());
    }

    #[test]
    fn test_item_without_pagemap() {
        let raw = r#"{"items": [{"link": "https://b.example", "title": "T", "snippet": "S"}]}"#;
        let parsed: CseResponse =
            serde_json::from_str(raw).unwrap_or_else(|e| panic!("parse failed: {e}"));
        let result = parsed
            .items
            .into_iter()
            .map(CseItem::into_result)
            .next()
            .unwrap_or_else(|| panic!("expected one item"));
        assert!(result.published.is_none());
    }
}
