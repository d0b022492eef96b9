//! Web search retrieval with stateful pagination.
//!
//! [`SearchProvider`] wraps a [`SearchBackend`] and tracks pagination
//! across the queries of one agent run: repeating the previous query
//! resumes where the last call stopped, while a new query starts from
//! the first page. Results are accumulated per query and formatted as
//! numbered observations, with numbers drawn from the run's
//! [`CitationRegistry`].

pub mod citations;
pub mod google;

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

pub use citations::{CitationRegistry, NO_INFORMATION, Renumbered, renumber};
pub use google::GoogleSearchBackend;

use crate::error::Error;

/// Pages fetched per `search` call for a given query.
pub const PAGES_PER_CALL: usize = 3;

/// Display truncation threshold for result URLs.
const MAX_URL_LEN: usize = 1000;

#[allow(clippy::unwrap_used)]
static DOT_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.+").unwrap());

#[allow(clippy::unwrap_used)]
static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").unwrap());

/// One search hit as returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Publication date as an ISO `YYYY-MM-DD` string, when the result
    /// page exposed one.
    pub published: Option<String>,
}

/// A paged web-search API.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Fetches up to `count` results for `query`, skipping the first
    /// `offset` results.
    async fn fetch(
        &self,
        query: &str,
        count: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, Error>;
}

/// Appends `-site:` exclusion operators for each excluded domain.
#[must_use]
pub fn build_query(query: &str, excluded_domains: &[String]) -> String {
    if excluded_domains.is_empty() {
        return query.to_string();
    }
    let exclusions: Vec<String> = excluded_domains
        .iter()
        .map(|domain| format!("-site:{domain}"))
        .collect();
    format!("{query} {}", exclusions.join(" "))
}

/// Stateful retrieval front-end for one agent run.
#[derive(Debug)]
pub struct SearchProvider<B> {
    backend: B,
    page_size: usize,
    excluded_domains: Vec<String>,
    offset: usize,
    last_query: String,
    queries: Vec<String>,
    accumulated: HashMap<String, Vec<SearchResult>>,
}

impl<B: SearchBackend> SearchProvider<B> {
    pub fn new(backend: B, page_size: usize, excluded_domains: Vec<String>) -> Self {
        Self {
            backend,
            page_size,
            excluded_domains,
            offset: 0,
            last_query: String::new(),
            queries: Vec::new(),
            accumulated: HashMap::new(),
        }
    }

    /// Distinct queries issued this run, in first-use order.
    #[must_use]
    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    /// Runs up to [`PAGES_PER_CALL`] page fetches for `query` and
    /// returns the formatted observation text.
    ///
    /// A query differing from the immediately preceding one restarts
    /// pagination at offset zero; repeating the previous query resumes
    /// from where it stopped. Every URL in the accumulated results is
    /// registered in `registry`, and the observation cites results by
    /// their registry numbers. Any backend failure, or an empty result
    /// set, yields the [`NO_INFORMATION`] sentinel instead of an error.
    pub async fn search(&mut self, query: &str, registry: &mut CitationRegistry) -> String {
        if self.last_query != query {
            self.offset = 0;
            self.last_query = query.to_string();
            if !self.queries.iter().any(|q| q.as_str() == query) {
                self.queries.push(query.to_string());
            }
        }

        let full_query = build_query(query, &self.excluded_domains);
        for page in 0..PAGES_PER_CALL {
            let results = match self
                .backend
                .fetch(&full_query, self.page_size, self.offset)
                .await
            {
                Ok(results) => results,
                Err(error) => {
                    warn!(%query, page, %error, "search page fetch failed");
                    return NO_INFORMATION.to_string();
                }
            };
            if results.is_empty() {
                debug!(%query, page, offset = self.offset, "search exhausted early");
                break;
            }
            self.offset += results.len();
            self.accumulated
                .entry(query.to_string())
                .or_default()
                .extend(results);
        }

        let Some(results) = self.accumulated.get(query) else {
            warn!(%query, "search returned no results");
            return NO_INFORMATION.to_string();
        };
        format_results(results, registry)
    }
}

/// Renders accumulated results as one observation line per hit,
/// numbered by citation registry entry.
fn format_results(results: &[SearchResult], registry: &mut CitationRegistry) -> String {
    let mut observation = String::new();
    for result in results {
        let number = registry.assign(&result.url);
        let url = display_url(&result.url);
        let date = format_date(result.published.as_deref());
        let title = collapse(&result.title);
        let snippet = collapse(&result.snippet);
        observation.push_str(&format!("{number}. {url} ({date}): {title}. {snippet}.\n"));
    }
    if observation.is_empty() {
        return NO_INFORMATION.to_string();
    }
    observation
}

fn display_url(url: &str) -> String {
    if url.chars().count() <= MAX_URL_LEN {
        return url.to_string();
    }
    warn!(length = url.len(), "result URL exceeds display limit");
    let truncated: String = url.chars().take(MAX_URL_LEN).collect();
    format!("{truncated}...")
}

/// Reduces an ISO date to `YYYY-Mon`; anything unparsable becomes
/// `NO DATE` rather than polluting the observation.
fn format_date(published: Option<&str>) -> String {
    let Some(raw) = published else {
        return "NO DATE".to_string();
    };
    let day = raw.split('T').next().unwrap_or(raw);
    match chrono::NaiveDate::parse_from_str(day, "%Y-%m-%d") {
        Ok(date) => date.format("%Y-%b").to_string(),
        Err(_) => "NO DATE".to_string(),
    }
}

fn collapse(text: &str) -> String {
    let dots = DOT_RUNS.replace_all(text, ".");
    SPACE_RUNS.replace_all(&dots, " ").into_owned()
}
