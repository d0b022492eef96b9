//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.
//! The excluded-domain list is an explicit configuration value loaded once at
//! startup and passed into every `SearchProvider`, never ambient global state.

use std::path::Path;
use std::time::Duration;

use crate::error::Error;

/// Default maximum reasoning-loop iterations per statement.
const DEFAULT_MAX_ITERATIONS: usize = 5;
/// Default search results per page fetch.
const DEFAULT_PAGE_SIZE: usize = 10;
/// Default max tokens for reasoning-agent responses.
const DEFAULT_AGENT_MAX_TOKENS: u32 = 4096;
/// Default max tokens for the factuality gate's classification.
const DEFAULT_GATE_MAX_TOKENS: u32 = 256;
/// Default max tokens for the propaganda detector's response.
const DEFAULT_DETECT_MAX_TOKENS: u32 = 4096;
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the contextualization pipeline.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the LLM provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Default model identifier; per-request `model_name` overrides it.
    pub model: String,
    /// Google Custom Search API key.
    pub google_api_key: String,
    /// Google Custom Search engine ID.
    pub google_cse_id: String,
    /// Maximum reasoning-loop iterations per statement.
    pub max_iterations: usize,
    /// Search results requested per page fetch.
    pub page_size: usize,
    /// Maximum tokens for reasoning-agent responses.
    pub agent_max_tokens: u32,
    /// Maximum tokens for the factuality gate's classification.
    pub gate_max_tokens: u32,
    /// Maximum tokens for the propaganda detector's response.
    pub detect_max_tokens: u32,
    /// Request timeout.
    pub timeout: Duration,
    /// Domains excluded from every search query (`-site:` terms).
    pub excluded_domains: Vec<String>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, Error> {
        Self::builder().from_env().build()
    }
}

/// Loads an excluded-domain list from a file, one entry per line.
///
/// Entries may be bare domains or full URLs; scheme, `www.` prefix, and
/// path are stripped. Blank lines and `#` comments are skipped.
///
/// # Errors
///
/// Returns [`Error::Orchestration`] if the file cannot be read.
pub fn load_excluded_domains(path: &Path) -> Result<Vec<String>, Error> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::Orchestration {
        message: format!("failed to read excluded domains from {}: {e}", path.display()),
    })?;

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(normalize_domain)
        .collect())
}

/// Strips scheme, `www.` prefix, and path from a domain entry.
fn normalize_domain(entry: &str) -> String {
    let after_scheme = entry.rsplit("//").next().unwrap_or(entry);
    let after_www = after_scheme.strip_prefix("www.").unwrap_or(after_scheme);
    after_www
        .split('/')
        .next()
        .unwrap_or(after_www)
        .to_string()
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    google_api_key: Option<String>,
    google_cse_id: Option<String>,
    max_iterations: Option<usize>,
    page_size: Option<usize>,
    agent_max_tokens: Option<u32>,
    gate_max_tokens: Option<u32>,
    detect_max_tokens: Option<u32>,
    timeout: Option<Duration>,
    excluded_domains: Option<Vec<String>>,
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("CTX_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("CTX_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("CTX_BASE_URL"))
                .ok();
        }
        if self.model.is_none() {
            self.model = std::env::var("CTX_MODEL").ok();
        }
        if self.google_api_key.is_none() {
            self.google_api_key = std::env::var("GOOGLE_API_KEY").ok();
        }
        if self.google_cse_id.is_none() {
            self.google_cse_id = std::env::var("GOOGLE_CSE_ID").ok();
        }
        if self.max_iterations.is_none() {
            self.max_iterations = std::env::var("CTX_MAX_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.page_size.is_none() {
            self.page_size = std::env::var("CTX_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the default model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the Google Custom Search API key.
    #[must_use]
    pub fn google_api_key(mut self, key: impl Into<String>) -> Self {
        self.google_api_key = Some(key.into());
        self
    }

    /// Sets the Google Custom Search engine ID.
    #[must_use]
    pub fn google_cse_id(mut self, id: impl Into<String>) -> Self {
        self.google_cse_id = Some(id.into());
        self
    }

    /// Sets the maximum reasoning-loop iterations.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the search page size.
    #[must_use]
    pub const fn page_size(mut self, n: usize) -> Self {
        self.page_size = Some(n);
        self
    }

    /// Sets the reasoning-agent max tokens.
    #[must_use]
    pub const fn agent_max_tokens(mut self, n: u32) -> Self {
        self.agent_max_tokens = Some(n);
        self
    }

    /// Sets the factuality-gate max tokens.
    #[must_use]
    pub const fn gate_max_tokens(mut self, n: u32) -> Self {
        self.gate_max_tokens = Some(n);
        self
    }

    /// Sets the propaganda-detector max tokens.
    #[must_use]
    pub const fn detect_max_tokens(mut self, n: u32) -> Self {
        self.detect_max_tokens = Some(n);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the excluded-domain list.
    #[must_use]
    pub fn excluded_domains(mut self, domains: Vec<String>) -> Self {
        self.excluded_domains = Some(domains);
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<AgentConfig, Error> {
        let api_key = self.api_key.ok_or(Error::ApiKeyMissing)?;

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            model: self.model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            google_api_key: self.google_api_key.unwrap_or_default(),
            google_cse_id: self.google_cse_id.unwrap_or_default(),
            max_iterations: self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            agent_max_tokens: self.agent_max_tokens.unwrap_or(DEFAULT_AGENT_MAX_TOKENS),
            gate_max_tokens: self.gate_max_tokens.unwrap_or(DEFAULT_GATE_MAX_TOKENS),
            detect_max_tokens: self.detect_max_tokens.unwrap_or(DEFAULT_DETECT_MAX_TOKENS),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            excluded_domains: self.excluded_domains.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builder_defaults() {
        let config = AgentConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.excluded_domains.is_empty());
    }

    #[test]
    fn test_builder_missing_api_key() {
        let result = AgentConfig::builder().build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AgentConfig::builder()
            .api_key("key")
            .model("gpt-4o")
            .max_iterations(3)
            .excluded_domains(vec!["example.com".to_string()])
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.excluded_domains, vec!["example.com".to_string()]);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("https://www.fake.example/path"), "fake.example");
        assert_eq!(normalize_domain("fake.example"), "fake.example");
        assert_eq!(normalize_domain("www.fake.example/a/b"), "fake.example");
    }

    #[test]
    fn test_load_excluded_domains() {
        let mut file =
            tempfile::NamedTempFile::new().unwrap_or_else(|e| panic!("tempfile failed: {e}"));
        writeln!(file, "# fake news outlets")
            .unwrap_or_else(|e| panic!("write failed: {e}"));
        writeln!(file, "https://www.hoax.example/about")
            .unwrap_or_else(|e| panic!("write failed: {e}"));
        writeln!(file).unwrap_or_else(|e| panic!("write failed: {e}"));
        writeln!(file, "rumors.example").unwrap_or_else(|e| panic!("write failed: {e}"));

        let domains = load_excluded_domains(file.path())
            .unwrap_or_else(|e| panic!("load failed: {e}"));
        assert_eq!(domains, vec!["hoax.example", "rumors.example"]);
    }
}
