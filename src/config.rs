use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunable thresholds for one scrape.
///
/// Every heuristic cue the engine relies on lives here so it can be adjusted
/// from a TOML file without touching extraction code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Visible body text (characters) below which the dynamic strategy is used
    pub static_text_threshold: usize,

    /// Upper bound on the whole dynamic phase (session open to last snapshot)
    pub page_load_timeout_ms: u64,

    /// Timeout for the static HTTP fetch
    pub fetch_timeout_ms: u64,

    /// Bound on closing a browser session, applied after the dynamic phase
    pub session_close_timeout_ms: u64,

    /// Per-section raw HTML cap, in bytes
    pub max_section_bytes: usize,

    /// Overall page ceiling, in bytes; larger pages are rejected
    pub max_content_bytes: usize,

    /// Fixed wait after every click, scroll and navigation
    pub settle_delay_ms: u64,

    /// Shared budget for scroll iterations plus followed pagination links
    pub exploration_depth: usize,

    pub max_scrolls: usize,

    pub max_pages: usize,

    pub max_clicks_per_strategy: usize,

    /// Minimum text for a heading-led `div` to count as a section when a page
    /// has no landmark elements
    pub fallback_container_min_chars: usize,

    /// Wildcard class/id patterns removed before extraction
    pub noise_patterns: Vec<String>,

    pub content_limits: ContentLimits,

    /// Language reported when the page does not declare one
    pub default_language: String,

    /// WebDriver endpoint used for dynamic sessions
    pub webdriver_url: String,

    pub headless: bool,

    /// Fixed User-Agent for static fetches; a rotating pool is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Caps applied to the structured content of each section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentLimits {
    pub max_links: usize,
    pub max_images: usize,
    pub max_lists: usize,
    pub max_tables: usize,
    pub max_text_chars: usize,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            max_links: 10,
            max_images: 5,
            max_lists: 3,
            max_tables: 2,
            max_text_chars: 500,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            static_text_threshold: 200,
            page_load_timeout_ms: 60_000,
            fetch_timeout_ms: 10_000,
            session_close_timeout_ms: 5_000,
            max_section_bytes: 3000,
            max_content_bytes: 10 * 1024 * 1024,
            settle_delay_ms: 2000,
            exploration_depth: 3,
            max_scrolls: 3,
            max_pages: 3,
            max_clicks_per_strategy: 3,
            fallback_container_min_chars: 40,
            noise_patterns: default_noise_patterns(),
            content_limits: ContentLimits::default(),
            default_language: "en".to_string(),
            webdriver_url: "http://localhost:4444".to_string(),
            headless: true,
            user_agent: None,
        }
    }
}

fn default_noise_patterns() -> Vec<String> {
    ["*cookie*", "*newsletter*", "*popup*", "*modal*", "*consent*"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl ScraperConfig {
    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides (`WEBDRIVER_URL`)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                self.webdriver_url = webdriver_url;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_section_bytes == 0 || self.max_content_bytes == 0 {
            anyhow::bail!("content ceilings must be greater than zero");
        }
        if self.exploration_depth == 0 {
            anyhow::bail!("exploration_depth must be at least 1");
        }
        Ok(())
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn session_close_timeout(&self) -> Duration {
        Duration::from_millis(self.session_close_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
