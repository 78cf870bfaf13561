//! Rendered-page sessions.
//!
//! The interaction driver only talks to [`BrowserSession`]; the WebDriver
//! implementation below is one provider of it.

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator, elements::Element};
use serde_json::{Value, json};
use url::Url;

use crate::config::ScraperConfig;
use crate::error::ScrapeError;

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// How an element lookup is expressed to the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementQuery {
    Css(String),
    XPath(String),
}

/// Click targets tried in priority order during click discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickStrategy {
    /// Buttons and anchors reading "load more" or "show more"
    MoreText,
    Tabs,
    MoreTestId,
    LoadMoreClass,
}

impl ClickStrategy {
    pub const ALL: [ClickStrategy; 4] = [
        ClickStrategy::MoreText,
        ClickStrategy::Tabs,
        ClickStrategy::MoreTestId,
        ClickStrategy::LoadMoreClass,
    ];

    pub fn query(&self) -> ElementQuery {
        match self {
            Self::MoreText => {
                let text = format!("translate(normalize-space(.), '{}', '{}')", UPPER, LOWER);
                ElementQuery::XPath(format!(
                    "//button[contains({0}, 'load more') or contains({0}, 'show more')] \
                     | //a[contains({0}, 'load more') or contains({0}, 'show more')]",
                    text
                ))
            }
            Self::Tabs => ElementQuery::Css(r#"[role="tab"]"#.to_string()),
            Self::MoreTestId => ElementQuery::Css(r#"[data-testid*="more"]"#.to_string()),
            Self::LoadMoreClass => ElementQuery::Css(
                r#".load-more, #load-more, [class*="load-more"], [class*="show-more"]"#.to_string(),
            ),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MoreText => "more-text",
            Self::Tabs => "tabs",
            Self::MoreTestId => "more-testid",
            Self::LoadMoreClass => "load-more-class",
        }
    }
}

/// A live, controllable rendered page.
#[async_trait]
pub trait BrowserSession: Send {
    /// Opaque reference to an element found in the page
    type Handle: Send + Sync;

    async fn goto(&mut self, url: &Url) -> Result<(), ScrapeError>;

    async fn current_url(&mut self) -> Result<Url, ScrapeError>;

    /// Serialized DOM as currently rendered
    async fn page_source(&mut self) -> Result<String, ScrapeError>;

    async fn scroll_height(&mut self) -> Result<u64, ScrapeError>;

    async fn scroll_to_bottom(&mut self) -> Result<(), ScrapeError>;

    /// Elements matching `strategy` that are currently displayed
    async fn find_visible(
        &mut self,
        strategy: ClickStrategy,
    ) -> Result<Vec<Self::Handle>, ScrapeError>;

    async fn click(&mut self, handle: &Self::Handle) -> Result<(), ScrapeError>;

    async fn close(&mut self) -> Result<(), ScrapeError>;
}

/// Opens a fresh session per scrape.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    type Session: BrowserSession;

    async fn open(&self) -> Result<Self::Session, ScrapeError>;
}

/// Launches Chrome sessions through a WebDriver server.
pub struct WebDriverLauncher {
    webdriver_url: String,
    headless: bool,
    user_agent: Option<String>,
}

impl WebDriverLauncher {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            webdriver_url: config.webdriver_url.clone(),
            headless: config.headless,
            user_agent: config.user_agent.clone(),
        }
    }

    fn capabilities(&self) -> serde_json::Map<String, Value> {
        let mut args = vec![
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--window-size=1920,1080".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        if !cfg!(target_os = "macos") {
            args.push("--no-sandbox".to_string());
        }
        if let Some(agent) = &self.user_agent {
            args.push(format!("--user-agent={}", agent));
        }

        let mut caps = serde_json::Map::new();
        caps.insert("browserName".to_string(), json!("chrome"));
        caps.insert("acceptInsecureCerts".to_string(), json!(true));
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        caps
    }
}

#[async_trait]
impl SessionLauncher for WebDriverLauncher {
    type Session = WebDriverSession;

    async fn open(&self) -> Result<WebDriverSession, ScrapeError> {
        let mut builder = ClientBuilder::native();
        builder.capabilities(self.capabilities());

        match builder.connect(&self.webdriver_url).await {
            Ok(client) => {
                log::debug!("Connected to WebDriver at {}", self.webdriver_url);
                Ok(WebDriverSession { client })
            }
            Err(e) => {
                log::error!("Failed to connect to WebDriver at {}: {}", self.webdriver_url, e);
                log::error!(
                    "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
                );
                Err(ScrapeError::render(format!(
                    "WebDriver connection to {} failed: {}",
                    self.webdriver_url, e
                )))
            }
        }
    }
}

/// [`BrowserSession`] over a fantoccini client.
pub struct WebDriverSession {
    client: Client,
}

fn render_err(context: &str, error: fantoccini::error::CmdError) -> ScrapeError {
    ScrapeError::render(format!("{}: {}", context, error))
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    type Handle = Element;

    async fn goto(&mut self, url: &Url) -> Result<(), ScrapeError> {
        self.client
            .goto(url.as_str())
            .await
            .map_err(|e| render_err(&format!("navigate to {}", url), e))
    }

    async fn current_url(&mut self) -> Result<Url, ScrapeError> {
        self.client
            .current_url()
            .await
            .map_err(|e| render_err("read current url", e))
    }

    async fn page_source(&mut self) -> Result<String, ScrapeError> {
        self.client
            .source()
            .await
            .map_err(|e| render_err("read page source", e))
    }

    async fn scroll_height(&mut self) -> Result<u64, ScrapeError> {
        let value = self
            .client
            .execute("return document.body ? document.body.scrollHeight : 0;", vec![])
            .await
            .map_err(|e| render_err("measure scroll height", e))?;
        value
            .as_u64()
            .or_else(|| value.as_f64().map(|h| h.max(0.0) as u64))
            .ok_or_else(|| ScrapeError::render(format!("unexpected scroll height: {}", value)))
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), ScrapeError> {
        self.client
            .execute("window.scrollTo(0, document.body.scrollHeight);", vec![])
            .await
            .map(|_| ())
            .map_err(|e| render_err("scroll", e))
    }

    async fn find_visible(&mut self, strategy: ClickStrategy) -> Result<Vec<Element>, ScrapeError> {
        let query = strategy.query();
        let locator = match &query {
            ElementQuery::Css(css) => Locator::Css(css),
            ElementQuery::XPath(xpath) => Locator::XPath(xpath),
        };
        let found = self
            .client
            .find_all(locator)
            .await
            .map_err(|e| render_err(&format!("find {} targets", strategy.name()), e))?;

        let mut visible = Vec::with_capacity(found.len());
        for element in found {
            // Stale or detached elements count as hidden
            if element.is_displayed().await.unwrap_or(false) {
                visible.push(element);
            }
        }
        Ok(visible)
    }

    async fn click(&mut self, handle: &Element) -> Result<(), ScrapeError> {
        handle.click().await.map_err(|e| render_err("click", e))
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        self.client
            .clone()
            .close()
            .await
            .map_err(|e| render_err("close session", e))
    }
}
