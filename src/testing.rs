//! In-memory fetchers and browser sessions for exercising the pipeline
//! without a network or a WebDriver server.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

use crate::error::ScrapeError;
use crate::fetch::{FetchedPage, PageFetcher};
use crate::session::{BrowserSession, ClickStrategy, SessionLauncher};

/// Canned responses keyed by URL.
#[derive(Default)]
pub struct MockFetcher {
    responses: HashMap<String, Result<FetchedPage, ScrapeError>>,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        let page = FetchedPage {
            url: Url::parse(url).expect("mock url"),
            status: 200,
            byte_len: html.len(),
            body: html.to_string(),
        };
        self.responses.insert(url.to_string(), Ok(page));
        self
    }

    pub fn with_error(mut self, url: &str, error: ScrapeError) -> Self {
        self.responses.insert(url.to_string(), Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, ScrapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| Err(ScrapeError::fetch(url.as_str(), "no mock response")))
    }
}

/// One page as the browser would render it. Each entry of `states` is the
/// DOM after that many successful scrolls.
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    states: Vec<String>,
    tabs: usize,
}

impl MockPage {
    pub fn single(html: &str) -> Self {
        Self::scrolling(vec![html.to_string()])
    }

    pub fn scrolling(states: Vec<String>) -> Self {
        Self { states, tabs: 0 }
    }

    /// Number of visible `[role=tab]` targets
    pub fn with_tabs(mut self, tabs: usize) -> Self {
        self.tabs = tabs;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockSite {
    pages: HashMap<String, MockPage>,
}

impl MockSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: MockPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }
}

/// Observations shared between a launcher, its sessions and the test.
#[derive(Debug, Default)]
pub struct SessionObserver {
    pub opened: AtomicUsize,
    pub clicks: AtomicUsize,
    pub closed: AtomicBool,
}

impl SessionObserver {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Hang for `duration` on every `page_source` after the first `after` calls
#[derive(Debug, Clone, Copy)]
struct Stall {
    after: usize,
    duration: Duration,
}

pub struct ScriptedSession {
    site: Arc<MockSite>,
    current: Option<Url>,
    scroll: usize,
    sources: usize,
    stall: Option<Stall>,
    close_delay: Option<Duration>,
    observer: Arc<SessionObserver>,
}

impl ScriptedSession {
    pub fn new(site: MockSite) -> Self {
        Self {
            site: Arc::new(site),
            current: None,
            scroll: 0,
            sources: 0,
            stall: None,
            close_delay: None,
            observer: Arc::new(SessionObserver::default()),
        }
    }

    pub fn clicks(&self) -> usize {
        self.observer.clicks.load(Ordering::SeqCst)
    }

    fn page(&self) -> Result<&MockPage, ScrapeError> {
        self.current
            .as_ref()
            .and_then(|url| self.site.pages.get(url.as_str()))
            .ok_or_else(|| ScrapeError::render("no page loaded"))
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    type Handle = usize;

    async fn goto(&mut self, url: &Url) -> Result<(), ScrapeError> {
        if !self.site.pages.contains_key(url.as_str()) {
            return Err(ScrapeError::render(format!("navigation to {} failed", url)));
        }
        self.current = Some(url.clone());
        self.scroll = 0;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<Url, ScrapeError> {
        self.current
            .clone()
            .ok_or_else(|| ScrapeError::render("no page loaded"))
    }

    async fn page_source(&mut self) -> Result<String, ScrapeError> {
        if let Some(stall) = self.stall
            && self.sources >= stall.after
        {
            tokio::time::sleep(stall.duration).await;
        }
        self.sources += 1;
        let page = self.page()?;
        Ok(page.states[self.scroll.min(page.states.len() - 1)].clone())
    }

    async fn scroll_height(&mut self) -> Result<u64, ScrapeError> {
        self.page()?;
        Ok((self.scroll as u64 + 1) * 1000)
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), ScrapeError> {
        let states = self.page()?.states.len();
        if self.scroll + 1 < states {
            self.scroll += 1;
        }
        Ok(())
    }

    async fn find_visible(&mut self, strategy: ClickStrategy) -> Result<Vec<usize>, ScrapeError> {
        let page = self.page()?;
        Ok(match strategy {
            ClickStrategy::Tabs => (0..page.tabs).collect(),
            _ => Vec::new(),
        })
    }

    async fn click(&mut self, _handle: &usize) -> Result<(), ScrapeError> {
        self.observer.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        self.observer.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out [`ScriptedSession`]s over one site.
pub struct ScriptedLauncher {
    site: Arc<MockSite>,
    fail: bool,
    stall: Option<Stall>,
    close_delay: Option<Duration>,
    observer: Arc<SessionObserver>,
}

impl ScriptedLauncher {
    pub fn new(site: MockSite) -> Self {
        Self {
            site: Arc::new(site),
            fail: false,
            stall: None,
            close_delay: None,
            observer: Arc::new(SessionObserver::default()),
        }
    }

    /// Launcher whose sessions can never be opened
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(MockSite::new())
        }
    }

    /// Sessions that hang for `stall` before returning any page source
    pub fn stalling(self, stall: Duration) -> Self {
        self.stalling_after(0, stall)
    }

    /// Sessions that return `after` page sources, then hang on the next
    pub fn stalling_after(mut self, after: usize, stall: Duration) -> Self {
        self.stall = Some(Stall {
            after,
            duration: stall,
        });
        self
    }

    /// Sessions whose `close` takes `delay` to return
    pub fn hanging_on_close(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    pub fn observer(&self) -> Arc<SessionObserver> {
        Arc::clone(&self.observer)
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    type Session = ScriptedSession;

    async fn open(&self) -> Result<ScriptedSession, ScrapeError> {
        self.observer.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ScrapeError::render("WebDriver unavailable"));
        }
        Ok(ScriptedSession {
            site: Arc::clone(&self.site),
            current: None,
            scroll: 0,
            sources: 0,
            stall: self.stall,
            close_delay: self.close_delay,
            observer: Arc::clone(&self.observer),
        })
    }
}
