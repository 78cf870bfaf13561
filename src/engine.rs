use std::sync::Arc;
use tokio::time::{Instant, timeout, timeout_at};
use url::Url;

use crate::assembler::DocumentAssembler;
use crate::config::ScraperConfig;
use crate::document::{ScrapeMethod, ScrapeResponse};
use crate::error::{ScrapeError, Stage};
use crate::fetch::{FetchedPage, HttpFetcher, PageFetcher};
use crate::interaction::InteractionDriver;
use crate::session::{BrowserSession, SessionLauncher, WebDriverLauncher};
use crate::snapshot::StaticSnapshot;
use crate::strategy::StrategySelector;
use crate::url_normalizer::parse_root;

/// Adaptive section scraper: a static fetch first, a rendered session with
/// bounded exploration when the static markup is not enough.
pub struct AdaptiveScraper<F, L> {
    config: Arc<ScraperConfig>,
    fetcher: F,
    launcher: L,
    selector: StrategySelector,
    driver: InteractionDriver,
}

impl AdaptiveScraper<HttpFetcher, WebDriverLauncher> {
    /// Scraper over reqwest and a WebDriver server
    pub fn from_config(config: Arc<ScraperConfig>) -> Result<Self, ScrapeError> {
        let fetcher = HttpFetcher::new(&config)?;
        let launcher = WebDriverLauncher::new(&config);
        Ok(Self::new(config, fetcher, launcher))
    }
}

impl<F: PageFetcher, L: SessionLauncher> AdaptiveScraper<F, L> {
    pub fn new(config: Arc<ScraperConfig>, fetcher: F, launcher: L) -> Self {
        Self {
            selector: StrategySelector::new(config.static_text_threshold),
            driver: InteractionDriver::new(&config),
            config,
            fetcher,
            launcher,
        }
    }

    /// Scrape `raw_url` into a sectioned document.
    ///
    /// Fails only when the URL is unusable or the entry page cannot be
    /// fetched; every other problem is reported in the document's `errors`.
    pub async fn scrape(&self, raw_url: &str) -> Result<ScrapeResponse, ScrapeError> {
        let root = parse_root(raw_url)?;
        log::info!("Scraping {}", root);

        let mut assembler = DocumentAssembler::new(&self.config, root.clone());

        let page = match self.fetcher.fetch(&root).await {
            Ok(page) => Some(page),
            Err(e @ ScrapeError::ContentTooLarge { .. }) => {
                assembler.record(Stage::Fetch, &e, Some(root.as_str()));
                None
            }
            Err(e) => {
                log::error!("Failed to fetch {}: {}", root, e);
                return Err(e);
            }
        };

        if let Some(page) = &page
            && self.try_static(page, &mut assembler)
        {
            return Ok(ScrapeResponse {
                result: assembler.finish(),
                method: ScrapeMethod::Static,
            });
        }

        self.scrape_dynamic(&root, &mut assembler).await;

        if !assembler.has_states()
            && let Some(page) = &page
        {
            log::warn!("No rendered state captured for {}, using static markup", root);
            let mut snapshot = StaticSnapshot::from_page(page);
            assembler.absorb(&mut snapshot);
        }

        Ok(ScrapeResponse {
            result: assembler.finish(),
            method: ScrapeMethod::Dynamic,
        })
    }

    /// Extract `page` directly when the strategy selector allows it.
    /// Otherwise only its meta is kept; the rendered states supply sections.
    fn try_static(&self, page: &FetchedPage, assembler: &mut DocumentAssembler) -> bool {
        let mut snapshot = StaticSnapshot::from_page(page);
        let decision = self.selector.decide(&snapshot);
        log::info!(
            "Strategy for {}: {:?} ({:?}, {} chars, landmark: {})",
            page.url,
            decision.method,
            decision.reason,
            decision.text_len,
            decision.has_landmark
        );

        if decision.method != ScrapeMethod::Static {
            assembler.seed_meta(&snapshot);
            return false;
        }
        assembler.absorb(&mut snapshot);
        true
    }

    /// Run the rendered phase under one deadline. The session is closed on
    /// every path once it has been opened.
    async fn scrape_dynamic(&self, root: &Url, assembler: &mut DocumentAssembler) {
        let budget = self.config.page_load_timeout();
        let deadline = Instant::now() + budget;
        let timed_out = || ScrapeError::Timeout {
            phase: "dynamic session".to_string(),
            budget_ms: budget.as_millis() as u64,
        };

        let mut session = match timeout_at(deadline, self.launcher.open()).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                assembler.record(Stage::Render, &e, Some(root.as_str()));
                return;
            }
            Err(_) => {
                assembler.record(Stage::Render, &timed_out(), Some(root.as_str()));
                return;
            }
        };

        let explored = timeout_at(deadline, self.driver.explore(&mut session, root, assembler)).await;
        if explored.is_err() {
            assembler.record(Stage::Render, &timed_out(), Some(root.as_str()));
        }

        let close_budget = self.config.session_close_timeout();
        match timeout(close_budget, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Failed to close browser session: {}", e),
            Err(_) => log::warn!("Browser session did not close within {:?}, abandoning it", close_budget),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SectionType;
    use crate::error::ErrorKind;
    use crate::testing::{MockFetcher, MockPage, MockSite, ScriptedLauncher};
    use std::time::Duration;

    const ROOT: &str = "https://example.com/";

    fn config() -> ScraperConfig {
        let mut config = ScraperConfig::default();
        config.settle_delay_ms = 0;
        config
    }

    fn scraper(
        config: ScraperConfig,
        fetcher: MockFetcher,
        launcher: ScriptedLauncher,
    ) -> AdaptiveScraper<MockFetcher, ScriptedLauncher> {
        AdaptiveScraper::new(Arc::new(config), fetcher, launcher)
    }

    fn rich_static_page() -> String {
        let prose = "Lorem ipsum dolor sit amet. ".repeat(108);
        let mut body = String::from("<header><h1>Acme</h1></header><nav><a href=\"/docs\">Docs</a></nav>");
        body.push_str(&format!("<main><h2>Overview</h2><p>{}</p></main>", prose));
        for i in 0..8 {
            body.push_str(&format!("<section><h2>Part {}</h2><p>Detail {}</p></section>", i, i));
        }
        body.push_str("<footer>Contact</footer>");
        format!("<html lang=\"en\"><head><title>Acme</title></head><body>{}</body></html>", body)
    }

    fn shell_page() -> &'static str {
        "<html><body><div id=\"app\">Loading the application, please wait a moment...</div></body></html>"
    }

    #[tokio::test]
    async fn test_static_page_skips_rendering() {
        let launcher = ScriptedLauncher::new(MockSite::new());
        let observer = launcher.observer();
        let scraper = scraper(
            config(),
            MockFetcher::new().with_page(ROOT, &rich_static_page()),
            launcher,
        );

        let response = scraper.scrape("https://example.com").await.unwrap();
        let doc = response.result;

        assert_eq!(response.method, ScrapeMethod::Static);
        assert_eq!(doc.sections.len(), 12);
        assert_eq!(doc.interactions.clicks, 0);
        assert_eq!(doc.interactions.scrolls, 0);
        assert_eq!(doc.interactions.pages, vec![ROOT.to_string()]);
        assert_eq!(doc.meta.title, "Acme");
        assert!(doc.errors.is_empty());
        assert_eq!(observer.opened(), 0);
    }

    #[tokio::test]
    async fn test_pagination_on_rendered_page() {
        let site = MockSite::new()
            .with_page(
                ROOT,
                MockPage::single(r#"<body><main><h1>Page one</h1></main><a href="/page/2">Next</a></body>"#),
            )
            .with_page(
                "https://example.com/page/2",
                MockPage::single(r#"<body><main><h1>Page two</h1></main><a href="/page/3">Next</a></body>"#),
            )
            .with_page(
                "https://example.com/page/3",
                MockPage::single("<body><main><h1>Page three</h1></main></body>"),
            );
        let launcher = ScriptedLauncher::new(site);
        let observer = launcher.observer();
        let scraper = scraper(config(), MockFetcher::new().with_page(ROOT, shell_page()), launcher);

        let response = scraper.scrape(ROOT).await.unwrap();
        let doc = response.result;

        assert_eq!(response.method, ScrapeMethod::Dynamic);
        assert_eq!(
            doc.interactions.pages,
            vec![
                ROOT.to_string(),
                "https://example.com/page/2".to_string(),
                "https://example.com/page/3".to_string(),
            ]
        );
        for page in &doc.interactions.pages {
            assert!(doc.sections.iter().any(|s| &s.source_url == page), "{}", page);
        }
        assert!(doc.interactions.scrolls + doc.interactions.pages.len() - 1 <= 3);
        assert!(observer.closed());
    }

    #[tokio::test]
    async fn test_scroll_states_are_all_extracted() {
        let states: Vec<String> = (1..=4)
            .map(|n| {
                let sections: String = (0..n)
                    .map(|i| format!("<section><h2>Batch {}</h2></section>", i))
                    .collect();
                format!("<body>{}</body>", sections)
            })
            .collect();
        let site = MockSite::new().with_page(ROOT, MockPage::scrolling(states));
        let scraper = scraper(
            config(),
            MockFetcher::new().with_page(ROOT, shell_page()),
            ScriptedLauncher::new(site),
        );

        let doc = scraper.scrape(ROOT).await.unwrap().result;

        assert_eq!(doc.interactions.scrolls, 3);
        // 1 + 2 + 3 + 4 sections from the initial state and three scrolls
        assert_eq!(doc.sections.len(), 10);
        assert_eq!(doc.sections.last().unwrap().id, "section-9");
    }

    #[tokio::test]
    async fn test_file_url_is_rejected() {
        let fetcher = MockFetcher::new();
        let scraper = scraper(config(), fetcher, ScriptedLauncher::new(MockSite::new()));

        let err = scraper.scrape("file:///etc/passwd").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidUrl);
        assert_eq!(scraper.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_root_fetch_failure_is_fatal() {
        let scraper = scraper(
            config(),
            MockFetcher::new().with_error(ROOT, ScrapeError::fetch(ROOT, "HTTP error: 503")),
            ScriptedLauncher::new(MockSite::new()),
        );

        let err = scraper.scrape(ROOT).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FetchFailure);
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_oversized_section_is_truncated() {
        let filler = "é".repeat(4000);
        let prose = "word ".repeat(60);
        let html = format!(
            "<body><main><p>{}</p></main><section><p>{}</p></section></body>",
            prose, filler
        );
        let scraper = scraper(
            config(),
            MockFetcher::new().with_page(ROOT, &html),
            ScriptedLauncher::new(MockSite::new()),
        );

        let doc = scraper.scrape(ROOT).await.unwrap().result;
        let section = doc
            .sections
            .iter()
            .find(|s| s.section_type == SectionType::Section)
            .unwrap();

        assert!(section.truncated);
        assert!(section.raw_html.len() <= 3000);
        assert!(section.raw_html.ends_with('é') || section.raw_html.ends_with('>'));
        assert!(!doc.sections[0].truncated);
    }

    #[tokio::test]
    async fn test_links_stay_on_root_host() {
        let prose = "Plenty of static prose for the selector. ".repeat(10);
        let html = format!(
            r#"<body><main><p>{}</p>
                <a href="/a">A</a><a href="https://www.example.com/b">B</a>
                <a href="https://tracker.net/c">C</a><a href="//cdn.other.io/d">D</a>
            </main></body>"#,
            prose
        );
        let scraper = scraper(
            config(),
            MockFetcher::new().with_page(ROOT, &html),
            ScriptedLauncher::new(MockSite::new()),
        );

        let doc = scraper.scrape(ROOT).await.unwrap().result;
        let links: Vec<_> = doc.sections.iter().flat_map(|s| &s.content.links).collect();

        assert_eq!(links.len(), 2);
        for link in links {
            let host = Url::parse(&link.href).unwrap().host_str().unwrap().to_string();
            assert_eq!(host.trim_start_matches("www."), "example.com");
        }
    }

    #[tokio::test]
    async fn test_session_failure_falls_back_to_static_markup() {
        let launcher = ScriptedLauncher::failing();
        let scraper = scraper(config(), MockFetcher::new().with_page(ROOT, shell_page()), launcher);

        let response = scraper.scrape(ROOT).await.unwrap();
        let doc = response.result;

        assert_eq!(response.method, ScrapeMethod::Dynamic);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.errors.len(), 1);
        assert_eq!(doc.errors[0].kind, ErrorKind::RenderFailure);
        assert_eq!(doc.errors[0].stage, Stage::Render);
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_state_and_closes_session() {
        let mut cfg = config();
        cfg.page_load_timeout_ms = 50;
        let site = MockSite::new().with_page(ROOT, MockPage::single("<body><main>Late</main></body>"));
        let launcher = ScriptedLauncher::new(site).stalling(Duration::from_secs(30));
        let observer = launcher.observer();
        let scraper = scraper(cfg, MockFetcher::new().with_page(ROOT, shell_page()), launcher);

        let doc = scraper.scrape(ROOT).await.unwrap().result;

        assert!(observer.closed());
        assert!(doc.errors.iter().any(|e| e.kind == ErrorKind::Timeout));
        // Nothing rendered in time, so the static shell was extracted instead
        assert_eq!(doc.sections.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_mid_exploration_keeps_rendered_sections() {
        let mut cfg = config();
        cfg.page_load_timeout_ms = 100;
        let states = vec![
            "<body><main><h1>First</h1></main></body>".to_string(),
            "<body><main><h1>First</h1></main><section><h2>Second</h2></section></body>".to_string(),
        ];
        let site = MockSite::new().with_page(ROOT, MockPage::scrolling(states));
        let launcher = ScriptedLauncher::new(site).stalling_after(1, Duration::from_secs(30));
        let observer = launcher.observer();
        let scraper = scraper(cfg, MockFetcher::new().with_page(ROOT, shell_page()), launcher);

        let response = scraper.scrape(ROOT).await.unwrap();
        let doc = response.result;

        assert_eq!(response.method, ScrapeMethod::Dynamic);
        let labels: Vec<&str> = doc.sections.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["First"]);
        assert_eq!(doc.interactions.scrolls, 1);
        assert_eq!(doc.errors.len(), 1);
        assert_eq!(doc.errors[0].kind, ErrorKind::Timeout);
        assert!(observer.closed());
    }

    #[tokio::test]
    async fn test_hung_close_does_not_stall_scrape() {
        let mut cfg = config();
        cfg.session_close_timeout_ms = 50;
        let site = MockSite::new().with_page(ROOT, MockPage::single("<body><main>Rendered</main></body>"));
        let launcher = ScriptedLauncher::new(site).hanging_on_close(Duration::from_secs(30));
        let scraper = scraper(cfg, MockFetcher::new().with_page(ROOT, shell_page()), launcher);

        let response = tokio::time::timeout(Duration::from_secs(5), scraper.scrape(ROOT))
            .await
            .expect("scrape finished despite a hung close")
            .unwrap();

        assert_eq!(response.result.sections[0].label, "Rendered");
    }

    #[tokio::test]
    async fn test_meta_comes_from_static_shell_on_dynamic_path() {
        let shell = r#"<html lang="de"><head><title>Static Title</title>
            <meta name="description" content="static desc"></head>
            <body><div id="app">Loading...</div></body></html>"#;
        let rendered = r#"<html lang="fr"><head><title>Rendered Title</title></head>
            <body><main><h1>Rendered</h1></main></body></html>"#;
        let site = MockSite::new().with_page(ROOT, MockPage::single(rendered));
        let scraper = scraper(
            config(),
            MockFetcher::new().with_page(ROOT, shell),
            ScriptedLauncher::new(site),
        );

        let response = scraper.scrape(ROOT).await.unwrap();
        let doc = response.result;

        assert_eq!(response.method, ScrapeMethod::Dynamic);
        assert_eq!(doc.meta.title, "Static Title");
        assert_eq!(doc.meta.description, "static desc");
        assert_eq!(doc.meta.language, "de");
        assert_eq!(doc.sections[0].label, "Rendered");
    }

    #[tokio::test]
    async fn test_oversized_root_goes_dynamic() {
        let site = MockSite::new().with_page(ROOT, MockPage::single("<body><main>Rendered</main></body>"));
        let too_large = ScrapeError::ContentTooLarge {
            url: ROOT.to_string(),
            size: 20 * 1024 * 1024,
            limit: 10 * 1024 * 1024,
        };
        let scraper = scraper(
            config(),
            MockFetcher::new().with_error(ROOT, too_large),
            ScriptedLauncher::new(site),
        );

        let response = scraper.scrape(ROOT).await.unwrap();

        assert_eq!(response.method, ScrapeMethod::Dynamic);
        assert_eq!(response.result.sections[0].label, "Rendered");
        assert_eq!(response.result.errors[0].kind, ErrorKind::ContentTooLarge);
        assert_eq!(response.result.errors[0].stage, Stage::Fetch);
    }
}
