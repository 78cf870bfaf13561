//! Bounded exploration of a rendered page.
//!
//! The driver walks `Loaded → Interacting(Clicks → Scrolls → Pagination) →
//! Settled`. Every content state it reaches is handed to the
//! [`DocumentAssembler`] straight away, so whatever was captured survives if
//! the surrounding timeout drops the exploration midway.

use scraper::{Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

use crate::assembler::DocumentAssembler;
use crate::config::ScraperConfig;
use crate::error::{ScrapeError, Stage};
use crate::session::{BrowserSession, ClickStrategy};
use crate::snapshot::{ContentState, DomSnapshot, RenderedSnapshot};
use crate::url_normalizer::{is_followable, normalize, same_domain};
use crate::utils::normalize_text;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static REL_NEXT: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[rel~="next"][href], link[rel~="next"][href]"#));
static NEXT_CLASS: LazyLock<Selector> =
    LazyLock::new(|| selector("a.next[href], .next a[href]"));
static PAGINATION_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#".pagination a[href], .pager a[href], [class*="pagination"] a[href], nav[aria-label*="agination"] a[href]"#,
    )
});
static ANY_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Clicks,
    Scrolls,
    Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Loaded,
    Interacting(Phase),
    Settled,
}

/// What the driver learned from the most recent content state
#[derive(Debug, Default)]
struct Cursor {
    url: Option<Url>,
    next_link: Option<Url>,
}

/// Runs click, scroll and pagination discovery against one session.
pub struct InteractionDriver {
    settle_delay: Duration,
    depth: usize,
    max_scrolls: usize,
    max_pages: usize,
    max_clicks: usize,
}

impl InteractionDriver {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            depth: config.exploration_depth,
            max_scrolls: config.max_scrolls,
            max_pages: config.max_pages,
            max_clicks: config.max_clicks_per_strategy,
        }
    }

    /// Explore `entry` in `session`, feeding each observed state to
    /// `assembler`. Failures are recorded there; this never aborts.
    pub async fn explore<S: BrowserSession>(
        &self,
        session: &mut S,
        entry: &Url,
        assembler: &mut DocumentAssembler,
    ) {
        let mut cursor = Cursor::default();
        let mut state = DriverState::Loaded;

        loop {
            state = match state {
                DriverState::Loaded => {
                    if self.load(session, entry, assembler, &mut cursor).await {
                        DriverState::Interacting(Phase::Clicks)
                    } else {
                        DriverState::Settled
                    }
                }
                DriverState::Interacting(Phase::Clicks) => {
                    self.discover_clicks(session, assembler, &mut cursor).await;
                    DriverState::Interacting(Phase::Scrolls)
                }
                DriverState::Interacting(Phase::Scrolls) => {
                    self.discover_scrolls(session, assembler, &mut cursor).await;
                    DriverState::Interacting(Phase::Pagination)
                }
                DriverState::Interacting(Phase::Pagination) => {
                    self.discover_pages(session, entry, assembler, &mut cursor).await;
                    DriverState::Settled
                }
                DriverState::Settled => break,
            };
            log::debug!("Interaction driver → {:?}", state);
        }
    }

    async fn load<S: BrowserSession>(
        &self,
        session: &mut S,
        entry: &Url,
        assembler: &mut DocumentAssembler,
        cursor: &mut Cursor,
    ) -> bool {
        if let Err(e) = session.goto(entry).await {
            assembler.record(Stage::Render, &e, Some(entry.as_str()));
            return false;
        }
        self.settle().await;
        self.capture(session, ContentState::Initial, assembler, cursor)
            .await
    }

    async fn discover_clicks<S: BrowserSession>(
        &self,
        session: &mut S,
        assembler: &mut DocumentAssembler,
        cursor: &mut Cursor,
    ) {
        for strategy in ClickStrategy::ALL {
            let targets = match session.find_visible(strategy).await {
                Ok(targets) => targets,
                Err(e) => {
                    assembler.record(Stage::Click, &e, cursor.url.as_ref().map(Url::as_str));
                    continue;
                }
            };
            if !targets.is_empty() {
                log::debug!("{} visible {} target(s)", targets.len(), strategy.name());
            }

            for target in targets.iter().take(self.max_clicks) {
                if let Err(e) = session.click(target).await {
                    assembler.record(Stage::Click, &e, cursor.url.as_ref().map(Url::as_str));
                    continue;
                }
                self.settle().await;

                let interactions = assembler.interactions_mut();
                interactions.clicks += 1;
                let n = interactions.clicks;
                self.capture(session, ContentState::Click(n), assembler, cursor)
                    .await;
            }
        }
    }

    async fn discover_scrolls<S: BrowserSession>(
        &self,
        session: &mut S,
        assembler: &mut DocumentAssembler,
        cursor: &mut Cursor,
    ) {
        while assembler.interactions().scrolls < self.max_scrolls
            && assembler.interactions().depth_used() < self.depth
        {
            let url = cursor.url.as_ref().map(Url::to_string);
            let before = match session.scroll_height().await {
                Ok(height) => height,
                Err(e) => {
                    assembler.record(Stage::Scroll, &e, url.as_deref());
                    return;
                }
            };
            if let Err(e) = session.scroll_to_bottom().await {
                assembler.record(Stage::Scroll, &e, url.as_deref());
                return;
            }
            self.settle().await;
            let after = match session.scroll_height().await {
                Ok(height) => height,
                Err(e) => {
                    assembler.record(Stage::Scroll, &e, url.as_deref());
                    return;
                }
            };

            if after <= before {
                log::debug!("Scroll height stable at {}, no more content to load", after);
                return;
            }

            let interactions = assembler.interactions_mut();
            interactions.scrolls += 1;
            let n = interactions.scrolls;
            self.capture(session, ContentState::Scroll(n), assembler, cursor)
                .await;
        }
    }

    async fn discover_pages<S: BrowserSession>(
        &self,
        session: &mut S,
        entry: &Url,
        assembler: &mut DocumentAssembler,
        cursor: &mut Cursor,
    ) {
        let mut followed = 0;
        while followed < self.max_pages && assembler.interactions().depth_used() < self.depth {
            let Some(next) = cursor.next_link.take() else {
                return;
            };
            if !same_domain(entry, &next) {
                log::debug!("Next link {} leaves the site, stopping", next);
                return;
            }
            if assembler.interactions().pages.iter().any(|p| p == next.as_str()) {
                log::debug!("Next link {} already visited, stopping", next);
                return;
            }

            if let Err(e) = session.goto(&next).await {
                let err = ScrapeError::fetch(next.as_str(), e);
                assembler.record(Stage::Pagination, &err, Some(next.as_str()));
                return;
            }
            self.settle().await;

            assembler.interactions_mut().pages.push(next.to_string());
            followed += 1;
            log::info!("Followed pagination to {}", next);

            cursor.url = Some(next);
            self.capture(session, ContentState::Page(followed), assembler, cursor)
                .await;
        }
    }

    /// Snapshot the live page and extract it. Returns whether a state was
    /// captured.
    async fn capture<S: BrowserSession>(
        &self,
        session: &mut S,
        state: ContentState,
        assembler: &mut DocumentAssembler,
        cursor: &mut Cursor,
    ) -> bool {
        cursor.next_link = None;

        let url = match session.current_url().await {
            Ok(url) => url,
            Err(e) => {
                log::debug!("Falling back to last known url: {}", e);
                cursor
                    .url
                    .clone()
                    .unwrap_or_else(|| assembler.root().clone())
            }
        };

        let source = match session.page_source().await {
            Ok(source) => source,
            Err(e) => {
                assembler.record(Stage::Render, &e, Some(url.as_str()));
                return false;
            }
        };

        // Parsed documents are not Send; keep them out of any await
        let mut snapshot = RenderedSnapshot::new(url.clone(), state, &source);
        cursor.next_link = find_next_link(snapshot.document(), &url);
        assembler.absorb(&mut snapshot);
        cursor.url = Some(url);
        true
    }

    async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
    }
}

/// Locate the "next page" link of a rendered document, if any
pub fn find_next_link(document: &Html, current: &Url) -> Option<Url> {
    let resolve = |href: &str| -> Option<Url> {
        if !is_followable(href) {
            return None;
        }
        let url = normalize(current, href).ok()?;
        (url != *current).then_some(url)
    };

    let by_rel = document
        .select(&REL_NEXT)
        .filter_map(|el| el.value().attr("href"))
        .find_map(resolve);
    if by_rel.is_some() {
        return by_rel;
    }

    let by_class = document
        .select(&NEXT_CLASS)
        .filter_map(|el| el.value().attr("href"))
        .find_map(resolve);
    if by_class.is_some() {
        return by_class;
    }

    let by_text = |sel: &Selector| {
        document
            .select(sel)
            .filter(|el| {
                let text = el.text().collect::<String>();
                let label = el.value().attr("aria-label").unwrap_or_default();
                is_next_text(&text) || is_next_text(label)
            })
            .filter_map(|el| el.value().attr("href"))
            .find_map(resolve)
    };

    by_text(&*PAGINATION_LINKS).or_else(|| by_text(&*ANY_LINK))
}

fn is_next_text(text: &str) -> bool {
    let text = normalize_text(text).to_lowercase();
    matches!(text.as_str(), "next" | "next page" | "›" | "»" | "→")
        || (text.starts_with("next ") && text.chars().count() <= 12)
}
