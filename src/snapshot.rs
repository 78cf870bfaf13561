//! Traversable DOM snapshots.
//!
//! Extraction never cares whether markup came from a plain HTTP fetch or
//! from a rendered browser session: both are exposed through [`DomSnapshot`].

use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::sync::LazyLock;
use url::Url;

use crate::fetch::FetchedPage;
use crate::utils::normalize_text;

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").expect("static selector"));

/// Elements whose text is never rendered
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Which point of the scrape a snapshot was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentState {
    Static,
    Initial,
    Click(usize),
    Scroll(usize),
    Page(usize),
}

impl fmt::Display for ContentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Initial => write!(f, "initial render"),
            Self::Click(n) => write!(f, "click #{}", n),
            Self::Scroll(n) => write!(f, "scroll #{}", n),
            Self::Page(n) => write!(f, "page #{}", n),
        }
    }
}

/// A parsed document plus the URL it was observed at.
pub trait DomSnapshot {
    fn document(&self) -> &Html;

    /// Mutable access for destructive passes such as noise filtering
    fn document_mut(&mut self) -> &mut Html;

    fn source_url(&self) -> &Url;

    /// Size of the markup the snapshot was parsed from, in bytes
    fn raw_len(&self) -> usize;

    fn state(&self) -> ContentState;

    /// Whitespace-normalized visible text of `<body>`
    fn body_text(&self) -> String {
        let document = self.document();
        match document.select(&BODY).next() {
            Some(body) => visible_text(body),
            None => visible_text(document.root_element()),
        }
    }
}

/// Whitespace-normalized text of `element`, skipping script-like content
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| INVISIBLE_TAGS.contains(&el.name()))
        });
        if !hidden {
            parts.push(text);
        }
    }
    normalize_text(&parts.join(" "))
}

/// Snapshot of a server-rendered page fetched over HTTP.
pub struct StaticSnapshot {
    url: Url,
    raw_len: usize,
    document: Html,
}

impl StaticSnapshot {
    pub fn from_page(page: &FetchedPage) -> Self {
        Self {
            url: page.url.clone(),
            raw_len: page.byte_len,
            document: Html::parse_document(&page.body),
        }
    }
}

impl DomSnapshot for StaticSnapshot {
    fn document(&self) -> &Html {
        &self.document
    }

    fn document_mut(&mut self) -> &mut Html {
        &mut self.document
    }

    fn source_url(&self) -> &Url {
        &self.url
    }

    fn raw_len(&self) -> usize {
        self.raw_len
    }

    fn state(&self) -> ContentState {
        ContentState::Static
    }
}

/// Snapshot of the live DOM of a browser session at one content state.
pub struct RenderedSnapshot {
    url: Url,
    state: ContentState,
    raw_len: usize,
    document: Html,
}

impl RenderedSnapshot {
    pub fn new(url: Url, state: ContentState, source: &str) -> Self {
        Self {
            url,
            state,
            raw_len: source.len(),
            document: Html::parse_document(source),
        }
    }
}

impl DomSnapshot for RenderedSnapshot {
    fn document(&self) -> &Html {
        &self.document
    }

    fn document_mut(&mut self) -> &mut Html {
        &mut self.document
    }

    fn source_url(&self) -> &Url {
        &self.url
    }

    fn raw_len(&self) -> usize {
        self.raw_len
    }

    fn state(&self) -> ContentState {
        self.state
    }
}
