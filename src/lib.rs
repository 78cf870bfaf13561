// Section Scraper Library
//
// Turns any web page into a normalized, section-aware document, rendering it
// in a browser session only when the static markup is not enough.

pub mod api;
pub mod assembler;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod interaction;
pub mod noise;
pub mod session;
pub mod snapshot;
pub mod strategy;
pub mod truncate;
pub mod url_normalizer;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::{ContentLimits, ScraperConfig};
pub use document::{
    Heading, Image, Interactions, Link, Meta, ScrapeDocument, ScrapeMethod, ScrapeResponse,
    Section, SectionContent, SectionType,
};
pub use engine::AdaptiveScraper;
pub use error::{ErrorEntry, ErrorKind, ScrapeError, Stage};
pub use fetch::{FetchedPage, HttpFetcher, PageFetcher};
pub use session::{BrowserSession, SessionLauncher, WebDriverLauncher, WebDriverSession};
pub use url_normalizer::normalize;
pub use utils::{USER_AGENTS, get_random_user_agent};
