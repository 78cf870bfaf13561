use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ErrorEntry;

/// The normalized, section-aware result of one scrape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeDocument {
    pub url: String,
    pub scraped_at: String,
    pub meta: Meta,
    pub sections: Vec<Section>,
    pub interactions: Interactions,
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub title: String,
    pub description: String,
    pub language: String,
    pub canonical_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    #[serde(rename = "type")]
    pub section_type: SectionType,
    pub label: String,
    pub source_url: String,
    pub content: SectionContent,
    pub raw_html: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Hero,
    Nav,
    Main,
    Article,
    List,
    Grid,
    Faq,
    Pricing,
    Footer,
    Section,
}

impl SectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hero => "hero",
            Self::Nav => "nav",
            Self::Main => "main",
            Self::Article => "article",
            Self::List => "list",
            Self::Grid => "grid",
            Self::Faq => "faq",
            Self::Pricing => "pricing",
            Self::Footer => "footer",
            Self::Section => "section",
        }
    }
}

impl Default for SectionType {
    fn default() -> Self {
        Self::Section
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionContent {
    pub headings: Vec<Heading>,
    pub text: String,
    pub links: Vec<Link>,
    pub images: Vec<Image>,
    pub lists: Vec<Vec<String>>,
    pub tables: Vec<Vec<Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub src: String,
    pub alt: String,
}

/// Record of the exploration performed on a dynamic session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interactions {
    pub clicks: usize,
    pub scrolls: usize,
    /// Visited page URLs, starting with the entry URL
    pub pages: Vec<String>,
}

impl Interactions {
    pub fn starting_at(url: &str) -> Self {
        Self {
            clicks: 0,
            scrolls: 0,
            pages: vec![url.to_string()],
        }
    }

    /// Depth budget consumed so far: scrolls plus followed pages.
    pub fn depth_used(&self) -> usize {
        self.scrolls + self.pages.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMethod {
    Static,
    Dynamic,
}

/// Response shape carried by the request-handling layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub result: ScrapeDocument,
    pub method: ScrapeMethod,
}
