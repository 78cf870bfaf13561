use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised anywhere in the scrape pipeline.
///
/// Only [`ScrapeError::InvalidUrl`] and a [`ScrapeError::FetchFailure`] on the
/// entry page abort a scrape; everything else is recorded as an [`ErrorEntry`]
/// on the returned document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScrapeError {
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to fetch {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("render failure: {0}")]
    RenderFailure(String),

    #[error("{phase} exceeded its {budget_ms} ms budget")]
    Timeout { phase: String, budget_ms: u64 },

    #[error("content of {url} is {size} bytes, ceiling is {limit} bytes")]
    ContentTooLarge { url: String, size: usize, limit: usize },
}

impl ScrapeError {
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::FetchFailure {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn render(reason: impl ToString) -> Self {
        Self::RenderFailure(reason.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::FetchFailure { .. } => ErrorKind::FetchFailure,
            Self::RenderFailure(_) => ErrorKind::RenderFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ContentTooLarge { .. } => ErrorKind::ContentTooLarge,
        }
    }

    /// Whether this error prevents a document from being produced when it is
    /// raised for the entry page.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidUrl { .. } | Self::FetchFailure { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidUrl,
    FetchFailure,
    RenderFailure,
    Timeout,
    ContentTooLarge,
}

/// Pipeline component an [`ErrorEntry`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Render,
    Click,
    Scroll,
    Pagination,
    Extract,
}

/// A recoverable failure recorded on the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ErrorEntry {
    pub fn new(stage: Stage, error: &ScrapeError, url: Option<&str>) -> Self {
        Self {
            stage,
            kind: error.kind(),
            message: error.to_string(),
            url: url.map(str::to_string),
        }
    }
}
