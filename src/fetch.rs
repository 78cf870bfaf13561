use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::config::ScraperConfig;
use crate::error::ScrapeError;
use crate::utils::get_random_user_agent;

/// Raw markup returned by a static fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    /// Body size in bytes as received
    pub byte_len: usize,
    pub body: String,
}

/// Plain HTTP retrieval of a single page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, ScrapeError>;
}

/// [`PageFetcher`] backed by reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: Option<String>,
    max_content_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .cookie_store(true)
            .build()
            .map_err(|e| ScrapeError::fetch("<client>", e))?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            max_content_bytes: config.max_content_bytes,
        })
    }

    fn too_large(&self, url: &Url, size: usize) -> ScrapeError {
        ScrapeError::ContentTooLarge {
            url: url.to_string(),
            size,
            limit: self.max_content_bytes,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, ScrapeError> {
        let user_agent = self
            .user_agent
            .as_deref()
            .unwrap_or_else(|| get_random_user_agent());

        let mut response = self
            .client
            .get(url.as_str())
            .header("User-Agent", user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .map_err(|e| ScrapeError::fetch(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::fetch(url.as_str(), format!("HTTP error: {}", status)));
        }

        if let Some(declared) = response.content_length() {
            if declared as usize > self.max_content_bytes {
                return Err(self.too_large(url, declared as usize));
            }
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        // Read incrementally so an oversized body is rejected without
        // buffering all of it
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ScrapeError::fetch(url.as_str(), e))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > self.max_content_bytes {
                return Err(self.too_large(url, body.len()));
            }
        }

        log::debug!("Fetched {} ({} bytes, status {})", final_url, body.len(), status);

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            byte_len: body.len(),
            body: decode_body(&body, content_type.as_deref()),
        })
    }
}

/// `charset` parameter of a `Content-Type` header value
fn charset_of(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Decode a response body using its declared charset, UTF-8 when absent or
/// unknown. A byte order mark takes precedence over the header.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_of)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        log::debug!("Malformed {} sequences replaced while decoding body", used.name());
    }
    text.into_owned()
}
