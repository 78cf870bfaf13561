//! URL canonicalization shared by every component that touches a link.

use url::Url;

use crate::error::ScrapeError;

/// Query keys (prefix-matched, case-insensitive) stripped during normalization
const TRACKING_PREFIXES: &[&str] = &["utm_", "fbclid", "gclid", "ref_"];

/// href values that never point at a fetchable document
const UNFOLLOWABLE_PREFIXES: &[&str] = &["#", "javascript:", "mailto:", "tel:", "data:"];

/// Resolve `raw` against `base` into an absolute, tracking-free http(s) URL.
///
/// Relative and protocol-relative forms are resolved, the fragment is dropped
/// and tracking parameters are removed. Normalizing an already-normalized URL
/// returns it unchanged.
pub fn normalize(base: &Url, raw: &str) -> Result<Url, ScrapeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ScrapeError::invalid_url(raw, "empty url"));
    }

    let mut url = base
        .join(raw)
        .map_err(|e| ScrapeError::invalid_url(raw, e.to_string()))?;

    ensure_web_url(&url, raw)?;

    url.set_fragment(None);
    strip_tracking_params(&mut url);

    Ok(url)
}

/// Validate and canonicalize an entry URL supplied by a caller.
pub fn parse_root(raw: &str) -> Result<Url, ScrapeError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| ScrapeError::invalid_url(trimmed, e.to_string()))?;
    ensure_web_url(&url, trimmed)?;
    normalize(&url, trimmed)
}

/// Compare the registrable host of two URLs, ignoring scheme, port and a
/// leading `www.`.
pub fn same_domain(base: &Url, candidate: &Url) -> bool {
    match (registrable_host(base), registrable_host(candidate)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Whether an href is worth resolving at all.
pub fn is_followable(href: &str) -> bool {
    let href = href.trim();
    if href.is_empty() {
        return false;
    }
    let lower = href.to_ascii_lowercase();
    !UNFOLLOWABLE_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

pub fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    TRACKING_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

fn ensure_web_url(url: &Url, raw: &str) -> Result<(), ScrapeError> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ScrapeError::invalid_url(
                raw,
                format!("unsupported scheme `{}`", other),
            ));
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ScrapeError::invalid_url(raw, "missing host"));
    }
    Ok(())
}

fn strip_tracking_params(url: &mut Url) {
    let Some(query) = url.query() else {
        return;
    };

    if query.is_empty() {
        url.set_query(None);
        return;
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let kept: Vec<&(String, String)> = pairs.iter().filter(|(k, _)| !is_tracking_param(k)).collect();

    // Leave the original encoding alone unless something was removed
    if kept.len() == pairs.len() {
        return;
    }

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
}

fn registrable_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.trim_end_matches('.');
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}
