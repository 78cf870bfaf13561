//! Removal of cookie banners, newsletter prompts and modal overlays.

use scraper::Selector;

use crate::snapshot::DomSnapshot;

/// Roots that are never removed, whatever their class says
const PROTECTED_TAGS: &[&str] = &["html", "head", "body"];

/// Strips elements whose `class` or `id` matches a wildcard pattern.
///
/// Pattern syntax: `*x*` contains, `x*` prefix, `*x` suffix and a bare `x`
/// matches a whole class token or the exact id.
pub struct NoiseFilter {
    selectors: Vec<Selector>,
}

impl NoiseFilter {
    pub fn new(patterns: &[String]) -> Self {
        let mut selectors = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            match pattern_to_css(pattern).map(|css| Selector::parse(&css).map_err(|e| e.to_string())) {
                Some(Ok(selector)) => selectors.push(selector),
                Some(Err(e)) => log::warn!("Ignoring noise pattern `{}`: {}", pattern, e),
                None => log::warn!("Ignoring empty noise pattern"),
            }
        }
        Self { selectors }
    }

    /// Detach every matching element from the snapshot's tree and return how
    /// many were removed. Nested matches are counted once.
    pub fn apply<S: DomSnapshot + ?Sized>(&self, snapshot: &mut S) -> usize {
        let document = snapshot.document();
        let mut doomed = Vec::new();
        for selector in &self.selectors {
            for element in document.select(selector) {
                if PROTECTED_TAGS.contains(&element.value().name()) {
                    continue;
                }
                doomed.push(element.id());
            }
        }
        doomed.sort();
        doomed.dedup();

        let tree = &mut snapshot.document_mut().tree;
        let mut removed = 0;
        for id in doomed {
            // Ancestors of an already-detached element are no longer reachable
            // from the root; skip them so the count reflects what was visible
            let attached = tree
                .get(id)
                .is_some_and(|node| node.ancestors().any(|a| a.id() == tree.root().id()));
            if !attached {
                continue;
            }
            if let Some(mut node) = tree.get_mut(id) {
                node.detach();
                removed += 1;
            }
        }

        if removed > 0 {
            log::debug!(
                "Noise filter removed {} element(s) from {}",
                removed,
                snapshot.source_url()
            );
        }
        removed
    }
}

fn pattern_to_css(pattern: &str) -> Option<String> {
    let pattern = pattern.trim();
    let leading = pattern.starts_with('*');
    let trailing = pattern.len() > 1 && pattern.ends_with('*');
    let core = pattern.trim_matches('*');
    if core.is_empty() {
        return None;
    }
    let core = core.replace('\\', "\\\\").replace('"', "\\\"");

    let css = match (leading, trailing) {
        (true, true) => format!(r#"[class*="{0}"], [id*="{0}"]"#, core),
        (false, true) => format!(r#"[class^="{0}"], [id^="{0}"]"#, core),
        (true, false) => format!(r#"[class$="{0}"], [id$="{0}"]"#, core),
        (false, false) => format!(r#"[class~="{0}"], [id="{0}"]"#, core),
    };
    Some(css)
}
