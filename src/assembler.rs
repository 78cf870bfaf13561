use chrono::Utc;
use url::Url;

use crate::config::ScraperConfig;
use crate::document::{Interactions, Meta, ScrapeDocument, Section};
use crate::error::{ErrorEntry, ScrapeError, Stage};
use crate::extractor::{SectionExtractor, extract_meta};
use crate::noise::NoiseFilter;
use crate::snapshot::DomSnapshot;

/// Accumulates everything observed during one scrape and freezes it into a
/// [`ScrapeDocument`].
///
/// Every content state is offered through [`DocumentAssembler::absorb`],
/// which filters noise, extracts sections and keeps the id counter running
/// across states.
pub struct DocumentAssembler {
    root: Url,
    noise: NoiseFilter,
    extractor: SectionExtractor,
    default_language: String,
    max_content_bytes: usize,
    meta: Option<Meta>,
    sections: Vec<Section>,
    interactions: Interactions,
    errors: Vec<ErrorEntry>,
    states: usize,
}

impl DocumentAssembler {
    pub fn new(config: &ScraperConfig, root: Url) -> Self {
        Self {
            noise: NoiseFilter::new(&config.noise_patterns),
            extractor: SectionExtractor::new(config, root.clone()),
            default_language: config.default_language.clone(),
            max_content_bytes: config.max_content_bytes,
            meta: None,
            sections: Vec::new(),
            interactions: Interactions::starting_at(root.as_str()),
            errors: Vec::new(),
            states: 0,
            root,
        }
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Extract one content state. Returns the number of sections added.
    pub fn absorb<S: DomSnapshot + ?Sized>(&mut self, snapshot: &mut S) -> usize {
        let url = snapshot.source_url().to_string();

        if snapshot.raw_len() > self.max_content_bytes {
            let err = ScrapeError::ContentTooLarge {
                url: url.clone(),
                size: snapshot.raw_len(),
                limit: self.max_content_bytes,
            };
            self.record(Stage::Extract, &err, Some(&url));
            return 0;
        }

        self.seed_meta(&*snapshot);

        let removed = self.noise.apply(snapshot);
        let sections = self.extractor.extract(snapshot, self.sections.len());
        let added = sections.len();

        log::debug!(
            "{} of {}: {} section(s), {} noise element(s) removed",
            snapshot.state(),
            url,
            added,
            removed
        );

        self.sections.extend(sections);
        self.states += 1;
        added
    }

    /// Take page meta from `snapshot` without extracting its sections.
    /// Only the first state offered (seeded or absorbed) sets the meta.
    pub fn seed_meta<S: DomSnapshot + ?Sized>(&mut self, snapshot: &S) {
        if self.meta.is_none() {
            self.meta = Some(extract_meta(snapshot, &self.default_language));
        }
    }

    /// Record a recoverable failure; the scrape carries on.
    pub fn record(&mut self, stage: Stage, error: &ScrapeError, url: Option<&str>) {
        log::warn!("{:?} stage: {}", stage, error);
        self.errors.push(ErrorEntry::new(stage, error, url));
    }

    pub fn interactions(&self) -> &Interactions {
        &self.interactions
    }

    pub fn interactions_mut(&mut self) -> &mut Interactions {
        &mut self.interactions
    }

    /// Whether any content state has been extracted so far
    pub fn has_states(&self) -> bool {
        self.states > 0
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn finish(self) -> ScrapeDocument {
        let meta = self.meta.unwrap_or_else(|| Meta {
            title: String::new(),
            description: String::new(),
            language: self.default_language.clone(),
            canonical_url: self.root.to_string(),
        });

        log::info!(
            "Assembled {}: {} section(s), {} click(s), {} scroll(s), {} page(s), {} error(s)",
            self.root,
            self.sections.len(),
            self.interactions.clicks,
            self.interactions.scrolls,
            self.interactions.pages.len(),
            self.errors.len()
        );

        ScrapeDocument {
            url: self.root.to_string(),
            scraped_at: Utc::now().to_rfc3339(),
            meta,
            sections: self.sections,
            interactions: self.interactions,
            errors: self.errors,
        }
    }
}
