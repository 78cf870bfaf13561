use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::config::{ContentLimits, ScraperConfig};
use crate::document::{Heading, Image, Link, Meta, Section, SectionContent, SectionType};
use crate::snapshot::{DomSnapshot, visible_text};
use crate::truncate::truncate;
use crate::url_normalizer::{is_followable, normalize, same_domain};
use crate::utils::{first_words, normalize_text, truncate_chars};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static LANDMARKS: LazyLock<Selector> =
    LazyLock::new(|| selector("header, nav, main, article, section, aside, footer"));
static CONTAINERS: LazyLock<Selector> = LazyLock::new(|| selector("div"));
static BODY: LazyLock<Selector> = LazyLock::new(|| selector("body"));
static HEADINGS: LazyLock<Selector> = LazyLock::new(|| selector("h1, h2, h3, h4, h5, h6"));
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static IMAGES: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static LISTS: LazyLock<Selector> = LazyLock::new(|| selector("ul, ol"));
static TABLES: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static ROWS: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static META_TAGS: LazyLock<Selector> = LazyLock::new(|| selector("meta"));
static LINK_TAGS: LazyLock<Selector> = LazyLock::new(|| selector("link[rel][href]"));
static HTML_ROOT: LazyLock<Selector> = LazyLock::new(|| selector("html"));

/// Keyword cues checked in priority order; first group with a hit wins
const KEYWORD_CUES: &[(SectionType, &[&str])] = &[
    (SectionType::Hero, &["hero", "banner", "jumbotron", "masthead"]),
    (SectionType::Faq, &["faq", "faqs", "question", "questions", "accordion"]),
    (SectionType::Pricing, &["pricing", "price", "prices", "plans", "tier", "tiers"]),
    (SectionType::Grid, &["grid", "cards", "tiles", "gallery"]),
    (SectionType::List, &["list", "listing", "listings"]),
];

const LABEL_WORDS: usize = 7;
const LABEL_MAX_CHARS: usize = 50;

/// Items a list needs before it can define a section's type
const LIST_MIN_ITEMS: usize = 3;

/// Siblings sharing a class before a container reads as a grid
const GRID_MIN_CHILDREN: usize = 3;

/// Turns a DOM snapshot into ordered, labeled sections.
pub struct SectionExtractor {
    root: Url,
    limits: ContentLimits,
    max_section_bytes: usize,
    fallback_min_chars: usize,
}

impl SectionExtractor {
    pub fn new(config: &ScraperConfig, root: Url) -> Self {
        Self {
            root,
            limits: config.content_limits.clone(),
            max_section_bytes: config.max_section_bytes,
            fallback_min_chars: config.fallback_container_min_chars,
        }
    }

    /// Extract sections in document order, numbering them from `first_id`.
    pub fn extract<S: DomSnapshot + ?Sized>(&self, snapshot: &S, first_id: usize) -> Vec<Section> {
        let document = snapshot.document();
        let base = snapshot.source_url();

        let mut candidates: Vec<ElementRef> = document.select(&LANDMARKS).collect();

        if candidates.is_empty() {
            candidates = document
                .select(&CONTAINERS)
                .filter(|el| has_direct_heading(*el))
                .filter(|el| visible_text(*el).chars().count() >= self.fallback_min_chars)
                .collect();
            if !candidates.is_empty() {
                log::debug!(
                    "No landmarks in {}, using {} heading-led container(s)",
                    base,
                    candidates.len()
                );
            }
        }

        if candidates.is_empty() {
            candidates = document
                .select(&BODY)
                .next()
                .into_iter()
                .collect();
        }

        candidates
            .into_iter()
            .enumerate()
            .map(|(idx, element)| self.build_section(element, base, first_id + idx))
            .collect()
    }

    fn build_section(&self, element: ElementRef, base: &Url, id: usize) -> Section {
        let section_type = infer_section_type(element);
        let content = self.extract_content(element, base);
        let label = derive_label(&content, element, section_type);

        let html = element.html();
        let (raw_html, truncated) = truncate(&html, self.max_section_bytes);

        Section {
            id: format!("{}-{}", section_type, id),
            section_type,
            label,
            source_url: base.to_string(),
            content,
            raw_html,
            truncated,
        }
    }

    fn extract_content(&self, element: ElementRef, base: &Url) -> SectionContent {
        let text = truncate_chars(&visible_text(element), self.limits.max_text_chars);

        SectionContent {
            headings: extract_headings(element),
            text,
            links: self.extract_links(element, base),
            images: self.extract_images(element, base),
            lists: self.extract_lists(element),
            tables: self.extract_tables(element),
        }
    }

    fn extract_links(&self, element: ElementRef, base: &Url) -> Vec<Link> {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for anchor in element.select(&ANCHORS) {
            if links.len() >= self.limits.max_links {
                break;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            if !is_followable(href) {
                continue;
            }
            let Ok(url) = normalize(base, href) else {
                continue;
            };
            if !same_domain(&self.root, &url) {
                continue;
            }
            if seen.insert(url.to_string()) {
                links.push(Link {
                    text: visible_text(anchor),
                    href: url.to_string(),
                });
            }
        }

        links
    }

    fn extract_images(&self, element: ElementRef, base: &Url) -> Vec<Image> {
        element
            .select(&IMAGES)
            .filter_map(|img| {
                let src = img
                    .value()
                    .attr("src")
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| img.value().attr("data-src"))?;
                let url = normalize(base, src).ok()?;
                Some(Image {
                    src: url.to_string(),
                    alt: normalize_text(img.value().attr("alt").unwrap_or_default()),
                })
            })
            .take(self.limits.max_images)
            .collect()
    }

    fn extract_lists(&self, element: ElementRef) -> Vec<Vec<String>> {
        element
            .select(&LISTS)
            .map(list_items)
            .filter(|items| !items.is_empty())
            .take(self.limits.max_lists)
            .collect()
    }

    fn extract_tables(&self, element: ElementRef) -> Vec<Vec<Vec<String>>> {
        element
            .select(&TABLES)
            .map(|table| {
                table
                    .select(&ROWS)
                    .map(|row| {
                        child_elements(row)
                            .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                            .map(visible_text)
                            .collect::<Vec<_>>()
                    })
                    .filter(|cells| !cells.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|rows| !rows.is_empty())
            .take(self.limits.max_tables)
            .collect()
    }
}

/// Page-level metadata from the first available document state.
pub fn extract_meta<S: DomSnapshot + ?Sized>(snapshot: &S, default_language: &str) -> Meta {
    let document = snapshot.document();
    let base = snapshot.source_url();

    let meta_content = |names: &[&str]| -> Option<String> {
        document.select(&META_TAGS).find_map(|tag| {
            let key = tag
                .value()
                .attr("name")
                .or_else(|| tag.value().attr("property"))?;
            if !names.iter().any(|n| key.eq_ignore_ascii_case(n)) {
                return None;
            }
            let content = normalize_text(tag.value().attr("content")?);
            (!content.is_empty()).then_some(content)
        })
    };

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| normalize_text(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(&["og:title"]))
        .unwrap_or_default();

    let description = meta_content(&["description"])
        .or_else(|| meta_content(&["og:description"]))
        .unwrap_or_default();

    let language = document
        .select(&HTML_ROOT)
        .next()
        .and_then(|html| html.value().attr("lang"))
        .and_then(primary_language)
        .unwrap_or_else(|| default_language.to_string());

    let canonical_url = document
        .select(&LINK_TAGS)
        .find(|link| {
            link.value()
                .attr("rel")
                .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical")))
        })
        .and_then(|link| link.value().attr("href"))
        .and_then(|href| normalize(base, href).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| base.to_string());

    Meta {
        title,
        description,
        language,
        canonical_url,
    }
}

/// `en-US` → `en`; rejects values that are not a plausible ISO 639 code
fn primary_language(lang: &str) -> Option<String> {
    let primary = lang.trim().split(['-', '_']).next()?.to_ascii_lowercase();
    let plausible = (2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_alphabetic());
    plausible.then_some(primary)
}

fn infer_section_type(element: ElementRef) -> SectionType {
    let tag = element.value().name();
    match tag {
        "header" => return SectionType::Hero,
        "nav" => return SectionType::Nav,
        "footer" => return SectionType::Footer,
        _ => {}
    }

    if let Some(section_type) = keyword_type(element) {
        return section_type;
    }
    if let Some(section_type) = structural_type(element) {
        return section_type;
    }

    match tag {
        "main" => SectionType::Main,
        "article" => SectionType::Article,
        _ => SectionType::Section,
    }
}

/// Match keyword cues against class/id/role words of the element and its
/// first two levels of descendants, plus heading text.
fn keyword_type(element: ElementRef) -> Option<SectionType> {
    let mut words: HashSet<String> = HashSet::new();

    let mut collect_attrs = |el: ElementRef| {
        for attr in ["class", "id", "role"] {
            if let Some(value) = el.value().attr(attr) {
                words.extend(split_words(value));
            }
        }
    };

    collect_attrs(element);
    for child in child_elements(element) {
        collect_attrs(child);
        for grandchild in child_elements(child) {
            collect_attrs(grandchild);
        }
    }
    for heading in element.select(&HEADINGS) {
        words.extend(split_words(&visible_text(heading)));
    }

    KEYWORD_CUES
        .iter()
        .find(|(_, cues)| cues.iter().any(|cue| words.contains(*cue)))
        .map(|(section_type, _)| *section_type)
}

fn structural_type(element: ElementRef) -> Option<SectionType> {
    if has_repeated_children(element) || child_elements(element).any(has_repeated_children) {
        return Some(SectionType::Grid);
    }

    let total = visible_text(element).chars().count();
    if total == 0 {
        return None;
    }
    let dominant_list = element.select(&LISTS).any(|list| {
        let items = list_items(list);
        let list_chars: usize = items.iter().map(|i| i.chars().count()).sum();
        items.len() >= LIST_MIN_ITEMS && list_chars * 10 >= total * 6
    });
    dominant_list.then_some(SectionType::List)
}

/// At least `GRID_MIN_CHILDREN` non-list-item children share one class value
fn has_repeated_children(element: ElementRef) -> bool {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for child in child_elements(element) {
        if child.value().name() == "li" {
            continue;
        }
        if let Some(class) = child.value().attr("class").map(str::trim).filter(|c| !c.is_empty()) {
            *counts.entry(class).or_insert(0) += 1;
        }
    }
    counts.values().any(|&n| n >= GRID_MIN_CHILDREN)
}

fn derive_label(content: &SectionContent, element: ElementRef, section_type: SectionType) -> String {
    if let Some(heading) = content.headings.first() {
        return heading.text.clone();
    }

    let words = first_words(&visible_text(element), LABEL_WORDS);
    if !words.is_empty() {
        return truncate_chars(&words, LABEL_MAX_CHARS);
    }

    format!("Unlabeled {}", section_type)
}

fn extract_headings(element: ElementRef) -> Vec<Heading> {
    element
        .select(&HEADINGS)
        .filter_map(|heading| {
            let text = visible_text(heading);
            if text.is_empty() {
                return None;
            }
            let level = heading.value().name()[1..].parse::<u8>().ok()?;
            Some(Heading { level, text })
        })
        .collect()
}

fn list_items(list: ElementRef) -> Vec<String> {
    child_elements(list)
        .filter(|child| child.value().name() == "li")
        .map(visible_text)
        .filter(|text| !text.is_empty())
        .collect()
}

fn has_direct_heading(element: ElementRef) -> bool {
    child_elements(element).any(|child| {
        matches!(child.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
    })
}

fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    element.children().filter_map(ElementRef::wrap)
}

fn split_words(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
}
