use scraper::Selector;
use std::sync::LazyLock;

use crate::document::ScrapeMethod;
use crate::snapshot::DomSnapshot;

static LANDMARK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"main, [role="main"], article"#).expect("static selector")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    Sufficient,
    TooLittleText,
    NoLandmark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyDecision {
    pub method: ScrapeMethod,
    pub reason: DecisionReason,
    pub text_len: usize,
    pub has_landmark: bool,
}

/// Decides whether a static snapshot is good enough or the page needs a
/// rendered session.
///
/// Either signal alone forces rendering: a page that is short on text or has
/// no main-content landmark is treated as a client-rendered shell.
pub struct StrategySelector {
    text_threshold: usize,
}

impl StrategySelector {
    pub fn new(text_threshold: usize) -> Self {
        Self { text_threshold }
    }

    pub fn decide<S: DomSnapshot + ?Sized>(&self, snapshot: &S) -> StrategyDecision {
        let text_len = snapshot.body_text().chars().count();
        self.decide_with_text(snapshot, text_len)
    }

    pub fn decide_with_text<S: DomSnapshot + ?Sized>(
        &self,
        snapshot: &S,
        text_len: usize,
    ) -> StrategyDecision {
        let has_landmark = snapshot.document().select(&LANDMARK).next().is_some();

        let reason = if text_len < self.text_threshold {
            DecisionReason::TooLittleText
        } else if !has_landmark {
            DecisionReason::NoLandmark
        } else {
            DecisionReason::Sufficient
        };

        let method = match reason {
            DecisionReason::Sufficient => ScrapeMethod::Static,
            _ => ScrapeMethod::Dynamic,
        };

        StrategyDecision {
            method,
            reason,
            text_len,
            has_landmark,
        }
    }
}
