//! Predefined dismissal selectors per context.

use std::collections::BTreeMap;

use knowledge_store::KnowledgeStore;
use serde::{Deserialize, Serialize};

/// Tour controls that lead an oracle's answer for guided-tour pages.
pub const TOUR_PRIORITY_SELECTORS: [&str; 3] = [
    r#"button:has-text("Next")"#,
    r#"button:has-text("Got it")"#,
    r#"button:has-text("OK")"#,
];

const FB_MATCH_PAGE: &[&str] = &[
    r#"button:has-text("Next")"#,
    r#"span:has-text("Next")"#,
    r#"button:has-text("Continue")"#,
    r#"span:has-text("Continue")"#,
    r#"button:has-text("Got it")"#,
    r#"span:has-text("Got it")"#,
    r#"button:has-text("OK")"#,
    r#"span:has-text("OK")"#,
    r#"button:has-text("Skip")"#,
    r#"button:has-text("End Tour")"#,
    r#"button:has-text("Dismiss")"#,
    r#"button:has-text("Close")"#,
    "svg.close-circle-icon",
    "button.close",
    r#"[data-dismiss="modal"]"#,
    r#"svg[aria-label="Close"]"#,
    r#"button[aria-label="Close"]"#,
];

const FB_GENERAL: &[&str] = &[
    r#"button:has-text("Got it")"#,
    r#"button:has-text("OK")"#,
    r#"button:has-text("Skip")"#,
    r#"button:has-text("End Tour")"#,
    r#"button:has-text("Dismiss")"#,
    r#"button:has-text("Close")"#,
    "svg.close-circle-icon",
    "button.close",
    r#"[data-dismiss="modal"]"#,
    r#"svg[aria-label="Close"]"#,
    r#"button[aria-label="Close"]"#,
    r#"button:has-text("Next")"#,
    r#"span:has-text("Next")"#,
];

const GENERIC: &[&str] = &[
    r#"button:has-text("Close")"#,
    r#"button:has-text("OK")"#,
    r#"button:has-text("Dismiss")"#,
    r#"button:has-text("Skip")"#,
    r#"button:has-text("Got it")"#,
    r#"[data-dismiss="modal"]"#,
    r#"svg[aria-label="Close"]"#,
    r#"button[aria-label="Close"]"#,
    "button.close",
    "svg.close-circle-icon",
    ".close",
    r#"[aria-label="Close"]"#,
];

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn push_unique(out: &mut Vec<String>, selector: &str) {
    if !out.iter().any(|existing| existing == selector) {
        out.push(selector.to_string());
    }
}

/// Ordered candidate lists keyed by context, with a generic fallback list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorCatalog {
    #[serde(default)]
    pub profiles: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub generic: Vec<String>,
}

impl Default for SelectorCatalog {
    fn default() -> Self {
        Self::new(owned(GENERIC))
            .with_profile("fb_match_page", owned(FB_MATCH_PAGE))
            .with_profile("fb_general", owned(FB_GENERAL))
    }
}

impl SelectorCatalog {
    pub fn new(generic: Vec<String>) -> Self {
        Self {
            profiles: BTreeMap::new(),
            generic,
        }
    }

    pub fn with_profile(mut self, context: impl Into<String>, selectors: Vec<String>) -> Self {
        self.profiles.insert(context.into(), selectors);
        self
    }

    /// Context list, or the generic list for contexts without a profile.
    pub fn predefined(&self, context: &str) -> &[String] {
        self.profiles
            .get(context)
            .map(Vec::as_slice)
            .unwrap_or(self.generic.as_slice())
    }

    /// Learned selectors (most recent first) followed by the predefined list.
    pub fn all_selectors(&self, store: &KnowledgeStore, context: &str) -> Vec<String> {
        let mut out = Vec::new();
        for selector in store.list_learned(context) {
            push_unique(&mut out, &selector);
        }
        for selector in self.predefined(context) {
            push_unique(&mut out, selector);
        }
        out
    }

    /// Every known selector regardless of context.
    pub fn every_selector(&self) -> Vec<String> {
        let mut out = Vec::new();
        for selector in self.profiles.values().flatten().chain(&self.generic) {
            push_unique(&mut out, selector);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_context_uses_generic_list() {
        let catalog = SelectorCatalog::default();
        assert_eq!(catalog.predefined("checkout"), catalog.generic.as_slice());
        assert_eq!(
            catalog.predefined("fb_match_page")[0],
            r#"button:has-text("Next")"#
        );
    }

    #[test]
    fn learned_lead_and_duplicates_collapse() {
        let store = KnowledgeStore::in_memory();
        store.learn("generic", "div.promo .x");
        store.learn("generic", "button.close");
        let all = SelectorCatalog::default().all_selectors(&store, "generic");
        assert_eq!(all[0], "button.close");
        assert_eq!(all[1], "div.promo .x");
        assert_eq!(all.iter().filter(|s| *s == "button.close").count(), 1);
        assert_eq!(all.len(), GENERIC.len() + 1);
    }

    #[test]
    fn every_selector_is_a_deduplicated_union() {
        let catalog = SelectorCatalog::default();
        let every = catalog.every_selector();
        for selector in FB_MATCH_PAGE.iter().chain(FB_GENERAL).chain(GENERIC) {
            assert!(every.iter().any(|s| s == selector), "missing {selector}");
        }
        let mut sorted = every.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), every.len());
    }
}
