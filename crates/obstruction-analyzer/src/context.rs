use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const GENERIC_CONTEXT: &str = "generic";

/// URL shape that identifies a context. All configured parts must match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRule {
    pub context: String,
    #[serde(default)]
    pub host_contains: Option<String>,
    /// At least one must appear in the URL; empty means no keyword requirement.
    #[serde(default)]
    pub url_keywords: Vec<String>,
}

impl ContextRule {
    fn matches(&self, url_lower: &str) -> bool {
        let host_ok = self
            .host_contains
            .as_ref()
            .map(|host| url_lower.contains(&host.to_ascii_lowercase()))
            .unwrap_or(true);
        let keyword_ok = self.url_keywords.is_empty()
            || self
                .url_keywords
                .iter()
                .any(|keyword| url_lower.contains(&keyword.to_ascii_lowercase()));
        host_ok && keyword_ok
    }
}

/// Outcome of checking that the page really is the expected context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContextCheck {
    /// A configured marker or the URL confirmed the context.
    Matched,
    /// Nothing is known about this context; treated as a pass.
    Unverified,
    Mismatch { detected: Option<String> },
}

impl ContextCheck {
    pub fn passes(&self) -> bool {
        !matches!(self, ContextCheck::Mismatch { .. })
    }
}

/// Ordered URL rules plus per-context page markers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextRules {
    rules: Vec<ContextRule>,
    markers: HashMap<String, Vec<String>>,
    fallback: String,
}

impl Default for ContextRules {
    fn default() -> Self {
        Self::new(
            vec![
                ContextRule {
                    context: "fb_match_page".into(),
                    host_contains: Some("football.com".into()),
                    url_keywords: vec!["match".into(), "game".into()],
                },
                ContextRule {
                    context: "fb_general".into(),
                    host_contains: Some("football.com".into()),
                    url_keywords: Vec::new(),
                },
            ],
            GENERIC_CONTEXT,
        )
    }
}

impl ContextRules {
    pub fn new(rules: Vec<ContextRule>, fallback: impl Into<String>) -> Self {
        Self {
            rules,
            markers: HashMap::new(),
            fallback: fallback.into(),
        }
    }

    pub fn with_markers(mut self, context: impl Into<String>, markers: Vec<String>) -> Self {
        self.markers.insert(context.into(), markers);
        self
    }

    pub fn rules(&self) -> &[ContextRule] {
        &self.rules
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// First matching rule wins; unknown URLs map to the fallback context.
    pub fn detect(&self, url: &str) -> String {
        let url_lower = url.to_ascii_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&url_lower))
            .map(|rule| rule.context.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn markers_for(&self, context: &str) -> &[String] {
        self.markers
            .get(context)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Content-based context check.
    ///
    /// Configured markers decide when present (any marker, case-insensitive).
    /// Otherwise a context that some URL rule produces must agree with the
    /// current URL. Anything else cannot be verified and passes.
    pub fn verify(&self, context: &str, markup: &str, url: Option<&str>) -> ContextCheck {
        let markers = self.markers_for(context);
        if !markers.is_empty() {
            let lowered = markup.to_lowercase();
            let found = markers
                .iter()
                .any(|marker| lowered.contains(&marker.to_lowercase()));
            return if found {
                ContextCheck::Matched
            } else {
                debug!(context, "no context marker found in markup");
                ContextCheck::Mismatch {
                    detected: url.map(|url| self.detect(url)),
                }
            };
        }

        let known = self.rules.iter().any(|rule| rule.context == context);
        match url {
            Some(url) if known => {
                let detected = self.detect(url);
                if detected == context {
                    ContextCheck::Matched
                } else {
                    ContextCheck::Mismatch {
                        detected: Some(detected),
                    }
                }
            }
            _ => ContextCheck::Unverified,
        }
    }
}

/// Context tag for `url` under the built-in rules.
pub fn detect_context(url: &str) -> String {
    ContextRules::default().detect(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_rules_classify_urls() {
        assert_eq!(
            detect_context("https://www.football.com/ng/m/sport/football/match/sr:match:123"),
            "fb_match_page"
        );
        assert_eq!(
            detect_context("https://football.com/NG/GAME/live"),
            "fb_match_page"
        );
        assert_eq!(detect_context("https://www.football.com/ng/m/my_accounts/login"), "fb_general");
        assert_eq!(detect_context("https://example.org/match"), GENERIC_CONTEXT);
        assert_eq!(detect_context(""), GENERIC_CONTEXT);
    }

    #[test]
    fn markers_decide_when_configured() {
        let rules = ContextRules::default()
            .with_markers("fb_login_page", vec!["Log In".into(), "mobile number".into()]);
        assert_eq!(
            rules.verify("fb_login_page", "<h1>LOG IN</h1>", None),
            ContextCheck::Matched
        );
        let check = rules.verify(
            "fb_login_page",
            "<h1>Match odds</h1>",
            Some("https://www.football.com/match/1"),
        );
        assert_eq!(
            check,
            ContextCheck::Mismatch {
                detected: Some("fb_match_page".into())
            }
        );
        assert!(!check.passes());
    }

    #[test]
    fn rule_contexts_are_checked_against_url() {
        let rules = ContextRules::default();
        assert_eq!(
            rules.verify("fb_match_page", "", Some("https://football.com/match/9")),
            ContextCheck::Matched
        );
        assert!(!rules
            .verify("fb_match_page", "", Some("https://football.com/ng/"))
            .passes());
        assert_eq!(
            rules.verify("fb_match_page", "", None),
            ContextCheck::Unverified
        );
        assert_eq!(
            rules.verify("betslip", "", Some("https://football.com/ng/")),
            ContextCheck::Unverified
        );
    }
}
