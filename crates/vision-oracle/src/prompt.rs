use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SNIPPET_CHARS: usize = 3000;

/// Which obstruction families a prompt asks the oracle to look for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptProfile {
    /// Pages known to run a multi-step onboarding tour.
    GuidedTour,
    /// Other pages of a known site.
    SiteGeneral,
    Generic,
}

impl PromptProfile {
    fn focus(&self) -> &'static str {
        match self {
            PromptProfile::GuidedTour => {
                "This page is known to run a guided tour. Look for:\n\
                 - tour popups stepping through \"Next\", \"Got it\" and \"OK\" buttons\n\
                 - multi-step tutorial overlays\n\
                 - cookie consent banners\n\
                 - login or subscription prompts"
            }
            PromptProfile::SiteGeneral => {
                "This is a page of a known site. Look for:\n\
                 - cookie banners and age verification popups\n\
                 - newsletter signup forms\n\
                 - advertising overlays\n\
                 - generic modal dialogs"
            }
            PromptProfile::Generic => {
                "This is an arbitrary web page. Look for:\n\
                 - standard modal dialogs and alert boxes\n\
                 - cookie consent popups\n\
                 - advertising overlays\n\
                 - any other element covering the content"
            }
        }
    }
}

const RESPONSE_SHAPE: &str = r#"{
  "has_popup": true or false,
  "selectors": ["primary_selector", "backup_selector"],
  "multi_click": true or false,
  "steps": number_of_clicks_needed,
  "type": "modal|tooltip|guide|tour|consent|ad|none",
  "confidence": 0.0 to 1.0,
  "reason": "short explanation",
  "elements": [
    {"selector": "css_selector", "type": "button|close_icon|overlay_click", "text": "visible text", "position": "x,y"}
  ]
}"#;

/// Builds context-tailored prompts for dismissal and selector repair.
#[derive(Clone, Debug)]
pub struct PromptBuilder {
    snippet_chars: usize,
    profiles: HashMap<String, PromptProfile>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
            .with_profile("fb_match_page", PromptProfile::GuidedTour)
            .with_profile("fb_general", PromptProfile::SiteGeneral)
    }
}

impl PromptBuilder {
    /// Builder with no context profiles; everything is [`PromptProfile::Generic`].
    pub fn new() -> Self {
        Self {
            snippet_chars: DEFAULT_SNIPPET_CHARS,
            profiles: HashMap::new(),
        }
    }

    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars;
        self
    }

    pub fn with_profile(mut self, context: impl Into<String>, profile: PromptProfile) -> Self {
        self.profiles.insert(context.into(), profile);
        self
    }

    pub fn profile_for(&self, context: &str) -> PromptProfile {
        self.profiles
            .get(context)
            .copied()
            .unwrap_or(PromptProfile::Generic)
    }

    /// Leading `snippet_chars` characters of `markup`.
    pub fn markup_snippet(&self, markup: &str) -> String {
        markup.chars().take(self.snippet_chars).collect()
    }

    pub fn dismissal_prompt(&self, context: &str, markup: &str) -> String {
        format!(
            "Analyze this webpage screenshot and HTML and find how to dismiss any popup or modal.\n\
             {focus}\n\n\
             Identify close/dismiss elements and answer with JSON only:\n{shape}\n\n\
             Rules:\n\
             - prefer visible, accessible close buttons\n\
             - for multi-step popups list the selectors in click order\n\
             - overlay click areas go last\n\
             - base confidence on how clear the close elements are\n\
             - answer {{\"has_popup\": false}} when nothing blocks the page\n\n\
             HTML: {snippet}...",
            focus = self.profile_for(context).focus(),
            shape = RESPONSE_SHAPE,
            snippet = self.markup_snippet(markup),
        )
    }

    /// Prompt asking for replacement selectors for one semantic element.
    pub fn heal_prompt(&self, context: &str, element_key: &str, failure: &str, markup: &str) -> String {
        format!(
            "A stored CSS selector for the element \"{element_key}\" on the \"{context}\" page no longer matches.\n\
             Failure: {failure}\n\n\
             Using the screenshot and HTML, propose selectors that locate this element now.\n\
             Answer with JSON only: {{\"has_popup\": false, \"selectors\": [\"best\", \"fallback\"], \
             \"confidence\": 0.0 to 1.0, \"reason\": \"short explanation\"}}\n\
             Prefer ids, data attributes and stable classes; avoid loading placeholders.\n\n\
             HTML: {snippet}...",
            snippet = self.markup_snippet(markup),
        )
    }
}
