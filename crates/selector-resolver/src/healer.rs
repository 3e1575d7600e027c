//! Oracle-backed selector repair.

use std::time::Duration;

use async_trait::async_trait;
use knowledge_store::validate_selector_format;
use page_driver::{recoverable, DriverError, ElementState, PageDriver};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vision_oracle::{parse_verdict, OracleRequest, PromptBuilder, SharedOracle};

use crate::resolver::DEFAULT_VALIDATION_TIMEOUT;

/// What the resolver knows when it asks for a repair.
#[derive(Clone, Debug)]
pub struct HealRequest {
    pub context: String,
    pub element_key: String,
    /// Why the stored selector was rejected.
    pub failure: String,
    pub stale: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HealOutcome {
    Healed {
        selector: String,
        confidence: f64,
        candidates_tried: usize,
    },
    /// Every proposed candidate failed validation.
    Exhausted { candidates: Vec<String> },
    /// The oracle could not be consulted.
    Skipped { reason: String },
}

#[async_trait]
pub trait SelectorHealer: Send + Sync {
    /// `Err` only for a lost session; every other failure is an outcome.
    async fn heal(&self, page: &dyn PageDriver, request: &HealRequest) -> Result<HealOutcome, DriverError>;
}

/// Asks the vision oracle for candidates and keeps the first one that
/// attaches to the live page.
pub struct OracleHealer {
    oracle: SharedOracle,
    prompts: PromptBuilder,
    validation_timeout: Duration,
}

impl OracleHealer {
    pub fn new(oracle: SharedOracle) -> Self {
        Self {
            oracle,
            prompts: PromptBuilder::default(),
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
        }
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }
}

#[async_trait]
impl SelectorHealer for OracleHealer {
    async fn heal(&self, page: &dyn PageDriver, request: &HealRequest) -> Result<HealOutcome, DriverError> {
        let markup = match recoverable(page.content().await)? {
            Ok(markup) => markup,
            Err(err) => {
                return Ok(HealOutcome::Skipped {
                    reason: format!("page content unavailable: {err}"),
                })
            }
        };
        let screenshot = recoverable(page.screenshot().await)?.unwrap_or_else(|err| {
            debug!(error = %err, "healing without a screenshot");
            Vec::new()
        });

        let prompt = self.prompts.heal_prompt(
            &request.context,
            &request.element_key,
            &request.failure,
            &markup,
        );
        let oracle_request = OracleRequest::new(screenshot, self.prompts.markup_snippet(&markup), prompt);
        let raw = match self.oracle.analyze(&oracle_request).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(oracle = self.oracle.name(), error = %err, "oracle unavailable for healing");
                return Ok(HealOutcome::Skipped {
                    reason: err.to_string(),
                });
            }
        };

        let verdict = parse_verdict(&raw, &[]);
        let candidates: Vec<String> = verdict
            .selectors
            .into_iter()
            .filter(|candidate| validate_selector_format(candidate))
            .filter(|candidate| request.stale.as_deref() != Some(candidate.as_str()))
            .collect();
        if candidates.is_empty() {
            debug!(key = %request.element_key, "oracle proposed no usable candidates");
            return Ok(HealOutcome::Exhausted { candidates });
        }

        for (idx, candidate) in candidates.iter().enumerate() {
            match recoverable(
                page.wait_for(candidate, ElementState::Attached, self.validation_timeout)
                    .await,
            )? {
                Ok(true) => {
                    info!(
                        key = %request.element_key,
                        selector = %candidate,
                        confidence = verdict.confidence,
                        "healed selector"
                    );
                    return Ok(HealOutcome::Healed {
                        selector: candidate.clone(),
                        confidence: verdict.confidence,
                        candidates_tried: idx + 1,
                    });
                }
                Ok(false) => debug!(selector = %candidate, "heal candidate did not attach"),
                Err(err) => debug!(selector = %candidate, error = %err, "heal candidate rejected"),
            }
        }

        warn!(
            key = %request.element_key,
            tried = candidates.len(),
            "all heal candidates exhausted"
        );
        Ok(HealOutcome::Exhausted { candidates })
    }
}
