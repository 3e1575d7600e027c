use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use knowledge_store::SharedKnowledgeStore;
use obstruction_analyzer::ContextCheck;
use page_driver::{recoverable, DriverError, ElementState, PageDriver};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::guard::{ContextGuard, MarkerContextGuard};
use crate::healer::{HealOutcome, HealRequest, SelectorHealer};

pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// How long a stored selector gets to attach before it counts as stale.
    pub validation_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
        }
    }
}

/// Terminal state of one `resolve` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResolveOutcome {
    Valid {
        selector: String,
    },
    /// The page is not the expected context; nothing was repaired.
    ContextMismatch {
        previous: Option<String>,
        detected: Option<String>,
    },
    Healed {
        selector: String,
        previous: Option<String>,
    },
    Unhealed {
        previous: Option<String>,
        reason: String,
    },
}

impl ResolveOutcome {
    /// Selector the caller should use, if any.
    ///
    /// A context mismatch hands back the stored value untouched; a failed
    /// repair yields nothing.
    pub fn selector(&self) -> Option<&str> {
        match self {
            ResolveOutcome::Valid { selector } | ResolveOutcome::Healed { selector, .. } => {
                Some(selector)
            }
            ResolveOutcome::ContextMismatch { previous, .. } => previous.as_deref(),
            ResolveOutcome::Unhealed { .. } => None,
        }
    }

    pub fn into_selector(self) -> Option<String> {
        match self {
            ResolveOutcome::Valid { selector } | ResolveOutcome::Healed { selector, .. } => {
                Some(selector)
            }
            ResolveOutcome::ContextMismatch { previous, .. } => previous,
            ResolveOutcome::Unhealed { .. } => None,
        }
    }
}

#[derive(Default)]
struct ResolverMetrics {
    lookups: AtomicU64,
    valid: AtomicU64,
    mismatches: AtomicU64,
    healed: AtomicU64,
    unhealed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverStatsSnapshot {
    pub lookups: u64,
    pub valid: u64,
    pub mismatches: u64,
    pub healed: u64,
    pub unhealed: u64,
}

/// Knowledge-store accessor that validates and repairs selectors.
pub struct SelectorResolver {
    store: SharedKnowledgeStore,
    guard: Arc<dyn ContextGuard>,
    healer: Option<Arc<dyn SelectorHealer>>,
    config: ResolverConfig,
    metrics: ResolverMetrics,
}

impl SelectorResolver {
    /// Resolver with the built-in context rules and no healer.
    pub fn new(store: SharedKnowledgeStore) -> Self {
        Self {
            store,
            guard: Arc::new(MarkerContextGuard::default()),
            healer: None,
            config: ResolverConfig::default(),
            metrics: ResolverMetrics::default(),
        }
    }

    pub fn with_guard(mut self, guard: Arc<dyn ContextGuard>) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_healer(mut self, healer: Arc<dyn SelectorHealer>) -> Self {
        self.healer = Some(healer);
        self
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &SharedKnowledgeStore {
        &self.store
    }

    /// Stored selector without touching the page.
    pub fn get_selector(&self, context: &str, key: &str) -> Option<String> {
        self.store.get(context, key)
    }

    /// Healing accessor. `Err` only when the session is gone.
    pub async fn resolve_selector(
        &self,
        page: &dyn PageDriver,
        context: &str,
        key: &str,
    ) -> Result<Option<String>, DriverError> {
        Ok(self.resolve(page, context, key).await?.into_selector())
    }

    #[instrument(skip_all, fields(context = %context, key = %key))]
    pub async fn resolve(
        &self,
        page: &dyn PageDriver,
        context: &str,
        key: &str,
    ) -> Result<ResolveOutcome, DriverError> {
        self.metrics.lookups.fetch_add(1, Ordering::Relaxed);
        let previous = self.store.get(context, key);

        let failure = match &previous {
            Some(selector) => {
                let attached = page
                    .wait_for(selector, ElementState::Attached, self.config.validation_timeout)
                    .await;
                match recoverable(attached)? {
                    Ok(true) => {
                        self.metrics.valid.fetch_add(1, Ordering::Relaxed);
                        debug!(selector = %selector, "stored selector valid");
                        return Ok(ResolveOutcome::Valid {
                            selector: selector.clone(),
                        });
                    }
                    Ok(false) => format!(
                        "selector `{selector}` did not attach within {}ms",
                        self.config.validation_timeout.as_millis()
                    ),
                    Err(err) => format!("validating `{selector}` failed: {err}"),
                }
            }
            None => "no selector stored".to_string(),
        };
        debug!(failure = %failure, "selector stale or absent");

        let check = self.guard.verify(page, context).await?;
        if let ContextCheck::Mismatch { detected } = check {
            self.metrics.mismatches.fetch_add(1, Ordering::Relaxed);
            warn!(detected = ?detected, "page is not the expected context; not healing");
            return Ok(ResolveOutcome::ContextMismatch { previous, detected });
        }

        let Some(healer) = &self.healer else {
            self.metrics.unhealed.fetch_add(1, Ordering::Relaxed);
            return Ok(ResolveOutcome::Unhealed {
                previous,
                reason: "no healer configured".to_string(),
            });
        };

        let request = HealRequest {
            context: context.to_string(),
            element_key: key.to_string(),
            failure,
            stale: previous.clone(),
        };
        match healer.heal(page, &request).await? {
            HealOutcome::Healed {
                selector,
                confidence,
                ..
            } => {
                if !self.store.set(context, key, &selector) {
                    warn!(selector = %selector, "healed selector was not stored");
                }
                self.metrics.healed.fetch_add(1, Ordering::Relaxed);
                info!(selector = %selector, confidence, "selector repaired");
                Ok(ResolveOutcome::Healed { selector, previous })
            }
            HealOutcome::Exhausted { candidates } => {
                self.metrics.unhealed.fetch_add(1, Ordering::Relaxed);
                warn!(candidates = candidates.len(), "selector repair failed");
                Ok(ResolveOutcome::Unhealed {
                    previous,
                    reason: format!("{} candidate(s) failed validation", candidates.len()),
                })
            }
            HealOutcome::Skipped { reason } => {
                self.metrics.unhealed.fetch_add(1, Ordering::Relaxed);
                warn!(reason = %reason, "selector repair skipped");
                Ok(ResolveOutcome::Unhealed { previous, reason })
            }
        }
    }

    pub fn stats(&self) -> ResolverStatsSnapshot {
        ResolverStatsSnapshot {
            lookups: self.metrics.lookups.load(Ordering::Relaxed),
            valid: self.metrics.valid.load(Ordering::Relaxed),
            mismatches: self.metrics.mismatches.load(Ordering::Relaxed),
            healed: self.metrics.healed.load(Ordering::Relaxed),
            unhealed: self.metrics.unhealed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowledge_store::KnowledgeStore;
    use page_driver::fake::FakePage;

    #[test]
    fn outcome_selector_follows_state() {
        let mismatch = ResolveOutcome::ContextMismatch {
            previous: Some("#stale".into()),
            detected: None,
        };
        assert_eq!(mismatch.selector(), Some("#stale"));
        let unhealed = ResolveOutcome::Unhealed {
            previous: Some("#stale".into()),
            reason: "x".into(),
        };
        assert_eq!(unhealed.selector(), None);
    }

    #[tokio::test]
    async fn absent_without_healer_is_unhealed() {
        let resolver = SelectorResolver::new(Arc::new(KnowledgeStore::in_memory()));
        assert_eq!(resolver.get_selector("ctx", "close"), None);
        let selector = resolver
            .resolve_selector(&FakePage::new(), "ctx", "close")
            .await
            .unwrap();
        assert_eq!(selector, None);
        assert_eq!(resolver.stats().unhealed, 1);
    }
}
