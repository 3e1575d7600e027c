use async_trait::async_trait;
use obstruction_analyzer::{ContextCheck, ContextRules};
use page_driver::{recoverable, DriverError, PageDriver};
use tracing::{debug, warn};

/// Confirms the page is the expected context before anything is healed.
#[async_trait]
pub trait ContextGuard: Send + Sync {
    /// `Err` only for a lost session.
    async fn verify(&self, page: &dyn PageDriver, context: &str) -> Result<ContextCheck, DriverError>;
}

/// Guard backed by page markers and URL rules.
#[derive(Clone, Debug, Default)]
pub struct MarkerContextGuard {
    rules: ContextRules,
}

impl MarkerContextGuard {
    pub fn new(rules: ContextRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ContextRules {
        &self.rules
    }
}

#[async_trait]
impl ContextGuard for MarkerContextGuard {
    async fn verify(&self, page: &dyn PageDriver, context: &str) -> Result<ContextCheck, DriverError> {
        let markup = match recoverable(page.content().await)? {
            Ok(markup) => markup,
            Err(err) => {
                // Unreadable page: never heal blind.
                warn!(context, error = %err, "context check could not read page content");
                return Ok(ContextCheck::Mismatch { detected: None });
            }
        };
        let url = recoverable(page.current_url().await)?.ok().flatten();
        let check = self.rules.verify(context, &markup, url.as_deref());
        debug!(context, ?check, "context verified");
        Ok(check)
    }
}
