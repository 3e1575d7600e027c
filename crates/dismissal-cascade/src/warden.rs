use std::sync::Arc;

use knowledge_store::SharedKnowledgeStore;
use page_driver::{DriverError, PageDriver};
use selector_resolver::{ResolveOutcome, SelectorResolver};

use crate::cascade::{DismissTarget, DismissalCascade};
use crate::monitor::{MonitorHandle, PopupMonitor};
use crate::result::DismissalResult;

/// Surface handed to calling workflows: selector lookup and repair, one-shot
/// dismissal, background monitoring and read-only introspection. The resolver
/// and the cascade share one knowledge store.
pub struct PageWarden {
    store: SharedKnowledgeStore,
    resolver: SelectorResolver,
    cascade: Arc<DismissalCascade>,
}

impl PageWarden {
    pub fn new(resolver: SelectorResolver, cascade: DismissalCascade) -> Self {
        Self {
            store: cascade.store().clone(),
            resolver,
            cascade: Arc::new(cascade),
        }
    }

    pub fn store(&self) -> &SharedKnowledgeStore {
        &self.store
    }

    pub fn resolver(&self) -> &SelectorResolver {
        &self.resolver
    }

    pub fn cascade(&self) -> &Arc<DismissalCascade> {
        &self.cascade
    }

    pub fn get_selector(&self, context: &str, key: &str) -> Option<String> {
        self.resolver.get_selector(context, key)
    }

    pub async fn resolve_selector(
        &self,
        page: &dyn PageDriver,
        context: &str,
        key: &str,
    ) -> Result<Option<String>, DriverError> {
        self.resolver.resolve_selector(page, context, key).await
    }

    pub async fn resolve(
        &self,
        page: &dyn PageDriver,
        context: &str,
        key: &str,
    ) -> Result<ResolveOutcome, DriverError> {
        self.resolver.resolve(page, context, key).await
    }

    pub async fn dismiss(
        &self,
        page: &dyn PageDriver,
        context: Option<&str>,
        target: &DismissTarget,
    ) -> Result<DismissalResult, DriverError> {
        self.cascade.dismiss(page, context, target).await
    }

    /// Starts background monitoring; stop it through the returned handle.
    pub fn start_monitoring(
        &self,
        page: Arc<dyn PageDriver>,
        context: Option<&str>,
    ) -> MonitorHandle {
        let mut monitor = PopupMonitor::new(Arc::clone(&self.cascade));
        if let Some(context) = context {
            monitor = monitor.with_context(context);
        }
        monitor.start(page)
    }

    pub fn list_contexts(&self) -> Vec<String> {
        self.store.list_contexts()
    }

    pub fn list_learned(&self, context: &str) -> Vec<String> {
        self.store.list_learned(context)
    }
}
