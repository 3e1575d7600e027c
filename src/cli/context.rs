use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use dismissal_cascade::{DismissalCascade, PageWarden};
use dismissal_executor::DismissalExecutor;
use knowledge_store::{JsonFilePersistence, KnowledgeStore, SharedKnowledgeStore};
use once_cell::sync::OnceCell;
use pagewarden_core_types::SystemClock;
use selector_resolver::{MarkerContextGuard, OracleHealer, SelectorResolver};
use tracing::{debug, info};
use vision_oracle::{HttpVisionOracle, SharedOracle};

use super::output::OutputFormat;
use crate::config::WardenConfig;

/// Shared state handed to every command.
pub struct CliContext {
    config: Arc<WardenConfig>,
    config_path: PathBuf,
    output: OutputFormat,
    store: OnceCell<SharedKnowledgeStore>,
}

impl CliContext {
    pub fn new(config: WardenConfig, config_path: PathBuf, output: OutputFormat) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            output,
            store: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    /// Knowledge store backed by the configured JSON file, opened on first use.
    pub fn store(&self) -> SharedKnowledgeStore {
        self.store
            .get_or_init(|| {
                let path = self.config.knowledge.path.clone();
                debug!(path = %path.display(), "opening knowledge store");
                Arc::new(KnowledgeStore::open(
                    Arc::new(JsonFilePersistence::new(path)),
                    self.config.knowledge.retention,
                    SystemClock::shared(),
                ))
            })
            .clone()
    }

    /// HTTP oracle when one is enabled and has keys; `None` otherwise.
    pub fn oracle(&self) -> Result<Option<SharedOracle>> {
        let Some(settings) = self.config.oracle_config() else {
            debug!("vision oracle disabled");
            return Ok(None);
        };
        let model = settings.model.clone();
        let oracle: SharedOracle = Arc::new(
            HttpVisionOracle::new(settings).context("Failed to build vision oracle")?,
        );
        info!(model = %model, "vision oracle enabled");
        Ok(Some(oracle))
    }

    /// Resolver and cascade wired from the configuration.
    pub fn warden(&self) -> Result<PageWarden> {
        let config = &self.config;
        let store = self.store();
        let oracle = self.oracle()?;

        let mut resolver = SelectorResolver::new(store.clone())
            .with_guard(Arc::new(MarkerContextGuard::new(config.context_rules())))
            .with_config(config.resolver_config());
        let executor = DismissalExecutor::new(SystemClock::shared())
            .with_timeouts(config.executor_timeouts());
        let mut cascade = DismissalCascade::new(store, executor)
            .with_catalog(config.catalog.clone())
            .with_rules(config.context_rules())
            .with_config(config.cascade_config());

        if let Some(oracle) = oracle {
            resolver = resolver.with_healer(Arc::new(
                OracleHealer::new(oracle.clone())
                    .with_validation_timeout(config.resolver_config().validation_timeout),
            ));
            cascade = cascade.with_oracle(oracle);
        }

        Ok(PageWarden::new(resolver, cascade))
    }
}
