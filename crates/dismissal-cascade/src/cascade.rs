use dismissal_executor::{DismissalExecutor, SelectorCatalog, StrategyReport, TOUR_PRIORITY_SELECTORS};
use knowledge_store::SharedKnowledgeStore;
use obstruction_analyzer::{ContextRules, ObstructionAnalyzer};
use page_driver::{recoverable, DriverError, PageDriver};
use pagewarden_core_types::{Budget, SharedClock};
use tracing::{debug, info, instrument, warn};
use vision_oracle::{parse_verdict, OracleRequest, PromptBuilder, SharedOracle};

use crate::config::{CascadeConfig, GuidedTour};
use crate::result::{DismissMethod, DismissalResult};

/// Where the oracle step gets its screenshot from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Snapshot {
    /// No visual snapshot; the oracle step is skipped.
    #[default]
    None,
    /// Capture one from the page when the oracle step is reached.
    Capture,
    Provided(Vec<u8>),
}

/// What the caller knows about the page being cleared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DismissTarget {
    /// Used for context detection when no context is given.
    pub url: Option<String>,
    pub snapshot: Snapshot,
}

impl DismissTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            snapshot: Snapshot::None,
        }
    }

    pub fn capturing(mut self) -> Self {
        self.snapshot = Snapshot::Capture;
        self
    }

    pub fn with_screenshot(mut self, bytes: Vec<u8>) -> Self {
        self.snapshot = Snapshot::Provided(bytes);
        self
    }
}

/// Runs the dismissal strategies in a fixed order and stops at the first
/// one that clears the page.
///
/// 1. guided tour, for contexts with a configured tour and any obstruction signal
/// 2. standard: learned plus predefined selectors for the context
/// 3. oracle-assisted, when an oracle and a screenshot are available
/// 4. forced, when the page is layered or blocks pointer events
/// 5. comprehensive: every known selector
///
/// Winning selectors from steps 2 and 5 are learned. A failed run leaves the
/// store untouched and reports every step's errors.
pub struct DismissalCascade {
    store: SharedKnowledgeStore,
    executor: DismissalExecutor,
    catalog: SelectorCatalog,
    analyzer: ObstructionAnalyzer,
    rules: ContextRules,
    oracle: Option<SharedOracle>,
    prompts: PromptBuilder,
    config: CascadeConfig,
}

impl DismissalCascade {
    pub fn new(store: SharedKnowledgeStore, executor: DismissalExecutor) -> Self {
        Self {
            store,
            executor,
            catalog: SelectorCatalog::default(),
            analyzer: ObstructionAnalyzer::new(),
            rules: ContextRules::default(),
            oracle: None,
            prompts: PromptBuilder::default(),
            config: CascadeConfig::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: SelectorCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_rules(mut self, rules: ContextRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_oracle(mut self, oracle: SharedOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_config(mut self, config: CascadeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &SharedKnowledgeStore {
        &self.store
    }

    pub fn executor(&self) -> &DismissalExecutor {
        &self.executor
    }

    pub fn clock(&self) -> &SharedClock {
        self.executor.clock()
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SelectorCatalog {
        &self.catalog
    }

    pub fn rules(&self) -> &ContextRules {
        &self.rules
    }

    /// Clears whatever obstructs `page`. `Err` only when the session is gone.
    ///
    /// Without an explicit `context` it is detected from the target URL, then
    /// from the page's own URL, then falls back to the generic context.
    pub async fn dismiss(
        &self,
        page: &dyn PageDriver,
        context: Option<&str>,
        target: &DismissTarget,
    ) -> Result<DismissalResult, DriverError> {
        let context = match context {
            Some(context) => context.to_string(),
            None => self.context_for(page, target).await?,
        };
        self.run(page, &context, target).await
    }

    async fn context_for(
        &self,
        page: &dyn PageDriver,
        target: &DismissTarget,
    ) -> Result<String, DriverError> {
        let url = match &target.url {
            Some(url) => Some(url.clone()),
            None => recoverable(page.current_url().await)?.ok().flatten(),
        };
        Ok(match url {
            Some(url) => self.rules.detect(&url),
            None => self.rules.fallback().to_string(),
        })
    }

    #[instrument(skip_all, fields(context = %context))]
    async fn run(
        &self,
        page: &dyn PageDriver,
        context: &str,
        target: &DismissTarget,
    ) -> Result<DismissalResult, DriverError> {
        let budget = Budget::starting_now(self.clock().as_ref(), self.config.total_budget);
        let mut result = DismissalResult::started(context);

        let before = self.markup(page).await?;
        let diagnosis = self.analyzer.analyze(&before);
        debug!(
            score = diagnosis.score,
            overlay = diagnosis.has_overlay,
            popup = diagnosis.has_popup,
            multi_step = diagnosis.is_multi_step,
            "cascade starting"
        );

        if let Some(tour) = self.config.tour_for(context) {
            if diagnosis.has_any_signal() {
                if !self.within_budget(&budget, DismissMethod::GuidedTour, &mut result) {
                    return Ok(self.finish(result));
                }
                if self.guided_tour(page, tour, &before, &mut result).await? {
                    return Ok(self.finish(result));
                }
            }
        }

        if !self.within_budget(&budget, DismissMethod::Standard, &mut result) {
            return Ok(self.finish(result));
        }
        let candidates = self.catalog.all_selectors(&self.store, context);
        result.run(DismissMethod::Standard);
        let report = self
            .executor
            .execute_dismissal(page, &candidates, context, budget)
            .await?;
        if self.absorb(DismissMethod::Standard, context, report, &mut result) {
            return Ok(self.finish(result));
        }

        if !self.within_budget(&budget, DismissMethod::OracleAssisted, &mut result) {
            return Ok(self.finish(result));
        }
        if self
            .oracle_assisted(page, context, target, budget, &mut result)
            .await?
        {
            return Ok(self.finish(result));
        }

        if !self.within_budget(&budget, DismissMethod::Forced, &mut result) {
            return Ok(self.finish(result));
        }
        if self.forced(page, &mut result).await? {
            return Ok(self.finish(result));
        }

        if !self.within_budget(&budget, DismissMethod::Comprehensive, &mut result) {
            return Ok(self.finish(result));
        }
        let every = self.catalog.every_selector();
        result.run(DismissMethod::Comprehensive);
        let report = self
            .executor
            .execute_dismissal(page, &every, context, budget)
            .await?;
        self.absorb(DismissMethod::Comprehensive, context, report, &mut result);

        Ok(self.finish(result))
    }

    async fn markup(&self, page: &dyn PageDriver) -> Result<String, DriverError> {
        Ok(match recoverable(page.content().await)? {
            Ok(markup) => markup,
            Err(err) => {
                warn!(error = %err, "page content unavailable; analyzing empty markup");
                String::new()
            }
        })
    }

    fn within_budget(
        &self,
        budget: &Budget,
        next: DismissMethod,
        result: &mut DismissalResult,
    ) -> bool {
        if budget.is_exhausted(self.clock().as_ref()) {
            warn!(step = %next, "cascade budget exhausted");
            result.record(next, ["cascade budget exhausted before this step"]);
            return false;
        }
        true
    }

    async fn guided_tour(
        &self,
        page: &dyn PageDriver,
        tour: &GuidedTour,
        before: &str,
        result: &mut DismissalResult,
    ) -> Result<bool, DriverError> {
        result.run(DismissMethod::GuidedTour);
        let report = self.executor.execute_sequence(page, &tour.steps).await?;
        result.tried(report.selectors_used.iter().cloned());
        if !report.is_complete() {
            result.record(DismissMethod::GuidedTour, &report.errors);
            return Ok(false);
        }

        let verification = self.executor.verify(page, Some(before)).await?;
        let dismissed = verification.dismissed;
        result.verification = Some(verification);
        if dismissed {
            result.succeed(DismissMethod::GuidedTour, report.selectors_used.last().cloned());
            Ok(true)
        } else {
            result.record(
                DismissMethod::GuidedTour,
                ["tour completed but the page is still obstructed"],
            );
            Ok(false)
        }
    }

    async fn oracle_assisted(
        &self,
        page: &dyn PageDriver,
        context: &str,
        target: &DismissTarget,
        budget: Budget,
        result: &mut DismissalResult,
    ) -> Result<bool, DriverError> {
        let Some(oracle) = &self.oracle else {
            debug!("no oracle configured; skipping oracle step");
            return Ok(false);
        };
        let screenshot = match &target.snapshot {
            Snapshot::None => {
                debug!("no screenshot available; skipping oracle step");
                return Ok(false);
            }
            Snapshot::Provided(bytes) => bytes.clone(),
            Snapshot::Capture => match recoverable(page.screenshot().await)? {
                Ok(bytes) => bytes,
                Err(err) => {
                    result.record(
                        DismissMethod::OracleAssisted,
                        [format!("screenshot failed: {err}")],
                    );
                    return Ok(false);
                }
            },
        };
        if screenshot.is_empty() {
            debug!("empty screenshot; skipping oracle step");
            return Ok(false);
        }

        result.run(DismissMethod::OracleAssisted);
        let markup = self.markup(page).await?;
        let request = OracleRequest::new(
            screenshot,
            self.prompts.markup_snippet(&markup),
            self.prompts.dismissal_prompt(context, &markup),
        );
        let raw = match oracle.analyze(&request).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(oracle = oracle.name(), error = %err, "oracle call failed");
                result.record(
                    DismissMethod::OracleAssisted,
                    [format!("oracle {} failed: {err}", oracle.name())],
                );
                return Ok(false);
            }
        };

        let priority: Vec<String> = if self.config.tour_for(context).is_some() {
            TOUR_PRIORITY_SELECTORS.iter().map(|s| s.to_string()).collect()
        } else {
            Vec::new()
        };
        let verdict = parse_verdict(&raw, &priority);
        if !verdict.is_actionable() {
            result.record(
                DismissMethod::OracleAssisted,
                [format!("no actionable popup reported ({})", verdict.reason)],
            );
            return Ok(false);
        }
        debug!(
            selectors = verdict.selectors.len(),
            multi_click = verdict.multi_click,
            confidence = verdict.confidence,
            "oracle verdict"
        );

        if verdict.multi_click {
            let report = self
                .executor
                .execute_multi_step(page, &verdict.selectors, verdict.steps as usize)
                .await?;
            result.tried(report.selectors_used.iter().cloned());
            if report.is_complete() {
                result.succeed(
                    DismissMethod::OracleAssisted,
                    report.selectors_used.last().cloned(),
                );
                return Ok(true);
            }
            result.record(DismissMethod::OracleAssisted, &report.errors);
            return Ok(false);
        }

        let report = self
            .executor
            .execute_dismissal(page, &verdict.selectors, context, budget)
            .await?;
        Ok(self.absorb(DismissMethod::OracleAssisted, context, report, result))
    }

    async fn forced(
        &self,
        page: &dyn PageDriver,
        result: &mut DismissalResult,
    ) -> Result<bool, DriverError> {
        let diagnosis = self.analyzer.analyze(&self.markup(page).await?);
        if !diagnosis.needs_force() {
            debug!(
                layers = diagnosis.layer_count,
                "no layered or pointer-blocking structure; skipping forced step"
            );
            return Ok(false);
        }

        result.run(DismissMethod::Forced);
        let report = self.executor.execute_force_dismissal(page, &diagnosis).await?;
        if report.success {
            result.force_action = report.winning_action;
            result.succeed(DismissMethod::Forced, None);
            return Ok(true);
        }
        result.record(DismissMethod::Forced, &report.errors);
        Ok(false)
    }

    fn absorb(
        &self,
        method: DismissMethod,
        context: &str,
        report: StrategyReport,
        result: &mut DismissalResult,
    ) -> bool {
        result.tried(report.selectors_tried);
        if !report.success {
            result.record(method, &report.errors);
            return false;
        }
        if method.learns() {
            if let Some(selector) = &report.selector_used {
                result.learned = self.store.learn(context, selector).is_some();
            }
        }
        result.succeed(method, report.selector_used);
        true
    }

    fn finish(&self, result: DismissalResult) -> DismissalResult {
        if result.success {
            info!(
                method = %result.method,
                selector = result.selector_used.as_deref().unwrap_or("-"),
                learned = result.learned,
                "obstruction dismissed"
            );
        } else {
            warn!(
                steps = result.steps_run.len(),
                errors = result.errors.len(),
                "dismissal cascade exhausted"
            );
        }
        result
    }
}
