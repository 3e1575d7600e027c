use std::sync::Arc;
use std::time::Duration;

use obstruction_analyzer::ObstructionAnalyzer;
use page_driver::{recoverable, DriverError, PageDriver};
use serde::{Deserialize, Serialize};
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cascade::{DismissTarget, DismissalCascade, Snapshot};

type Signature = (bool, bool, bool, usize, bool);

/// Counters reported when a monitor stops.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub checks: u64,
    pub cascades: u64,
    pub successes: u64,
    /// The loop ended because the page went away.
    pub session_lost: bool,
}

#[derive(Default)]
struct Watch {
    last_acted: Option<Signature>,
    last_succeeded: bool,
}

impl Watch {
    /// New obstruction shape, or the same shape back after a successful clear.
    fn should_act(&self, signature: Signature) -> bool {
        self.last_acted != Some(signature) || self.last_succeeded
    }
}

/// Periodically re-analyzes a page and runs the cascade when a new
/// obstruction shows up.
pub struct PopupMonitor {
    cascade: Arc<DismissalCascade>,
    interval: Duration,
    context: Option<String>,
    target: DismissTarget,
}

impl PopupMonitor {
    pub fn new(cascade: Arc<DismissalCascade>) -> Self {
        let interval = cascade.config().monitor_interval;
        Self {
            cascade,
            interval,
            context: None,
            target: DismissTarget {
                url: None,
                snapshot: Snapshot::Capture,
            },
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_target(mut self, target: DismissTarget) -> Self {
        self.target = target;
        self
    }

    /// Spawns the watch loop on the current runtime.
    pub fn start(self, page: Arc<dyn PageDriver>) -> MonitorHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(page.as_ref(), token).await });
        MonitorHandle { shutdown, task }
    }

    /// Watches until `shutdown` fires or the session is lost.
    ///
    /// Cancellation interrupts the interval wait only; a cascade that has
    /// started runs to completion first.
    pub async fn run(&self, page: &dyn PageDriver, shutdown: CancellationToken) -> MonitorSummary {
        let mut summary = MonitorSummary::default();
        let mut watch = Watch::default();
        info!(interval_ms = self.interval.as_millis() as u64, "popup monitor started");

        while !shutdown.is_cancelled() {
            summary.checks += 1;
            if let Err(err) = self.check(page, &mut watch, &mut summary).await {
                warn!(error = %err, "page session lost; popup monitor stopping");
                summary.session_lost = true;
                break;
            }

            select! {
                _ = shutdown.cancelled() => break,
                _ = self.cascade.clock().sleep(self.interval) => {}
            }
        }

        info!(
            checks = summary.checks,
            cascades = summary.cascades,
            successes = summary.successes,
            "popup monitor stopped"
        );
        summary
    }

    async fn check(
        &self,
        page: &dyn PageDriver,
        watch: &mut Watch,
        summary: &mut MonitorSummary,
    ) -> Result<(), DriverError> {
        let markup = match recoverable(page.content().await)? {
            Ok(markup) => markup,
            Err(err) => {
                debug!(error = %err, "page content unavailable; skipping check");
                return Ok(());
            }
        };
        let diagnosis = ObstructionAnalyzer::new().analyze(&markup);
        if !diagnosis.is_obstructed() {
            watch.last_acted = None;
            return Ok(());
        }

        let signature = diagnosis.signature();
        if !watch.should_act(signature) {
            debug!("obstruction unchanged since last failed cascade");
            return Ok(());
        }

        info!(score = diagnosis.score, "new obstruction detected");
        summary.cascades += 1;
        let result = self
            .cascade
            .dismiss(page, self.context.as_deref(), &self.target)
            .await?;
        watch.last_acted = Some(signature);
        watch.last_succeeded = result.success;
        if result.success {
            summary.successes += 1;
        }
        Ok(())
    }
}

/// Running monitor. Dropping the handle leaves the task running.
pub struct MonitorHandle {
    shutdown: CancellationToken,
    task: JoinHandle<MonitorSummary>,
}

impl MonitorHandle {
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the loop and waits for it to wind down.
    pub async fn stop(self) -> MonitorSummary {
        self.shutdown.cancel();
        match self.task.await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(error = %err, "popup monitor task failed");
                MonitorSummary::default()
            }
        }
    }
}
