use std::sync::Arc;
use std::time::Duration;

use dismissal_cascade::{DismissalCascade, PageWarden, PopupMonitor};
use dismissal_executor::DismissalExecutor;
use knowledge_store::{KnowledgeStore, SharedKnowledgeStore};
use page_driver::fake::{FakeEffect, FakePage};
use page_driver::PageDriver;
use pagewarden_core_types::{ManualClock, SystemClock};
use selector_resolver::SelectorResolver;
use tokio_util::sync::CancellationToken;

const CLOSE: &str = r#"button:has-text("Close")"#;
const BACKDROP_MARKUP: &str =
    r#"<div class="modal-backdrop"></div><div class="modal"><button>Close</button></div>"#;
const CLEAN_MARKUP: &str = "<html><body><main>odds</main></body></html>";

fn cascade(store: SharedKnowledgeStore, clock: Arc<ManualClock>) -> Arc<DismissalCascade> {
    Arc::new(DismissalCascade::new(store, DismissalExecutor::new(clock)))
}

async fn wait_for_checks(clock: &ManualClock, interval: Duration, checks: usize) {
    while clock.sleeps().iter().filter(|d| **d == interval).count() < checks {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn unchanged_failed_obstruction_is_not_retried() {
    let store: SharedKnowledgeStore = Arc::new(KnowledgeStore::in_memory());
    let clock = ManualClock::shared();
    let page: Arc<FakePage> = Arc::new(FakePage::new().with_markup(BACKDROP_MARKUP));
    let interval = Duration::from_secs(10);

    let handle = PopupMonitor::new(cascade(store, clock.clone()))
        .with_context("generic")
        .start(page.clone());
    wait_for_checks(&clock, interval, 3).await;
    let summary = handle.stop().await;

    assert!(summary.checks >= 3);
    assert_eq!(summary.cascades, 1);
    assert_eq!(summary.successes, 0);
    assert!(!summary.session_lost);
}

#[tokio::test]
async fn cleared_obstruction_is_learned_once() {
    let store: SharedKnowledgeStore = Arc::new(KnowledgeStore::in_memory());
    let clock = ManualClock::shared();
    let page: Arc<FakePage> = Arc::new(
        FakePage::new()
            .with_markup(BACKDROP_MARKUP)
            .with_element(CLOSE)
            .on_click(CLOSE, FakeEffect::removes(CLOSE).with_markup(CLEAN_MARKUP)),
    );
    let interval = Duration::from_secs(10);

    let handle = PopupMonitor::new(cascade(store.clone(), clock.clone()))
        .with_context("generic")
        .start(page.clone());
    wait_for_checks(&clock, interval, 3).await;
    let summary = handle.stop().await;

    assert_eq!(summary.cascades, 1);
    assert_eq!(summary.successes, 1);
    assert_eq!(store.list_learned("generic"), vec![CLOSE.to_string()]);
}

#[tokio::test]
async fn closed_page_ends_the_loop() {
    let store: SharedKnowledgeStore = Arc::new(KnowledgeStore::in_memory());
    let clock = ManualClock::shared();
    let page = FakePage::new();
    page.close();

    let summary = PopupMonitor::new(cascade(store, clock))
        .run(&page, CancellationToken::new())
        .await;

    assert!(summary.session_lost);
    assert_eq!(summary.checks, 1);
    assert_eq!(summary.cascades, 0);
}

#[tokio::test]
async fn stop_interrupts_the_interval_wait() {
    let store: SharedKnowledgeStore = Arc::new(KnowledgeStore::in_memory());
    let warden = PageWarden::new(
        SelectorResolver::new(store.clone()),
        DismissalCascade::new(store, DismissalExecutor::new(SystemClock::shared())),
    );
    let page: Arc<dyn PageDriver> = Arc::new(FakePage::new().with_markup(CLEAN_MARKUP));

    let handle = warden.start_monitoring(page, Some("generic"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    let summary = tokio::time::timeout(Duration::from_secs(1), handle.stop())
        .await
        .expect("monitor should stop promptly");

    assert_eq!(summary.checks, 1);
    assert_eq!(summary.cascades, 0);
}

#[tokio::test]
async fn warden_shares_one_store_between_resolution_and_dismissal() {
    let store: SharedKnowledgeStore = Arc::new(KnowledgeStore::in_memory());
    store.set("generic", "search_box", "input#search");
    let clock = ManualClock::shared();
    let warden = PageWarden::new(
        SelectorResolver::new(store.clone()),
        DismissalCascade::new(store, DismissalExecutor::new(clock)),
    );
    let page = FakePage::new()
        .with_markup(BACKDROP_MARKUP)
        .with_element("input#search")
        .with_element(CLOSE)
        .on_click(CLOSE, FakeEffect::removes(CLOSE));

    assert_eq!(
        warden.get_selector("generic", "search_box").as_deref(),
        Some("input#search")
    );
    let resolved = warden
        .resolve_selector(&page, "generic", "search_box")
        .await
        .unwrap();
    assert_eq!(resolved.as_deref(), Some("input#search"));

    let result = warden
        .dismiss(&page, Some("generic"), &dismissal_cascade::DismissTarget::new())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(warden.list_contexts(), vec!["generic".to_string()]);
    assert_eq!(warden.list_learned("generic"), vec![CLOSE.to_string()]);
    assert_eq!(warden.get_selector("generic", "search_box").as_deref(), Some("input#search"));
}
