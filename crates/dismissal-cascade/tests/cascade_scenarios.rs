use std::sync::Arc;
use std::time::Duration;

use dismissal_cascade::{
    CascadeConfig, DismissMethod, DismissTarget, DismissalCascade, DismissalResult,
};
use dismissal_executor::{DismissalExecutor, ForceAction};
use knowledge_store::{KnowledgeStore, SharedKnowledgeStore};
use page_driver::fake::{FakeEffect, FakePage};
use pagewarden_core_types::ManualClock;
use serde_json::json;
use vision_oracle::fake::ScriptedOracle;

const CLOSE: &str = r#"button:has-text("Close")"#;
const BACKDROP_MARKUP: &str =
    r#"<div class="modal-backdrop"></div><div class="modal"><button>Close</button></div>"#;
const POINTER_MARKUP: &str =
    r#"<div class="dialog-mask" style="pointer-events: none"></div><main>odds</main>"#;
const CLEAN_MARKUP: &str = "<html><body><main>odds</main></body></html>";

struct Harness {
    store: SharedKnowledgeStore,
    clock: Arc<ManualClock>,
    cascade: DismissalCascade,
}

fn harness() -> Harness {
    let store: SharedKnowledgeStore = Arc::new(KnowledgeStore::in_memory());
    let clock = ManualClock::shared();
    let cascade = DismissalCascade::new(store.clone(), DismissalExecutor::new(clock.clone()));
    Harness {
        store,
        clock,
        cascade,
    }
}

fn step_prefixes(result: &DismissalResult) -> Vec<String> {
    let mut prefixes: Vec<String> = result
        .errors
        .iter()
        .filter_map(|err| err.split(':').next())
        .map(str::to_string)
        .collect();
    prefixes.dedup();
    prefixes
}

#[tokio::test]
async fn backdrop_with_close_button_is_cleared_by_the_standard_step() {
    let Harness { store, cascade, .. } = harness();
    let page = FakePage::new()
        .with_markup(BACKDROP_MARKUP)
        .with_element(CLOSE)
        .on_click(CLOSE, FakeEffect::removes(CLOSE).with_markup(CLEAN_MARKUP));

    let result = cascade
        .dismiss(&page, Some("generic"), &DismissTarget::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.method, DismissMethod::Standard);
    assert_eq!(result.selector_used.as_deref(), Some(CLOSE));
    assert!(result.learned);
    assert_eq!(store.list_learned("generic"), vec![CLOSE.to_string()]);
    assert_eq!(result.steps_run, vec![DismissMethod::Standard]);
}

#[tokio::test]
async fn pointer_blocking_overlay_falls_through_to_forced_dismissal() {
    let Harness { store, cascade, .. } = harness();
    let page = FakePage::new()
        .with_markup(POINTER_MARKUP)
        .with_element(".dialog-mask")
        .on_routine(
            "close_control",
            json!({ "clicked": true, "label": "close" }),
            FakeEffect::removes(".dialog-mask").with_markup(CLEAN_MARKUP),
        );

    let result = cascade
        .dismiss(&page, Some("generic"), &DismissTarget::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.method, DismissMethod::Forced);
    assert_eq!(result.force_action, Some(ForceAction::CloseControl));
    assert_eq!(
        result.steps_run,
        vec![DismissMethod::Standard, DismissMethod::Forced]
    );
    assert!(result.errors.iter().all(|err| err.starts_with("standard:")));
    assert!(!result.learned);
    assert!(store.list_contexts().is_empty());
}

#[tokio::test]
async fn absent_candidates_leave_budget_for_forced_dismissal() {
    let Harness { clock, cascade, .. } = harness();
    let page = FakePage::new()
        .with_timed_waits(clock.clone())
        .with_markup(POINTER_MARKUP)
        .with_element(".dialog-mask")
        .on_routine(
            "close_control",
            json!({ "clicked": true, "label": "close" }),
            FakeEffect::removes(".dialog-mask").with_markup(CLEAN_MARKUP),
        );

    let result = cascade
        .dismiss(&page, Some("generic"), &DismissTarget::new())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.method, DismissMethod::Forced);
    assert_eq!(result.force_action, Some(ForceAction::CloseControl));
    assert!(!result.errors.iter().any(|err| err.contains("budget")));
    assert_eq!(page.calls().wait_for, 0);
    assert!(clock.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn unparsable_oracle_answer_does_not_break_the_cascade() {
    let Harness { store, cascade, .. } = harness();
    let oracle = Arc::new(ScriptedOracle::answering("```json {has_popup: true ``` "));
    let cascade = cascade.with_oracle(oracle.clone());
    let page = FakePage::new().with_markup(BACKDROP_MARKUP);

    let result = cascade
        .dismiss(&page, Some("generic"), &DismissTarget::new().capturing())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(oracle.calls(), 1);
    assert!(result.steps_run.contains(&DismissMethod::OracleAssisted));
    assert!(result
        .errors
        .iter()
        .any(|err| err.starts_with("oracle_assisted: no actionable popup")));
    assert_eq!(page.calls().screenshot, 1);
    assert!(store.list_contexts().is_empty());
}

#[tokio::test]
async fn oracle_selectors_are_executed_but_not_learned() {
    let Harness { store, cascade, .. } = harness();
    let oracle = Arc::new(ScriptedOracle::answering(
        r##"{"has_popup": true, "selectors": ["#promo-close"], "multi_click": false, "confidence": 0.9, "reason": "promo"}"##,
    ));
    let cascade = cascade.with_oracle(oracle.clone());
    let page = FakePage::new()
        .with_markup(BACKDROP_MARKUP)
        .with_element("#promo-close")
        .on_click("#promo-close", FakeEffect::removes("#promo-close"));

    let result = cascade
        .dismiss(
            &page,
            Some("fb_general"),
            &DismissTarget::new().with_screenshot(vec![1, 2, 3]),
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.method, DismissMethod::OracleAssisted);
    assert_eq!(result.selector_used.as_deref(), Some("#promo-close"));
    assert!(!result.learned);
    assert!(store.list_learned("fb_general").is_empty());
    assert_eq!(page.calls().screenshot, 0);
    assert!(oracle.prompts()[0].contains("HTML: "));
}

#[tokio::test]
async fn multi_click_verdicts_run_as_a_bounded_sequence() {
    let Harness { cascade, clock, .. } = harness();
    let oracle = Arc::new(ScriptedOracle::answering(
        r##"{"has_popup": true, "selectors": ["#step-one", "#step-two"], "multi_click": true, "steps": 2}"##,
    ));
    let cascade = cascade.with_oracle(oracle);
    let page = FakePage::new()
        .with_markup(BACKDROP_MARKUP)
        .with_element("#step-one")
        .with_element("#step-two");

    let result = cascade
        .dismiss(&page, Some("fb_general"), &DismissTarget::new().capturing())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.method, DismissMethod::OracleAssisted);
    assert_eq!(result.selector_used.as_deref(), Some("#step-two"));
    assert_eq!(
        page.clicked(),
        vec!["#step-one".to_string(), "#step-two".to_string()]
    );
    assert!(clock.sleeps().contains(&Duration::from_millis(1500)));
}

#[tokio::test]
async fn exhausted_cascade_reports_every_step_and_leaves_the_store_alone() {
    let Harness { store, cascade, .. } = harness();
    store.set("fb_match_page", "login_button", "#login");
    let before = store.snapshot();
    let oracle = Arc::new(ScriptedOracle::answering("no idea, sorry"));
    let cascade = cascade.with_oracle(oracle.clone());
    let page = FakePage::new().with_markup(POINTER_MARKUP);

    let result = cascade
        .dismiss(&page, Some("fb_match_page"), &DismissTarget::new().capturing())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.method, DismissMethod::None);
    assert_eq!(
        result.steps_run,
        vec![
            DismissMethod::GuidedTour,
            DismissMethod::Standard,
            DismissMethod::OracleAssisted,
            DismissMethod::Forced,
            DismissMethod::Comprehensive,
        ]
    );
    assert_eq!(
        step_prefixes(&result),
        vec![
            "guided_tour".to_string(),
            "standard".to_string(),
            "oracle_assisted".to_string(),
            "forced".to_string(),
            "comprehensive".to_string(),
        ]
    );
    assert_eq!(oracle.calls(), 1);
    assert_eq!(store.snapshot(), before);
    assert!(store.list_learned("fb_match_page").is_empty());
}

#[tokio::test]
async fn standard_success_short_circuits_oracle_and_force() {
    let Harness { cascade, .. } = harness();
    let oracle = Arc::new(ScriptedOracle::answering("{}"));
    let cascade = cascade.with_oracle(oracle.clone());
    let page = FakePage::new()
        .with_markup(POINTER_MARKUP)
        .with_element(CLOSE)
        .on_click(CLOSE, FakeEffect::removes(CLOSE));

    let result = cascade
        .dismiss(&page, Some("generic"), &DismissTarget::new().capturing())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.method, DismissMethod::Standard);
    assert_eq!(oracle.calls(), 0);
    assert_eq!(page.calls().forced_actions(), 0);
    assert_eq!(page.calls().screenshot, 0);
}

#[tokio::test]
async fn learned_selectors_are_tried_first() {
    let Harness { store, cascade, .. } = harness();
    store.learn("generic", "div.promo a.dismiss");
    let page = FakePage::new()
        .with_markup(BACKDROP_MARKUP)
        .with_element(CLOSE)
        .with_element("div.promo a.dismiss")
        .on_click("div.promo a.dismiss", FakeEffect::removes("div.promo a.dismiss"));

    let result = cascade
        .dismiss(&page, Some("generic"), &DismissTarget::new())
        .await
        .unwrap();

    assert_eq!(result.selector_used.as_deref(), Some("div.promo a.dismiss"));
    assert_eq!(page.clicked(), vec!["div.promo a.dismiss".to_string()]);
    assert_eq!(store.list_learned("generic").len(), 2);
}

#[tokio::test]
async fn guided_tour_runs_the_known_sequence_for_its_context() {
    let Harness { store, cascade, clock } = harness();
    let next = r#"button:has-text("Next")"#;
    let got_it = r#"button:has-text("Got it")"#;
    let ok = r#"button:has-text("OK")"#;
    let page = FakePage::new()
        .with_markup(r#"<div class="m-popOver-wrapper">Take the tour. Next</div>"#)
        .with_element(next)
        .on_click(next, FakeEffect::removes(next).and_reveal(got_it))
        .on_click(got_it, FakeEffect::removes(got_it).and_reveal(ok))
        .on_click(ok, FakeEffect::removes(ok).with_markup(CLEAN_MARKUP));

    let result = cascade
        .dismiss(
            &page,
            None,
            &DismissTarget::for_url("https://www.football.com/ng/m/match/sr:match:1"),
        )
        .await
        .unwrap();

    assert_eq!(result.context, "fb_match_page");
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.method, DismissMethod::GuidedTour);
    assert_eq!(result.selector_used.as_deref(), Some(ok));
    assert!(result.verification.as_ref().unwrap().dismissed);
    assert!(!result.learned);
    assert!(store.list_contexts().is_empty());
    let sleeps = clock.sleeps();
    assert_eq!(sleeps[0], Duration::from_millis(1500));
    assert_eq!(sleeps[1], Duration::from_secs(5));
}

#[tokio::test]
async fn context_falls_back_to_the_page_url_then_generic() {
    let Harness { cascade, .. } = harness();
    let page = FakePage::new()
        .with_markup(CLEAN_MARKUP)
        .with_url("https://www.football.com/ng/sport/football");
    let result = cascade
        .dismiss(&page, None, &DismissTarget::new())
        .await
        .unwrap();
    assert_eq!(result.context, "fb_general");
    assert_eq!(
        result.steps_run,
        vec![DismissMethod::Standard, DismissMethod::Comprehensive]
    );

    let anonymous = FakePage::new().with_markup(CLEAN_MARKUP);
    let result = cascade
        .dismiss(&anonymous, None, &DismissTarget::new())
        .await
        .unwrap();
    assert_eq!(result.context, "generic");
}

#[tokio::test]
async fn spent_budget_stops_before_the_first_step() {
    let Harness { cascade, .. } = harness();
    let cascade = cascade.with_config(CascadeConfig {
        total_budget: Duration::ZERO,
        ..CascadeConfig::default()
    });
    let page = FakePage::new()
        .with_markup(BACKDROP_MARKUP)
        .with_element(CLOSE);

    let result = cascade
        .dismiss(&page, Some("generic"), &DismissTarget::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert!(result.steps_run.is_empty());
    assert_eq!(
        result.errors,
        vec!["standard: cascade budget exhausted before this step".to_string()]
    );
    assert_eq!(page.calls().click, 0);
}

#[tokio::test]
async fn lost_session_is_the_only_error() {
    let Harness { cascade, .. } = harness();
    let page = FakePage::new().with_markup(BACKDROP_MARKUP);
    page.close();

    let err = cascade
        .dismiss(&page, Some("generic"), &DismissTarget::new())
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}
