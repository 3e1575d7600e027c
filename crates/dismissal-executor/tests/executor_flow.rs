use std::sync::Arc;
use std::time::Duration;

use dismissal_executor::{
    CheckKind, DismissalExecutor, ForceAction, MultiStepOutcome, TourStep,
};
use obstruction_analyzer::Diagnosis;
use page_driver::fake::{FakeEffect, FakePage};
use page_driver::DriverError;
use pagewarden_core_types::{Budget, ManualClock};
use serde_json::json;

fn executor() -> (DismissalExecutor, Arc<ManualClock>) {
    let clock = ManualClock::shared();
    (DismissalExecutor::new(clock.clone()), clock)
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn hidden_and_disabled_candidates_are_skipped() {
    let (executor, clock) = executor();
    let page = FakePage::new()
        .with_hidden("button.hidden")
        .with_disabled("button.disabled")
        .with_element("button.close")
        .with_element(".modal-backdrop")
        .on_click(
            "button.close",
            FakeEffect::removes("button.close").and_remove(".modal-backdrop"),
        );
    let selectors = owned(&["#missing", "button.hidden", "button.disabled", "button.close"]);

    let report = executor
        .execute_dismissal(&page, &selectors, "generic", Budget::unbounded())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.selector_used.as_deref(), Some("button.close"));
    assert_eq!(report.selectors_tried.len(), 4);
    assert_eq!(report.skipped, owned(&["button.hidden", "button.disabled"]));
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("#missing"));
    assert_eq!(page.clicked(), vec!["button.close".to_string()]);
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(500)]);
}

#[tokio::test]
async fn click_without_disappearance_is_a_failed_attempt() {
    let (executor, _clock) = executor();
    let page = FakePage::new()
        .with_element("button.noop")
        .with_element("button.close")
        .on_click("button.close", FakeEffect::removes("button.close"));
    let selectors = owned(&["button.noop", "button.close"]);

    let report = executor
        .execute_dismissal(&page, &selectors, "generic", Budget::unbounded())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.selector_used.as_deref(), Some("button.close"));
    assert!(report.errors[0].contains("still visible after click"));
}

#[tokio::test]
async fn failing_click_is_recorded_and_exhausts() {
    let (executor, _clock) = executor();
    let page = FakePage::new()
        .with_element("button.close")
        .failing_click("button.close", DriverError::Detached("button.close[0]".into()));

    let report = executor
        .execute_dismissal(&page, &owned(&["button.close"]), "generic", Budget::unbounded())
        .await
        .unwrap();

    assert!(!report.success);
    assert!(report.errors[0].contains("click failed"));
    assert!(report.errors.last().unwrap().contains("none of 1"));
}

#[tokio::test]
async fn exhausted_budget_tries_nothing() {
    let (executor, clock) = executor();
    let budget = Budget::starting_now(clock.as_ref(), Duration::from_secs(1));
    clock.advance(Duration::from_secs(2));
    let page = FakePage::new().with_element("button.close");

    let report = executor
        .execute_dismissal(&page, &owned(&["button.close"]), "generic", budget)
        .await
        .unwrap();

    assert!(!report.success);
    assert!(report.selectors_tried.is_empty());
    assert!(report.errors[0].contains("budget exhausted"));
    assert_eq!(page.calls().click, 0);
}

#[tokio::test]
async fn absent_candidates_fail_without_waiting() {
    let (executor, clock) = executor();
    let page = FakePage::new()
        .with_timed_waits(clock.clone())
        .with_element("button.close")
        .on_click("button.close", FakeEffect::removes("button.close"));
    let selectors = owned(&["#gone", ".also-gone", "button.close"]);

    let report = executor
        .execute_dismissal(&page, &selectors, "generic", Budget::unbounded())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.errors.len(), 2);
    assert!(report.errors[0].starts_with("#gone: not present"));
    assert_eq!(page.calls().wait_for, 0);
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(500)]);
}

#[tokio::test]
async fn stalled_enabled_check_times_out_on_the_executor_clock() {
    let (executor, clock) = executor();
    let page = FakePage::new()
        .with_element("button.slow")
        .with_stalled_enabled("button.slow")
        .with_element("button.close")
        .on_click("button.close", FakeEffect::removes("button.close"));
    let selectors = owned(&["button.slow", "button.close"]);

    let report = executor
        .execute_dismissal(&page, &selectors, "generic", Budget::unbounded())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.selector_used.as_deref(), Some("button.close"));
    assert_eq!(
        report.errors,
        vec!["button.slow: is_enabled timed out after 1000ms".to_string()]
    );
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(1), Duration::from_millis(500)]
    );
}

#[tokio::test]
async fn layered_page_without_blocker_is_not_forced() {
    let (executor, _clock) = executor();
    let page = FakePage::new()
        .with_markup("<form><button>OK</button></form>")
        .on_routine(
            "close_control",
            json!({ "clicked": true, "label": "ok" }),
            FakeEffect::removes("form"),
        );
    let diagnosis = Diagnosis {
        layer_count: 2,
        ..Diagnosis::clear()
    };

    let report = executor
        .execute_force_dismissal(&page, &diagnosis)
        .await
        .unwrap();

    assert!(!report.success);
    assert!(report.actions_taken.is_empty());
    assert_eq!(report.winning_action, None);
    assert!(report.errors[0].contains("no visible blocker"));
    assert!(page.calls().routines.is_empty());
    assert_eq!(page.calls().keys.len() + page.calls().click_at, 0);
}

#[tokio::test]
async fn pointer_blocking_overlay_yields_to_close_control() {
    let (executor, _clock) = executor();
    let page = FakePage::new().with_element(".dialog-mask").on_routine(
        "close_control",
        json!({ "clicked": true, "label": "ok" }),
        FakeEffect::removes(".dialog-mask"),
    );
    let diagnosis = Diagnosis {
        pointer_blocking: true,
        ..Diagnosis::clear()
    };

    let report = executor
        .execute_force_dismissal(&page, &diagnosis)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.winning_action, Some(ForceAction::CloseControl));
    assert_eq!(
        report.actions_taken,
        vec![ForceAction::NeutralizeBlockers, ForceAction::CloseControl]
    );
    assert_eq!(
        page.calls().routines,
        vec!["neutralize_blockers".to_string(), "close_control".to_string()]
    );
}

#[tokio::test]
async fn layered_modal_falls_through_to_escape() {
    let (executor, _clock) = executor();
    let page = FakePage::new()
        .with_element(".modal-backdrop")
        .on_key("Escape", FakeEffect::removes(".modal-backdrop"));
    let diagnosis = Diagnosis {
        layer_count: 3,
        ..Diagnosis::clear()
    };

    let report = executor
        .execute_force_dismissal(&page, &diagnosis)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.winning_action, Some(ForceAction::EscapeKey));
    assert_eq!(
        report.actions_taken,
        vec![
            ForceAction::CloseControl,
            ForceAction::OverlayClick,
            ForceAction::EscapeKey
        ]
    );
    assert_eq!(page.calls().keys, vec!["Escape".to_string()]);
    assert_eq!(page.calls().click_at, 0);
}

#[tokio::test]
async fn force_without_effect_fails_after_every_phase() {
    let (executor, _clock) = executor();
    let page = FakePage::new().with_element(".modal-backdrop");
    let diagnosis = Diagnosis {
        pointer_blocking: true,
        layer_count: 2,
        ..Diagnosis::clear()
    };

    let report = executor
        .execute_force_dismissal(&page, &diagnosis)
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.actions_taken.len(), 5);
    assert_eq!(report.errors.len(), 5);
    assert_eq!(page.calls().click_at, 1);
}

#[tokio::test]
async fn multi_step_reports_partial_completion() {
    let (executor, clock) = executor();
    let page = FakePage::new().with_element("#next").with_element("#got-it");
    let selectors = owned(&["#next", "#got-it", "#ok"]);

    let partial = executor
        .execute_multi_step(&page, &selectors, 0)
        .await
        .unwrap();
    assert_eq!(partial.outcome, MultiStepOutcome::Partial);
    assert_eq!(partial.steps_completed, 2);
    assert_eq!(partial.errors.len(), 1);
    assert!(partial.errors[0].starts_with("step 3/3 (#ok)"));
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(1500), Duration::from_millis(1500)]
    );

    let bounded = executor
        .execute_multi_step(&page, &selectors, 2)
        .await
        .unwrap();
    assert!(bounded.is_complete());
    assert_eq!(bounded.selectors_used, owned(&["#next", "#got-it"]));
}

#[tokio::test]
async fn sequence_clicks_first_visible_candidate_per_step() {
    let (executor, clock) = executor();
    let page = FakePage::new()
        .with_hidden("button.next")
        .with_element("span.next")
        .with_element("button.got-it")
        .on_click(
            "button.got-it",
            FakeEffect::removes("button.got-it").and_reveal("button.ok"),
        );
    let steps = vec![
        TourStep::new("Next", ["button.next", "span.next"]),
        TourStep::new("Got it", ["button.got-it"]).after(Duration::from_millis(1500)),
        TourStep::new("OK", ["button.ok"]).after(Duration::from_secs(5)),
    ];

    let report = executor.execute_sequence(&page, &steps).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(
        report.selectors_used,
        owned(&["span.next", "button.got-it", "button.ok"])
    );
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(1500), Duration::from_secs(5)]
    );
}

#[tokio::test]
async fn verification_combines_checks() {
    let (executor, _clock) = executor();
    let clean = FakePage::new().with_markup("<main>fixtures</main>");
    let verdict = executor
        .verify(&clean, Some("<div class=\"modal\">accept cookies</div> <main>fixtures</main>"))
        .await
        .unwrap();
    assert!(verdict.dismissed);
    assert_eq!(verdict.checks.len(), 3);
    assert!((verdict.confidence - 1.0).abs() < f64::EPSILON);

    let blocked = FakePage::new().with_element(".modal");
    let verdict = executor.verify(&blocked, None).await.unwrap();
    assert!(!verdict.dismissed);
    let failed: Vec<CheckKind> = verdict.failed_checks().map(|check| check.kind).collect();
    assert_eq!(failed, vec![CheckKind::ObstructionSelectors]);
}

#[tokio::test]
async fn lost_session_surfaces_as_error() {
    let (executor, _clock) = executor();
    let page = FakePage::new().with_element("button.close");
    page.close();

    let err = executor
        .execute_dismissal(&page, &owned(&["button.close"]), "generic", Budget::unbounded())
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(executor
        .execute_force_dismissal(&page, &Diagnosis::clear())
        .await
        .is_err());
}
