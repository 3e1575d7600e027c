use std::sync::Arc;

use knowledge_store::KnowledgeStore;
use obstruction_analyzer::ContextRules;
use page_driver::fake::FakePage;
use selector_resolver::{MarkerContextGuard, OracleHealer, ResolveOutcome, SelectorResolver};
use vision_oracle::fake::ScriptedOracle;
use vision_oracle::OracleError;

const LOGIN: &str = "fb_login_page";

fn login_rules() -> ContextRules {
    ContextRules::default().with_markers(LOGIN, vec!["login-form".into()])
}

fn resolver(store: Arc<KnowledgeStore>, oracle: Arc<ScriptedOracle>) -> SelectorResolver {
    SelectorResolver::new(store)
        .with_guard(Arc::new(MarkerContextGuard::new(login_rules())))
        .with_healer(Arc::new(OracleHealer::new(oracle)))
}

#[tokio::test]
async fn valid_selector_resolves_twice_without_oracle() {
    let store = Arc::new(KnowledgeStore::in_memory());
    store.set(LOGIN, "mobile_input", "#mobile");
    let oracle = Arc::new(ScriptedOracle::answering(r##"{"selectors": ["#other"]}"##));
    let resolver = resolver(store, oracle.clone());
    let page = FakePage::new().with_element("#mobile");

    let first = resolver.resolve_selector(&page, LOGIN, "mobile_input").await.unwrap();
    let second = resolver.resolve_selector(&page, LOGIN, "mobile_input").await.unwrap();

    assert_eq!(first.as_deref(), Some("#mobile"));
    assert_eq!(first, second);
    assert_eq!(oracle.calls(), 0);
    assert_eq!(resolver.stats().valid, 2);
}

#[tokio::test]
async fn context_mismatch_never_heals() {
    let store = Arc::new(KnowledgeStore::in_memory());
    store.set(LOGIN, "mobile_input", "#stale");
    let oracle = Arc::new(ScriptedOracle::answering(r##"{"selectors": ["#mobile"]}"##));
    let resolver = resolver(store.clone(), oracle.clone());
    let page = FakePage::new()
        .with_markup("<div class='betslip'>not the login page</div>")
        .with_element("#mobile");

    let outcome = resolver.resolve(&page, LOGIN, "mobile_input").await.unwrap();

    assert!(matches!(outcome, ResolveOutcome::ContextMismatch { .. }));
    assert_eq!(outcome.selector(), Some("#stale"));
    assert_eq!(store.get(LOGIN, "mobile_input").as_deref(), Some("#stale"));
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn mismatch_on_absent_entry_returns_empty() {
    let store = Arc::new(KnowledgeStore::in_memory());
    let oracle = Arc::new(ScriptedOracle::answering(r##"{"selectors": ["#mobile"]}"##));
    let resolver = resolver(store.clone(), oracle.clone());
    let page = FakePage::new().with_element("#mobile");

    let selector = resolver.resolve_selector(&page, LOGIN, "mobile_input").await.unwrap();

    assert_eq!(selector, None);
    assert!(!store.has_selectors(LOGIN));
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn stale_selector_is_healed_and_stored() {
    let store = Arc::new(KnowledgeStore::in_memory());
    store.set(LOGIN, "mobile_input", "#old-mobile");
    let oracle = Arc::new(ScriptedOracle::answering(
        "```json\n{\"has_popup\": false, \"selectors\": [\"div.skeleton-input\", \"#old-mobile\", \"input[name=mobile]\"], \"confidence\": 0.8}\n```",
    ));
    let resolver = resolver(store.clone(), oracle.clone());
    let page = FakePage::new()
        .with_markup("<form class='login-form'><input name='mobile'></form>")
        .with_element("input[name=mobile]");

    let outcome = resolver.resolve(&page, LOGIN, "mobile_input").await.unwrap();

    assert_eq!(
        outcome,
        ResolveOutcome::Healed {
            selector: "input[name=mobile]".into(),
            previous: Some("#old-mobile".into()),
        }
    );
    assert_eq!(
        store.get(LOGIN, "mobile_input").as_deref(),
        Some("input[name=mobile]")
    );
    assert_eq!(oracle.calls(), 1);

    let again = resolver.resolve(&page, LOGIN, "mobile_input").await.unwrap();
    assert!(matches!(again, ResolveOutcome::Valid { .. }));
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn failed_repair_keeps_stale_entry_and_returns_empty() {
    let store = Arc::new(KnowledgeStore::in_memory());
    store.set(LOGIN, "mobile_input", "#old-mobile");
    let oracle = Arc::new(
        ScriptedOracle::answering(r##"{"selectors": ["#nowhere"]}"##)
            .then(Err(OracleError::Transport("connection reset".into()))),
    );
    let resolver = resolver(store.clone(), oracle.clone());
    let page = FakePage::new().with_markup("<form class='login-form'></form>");

    let first = resolver.resolve(&page, LOGIN, "mobile_input").await.unwrap();
    assert!(matches!(first, ResolveOutcome::Unhealed { .. }));
    assert_eq!(first.selector(), None);

    let second = resolver.resolve_selector(&page, LOGIN, "mobile_input").await.unwrap();
    assert_eq!(second, None);

    assert_eq!(store.get(LOGIN, "mobile_input").as_deref(), Some("#old-mobile"));
    assert_eq!(oracle.calls(), 2);
    assert_eq!(resolver.stats().unhealed, 2);
}

#[tokio::test]
async fn unknown_context_heals_unverified() {
    let store = Arc::new(KnowledgeStore::in_memory());
    let oracle = Arc::new(ScriptedOracle::answering(r##"{"selectors": ["button.accept"]}"##));
    let resolver = resolver(store.clone(), oracle);
    let page = FakePage::new().with_element("button.accept");

    let selector = resolver.resolve_selector(&page, "checkout", "accept").await.unwrap();

    assert_eq!(selector.as_deref(), Some("button.accept"));
    assert_eq!(store.get("checkout", "accept").as_deref(), Some("button.accept"));
}

#[tokio::test]
async fn lost_session_propagates() {
    let store = Arc::new(KnowledgeStore::in_memory());
    store.set(LOGIN, "mobile_input", "#mobile");
    let resolver = resolver(store, Arc::new(ScriptedOracle::new()));
    let page = FakePage::new();
    page.close();

    let err = resolver.resolve(&page, LOGIN, "mobile_input").await.unwrap_err();
    assert!(err.is_fatal());
}
