//! Page routines used by forced dismissal.
//!
//! Each script is a function expression called with one `args` object. The
//! `routine` field names it so scripted pages can tell them apart.

use serde_json::{json, Value};

/// Elements that physically sit between the user and the page.
pub const BLOCKER_SELECTORS: [&str; 7] = [
    ".dialog-mask",
    ".modal-backdrop",
    ".m-popOver-wrapper",
    ".popup-overlay",
    ".overlay",
    ".backdrop",
    ".mask",
];

pub const CLOSE_LABELS: [&str; 5] = ["close", "ok", "got it", "dismiss", "skip"];

pub const NEUTRALIZE_BLOCKERS: &str = r#"(args) => {
  const targets = document.querySelectorAll(args.blockers + ', [style*="pointer-events: none"], [style*="pointer-events:none"]');
  let neutralized = 0;
  for (const el of targets) {
    if (getComputedStyle(el).pointerEvents === 'none') {
      el.style.pointerEvents = 'auto';
      neutralized += 1;
    }
  }
  return { neutralized };
}"#;

pub const CLOSE_CONTROL: &str = r#"(args) => {
  const visible = (el) => !!(el.offsetParent || el.getClientRects().length);
  const labels = args.labels;
  const scopes = Array.from(document.querySelectorAll(args.blockers + ', [role="dialog"], .modal, .popup'));
  for (const scope of scopes) {
    for (const el of scope.querySelectorAll('button, [role="button"], [aria-label], a, span')) {
      const text = (el.innerText || el.getAttribute('aria-label') || '').trim().toLowerCase().replace(/!$/, '');
      if (text && labels.includes(text) && visible(el)) {
        el.click();
        return { clicked: true, label: text };
      }
    }
  }
  return { clicked: false };
}"#;

pub const OVERLAY_CLICK: &str = r#"(args) => {
  for (const el of document.querySelectorAll(args.blockers)) {
    if (el.offsetParent !== null) {
      el.click();
      return { clicked: true, target: el.className };
    }
  }
  return { clicked: false };
}"#;

pub(crate) fn routine_args(routine: &str) -> Value {
    json!({
        "routine": routine,
        "blockers": BLOCKER_SELECTORS.join(", "),
        "labels": CLOSE_LABELS,
    })
}

/// Reads the `clicked` flag a routine reports; anything else counts as no click.
pub(crate) fn reported_click(result: &Value) -> bool {
    result
        .get("clicked")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
