use once_cell::sync::Lazy;
use regex::Regex;

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| Regex::new(&format!("(?i){pattern}")).ok())
        .collect()
}

pub(crate) static OVERLAY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"class="[^"]*dialog-mask[^"]*""#,
        r#"class="[^"]*modal-backdrop[^"]*""#,
        r#"class="[^"]*overlay[^"]*""#,
        r#"class="[^"]*backdrop[^"]*""#,
        r#"class="[^"]*popup-overlay[^"]*""#,
        r#"class="[^"]*un-op-70%[^"]*""#,
        r#"class="[^"]*un-h-100vh[^"]*""#,
        r#"style="[^"]*pointer-events:\s*none[^"]*""#,
        r#"class="[^"]*dialog-wrapper[^"]*""#,
    ])
});

pub(crate) static POPUP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#"class="[^"]*m-popOver-wrapper[^"]*""#,
        r#"class="[^"]*popup-hint[^"]*""#,
        r#"class="[^"]*modal-dialog[^"]*""#,
        r#"class="[^"]*tooltip[^"]*""#,
        r#"class="[^"]*popover[^"]*""#,
        r#"class="[^"]*dialog-container[^"]*""#,
        r#"id="[^"]*modal[^"]*""#,
        r#"id="[^"]*popup[^"]*""#,
    ])
});

// Tour keywords plus the wrappers tours are rendered in.
pub(crate) static MULTI_STEP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"tour",
        r"guide",
        r"intro",
        r"step",
        r"next",
        r"got it",
        r"continue",
        r"m-popOver-wrapper",
        r"dialog-wrapper",
        r"pointer-events:\s*none",
        r"overlay",
        r"modal-backdrop",
        r"backdrop",
    ])
});

pub(crate) static LAYER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[r"z-index:\s*\d+", r"position:\s*(?:absolute|fixed|relative)"])
});

pub(crate) static POINTER_BLOCKING: Lazy<Vec<Regex>> =
    Lazy::new(|| compile(&[r"pointer-events:\s*none"]));
