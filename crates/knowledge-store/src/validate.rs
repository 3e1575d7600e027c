/// Fragments that only appear in selectors pointing at loading placeholders or
/// engine-specific pseudo-classes the live document rejects.
const REJECTED_FRAGMENTS: [&str; 3] = [":contains(", "skeleton", "ska__"];

/// Rejects selectors that can never be a durable match.
pub fn validate_selector_format(selector: &str) -> bool {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lowered = trimmed.to_ascii_lowercase();
    !REJECTED_FRAGMENTS
        .iter()
        .any(|fragment| lowered.contains(fragment))
}
