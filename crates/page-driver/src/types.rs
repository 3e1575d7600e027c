use serde::{Deserialize, Serialize};

/// Element states a driver can wait for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementState {
    Attached,
    Detached,
    Visible,
    Hidden,
}

/// Reference to the `index`-th element matched by `selector` at lookup time.
///
/// Handles are re-resolved on every use, so a handle to an element that has
/// since been removed behaves as detached rather than dangling.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self {
            selector: selector.into(),
            index,
        }
    }

    pub fn first(selector: impl Into<String>) -> Self {
        Self::new(selector, 0)
    }
}

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.selector, self.index)
    }
}
