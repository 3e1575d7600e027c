//! Self-healing selector resolution.
//!
//! [`SelectorResolver::get_selector`] is a plain store lookup.
//! [`SelectorResolver::resolve`] validates the stored selector against the
//! live page and, when it is stale or missing, repairs it through a
//! [`SelectorHealer`] after a [`ContextGuard`] has confirmed the page is the
//! one the selector belongs to.

pub mod guard;
pub mod healer;
pub mod resolver;

pub use guard::{ContextGuard, MarkerContextGuard};
pub use healer::{HealOutcome, HealRequest, OracleHealer, SelectorHealer};
pub use resolver::{
    ResolveOutcome, ResolverConfig, ResolverStatsSnapshot, SelectorResolver,
    DEFAULT_VALIDATION_TIMEOUT,
};
