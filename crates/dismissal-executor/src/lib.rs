//! Low-level dismissal strategies.
//!
//! Every operation takes the page it works on and returns a report; only a
//! lost session surfaces as `Err`.

pub mod catalog;
pub mod executor;
pub mod report;
pub mod scripts;
pub mod timeouts;

pub use catalog::{SelectorCatalog, TOUR_PRIORITY_SELECTORS};
pub use executor::{token_similarity, DismissalExecutor, TourStep, OBSTRUCTION_SELECTORS};
pub use report::{
    CheckKind, ForceAction, ForceReport, MultiStepOutcome, MultiStepReport, StrategyReport,
    Verification, VerificationCheck,
};
pub use timeouts::ExecutorTimeouts;
