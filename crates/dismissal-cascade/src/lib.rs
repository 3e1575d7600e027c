//! Obstruction dismissal orchestration.
//!
//! [`DismissalCascade`] tries the dismissal strategies in order and learns
//! from what works, [`PopupMonitor`] re-runs it whenever a new obstruction
//! appears, and [`PageWarden`] bundles both with selector resolution behind
//! one surface.

pub mod cascade;
pub mod config;
pub mod monitor;
pub mod result;
pub mod warden;

pub use cascade::{DismissTarget, DismissalCascade, Snapshot};
pub use config::{CascadeConfig, GuidedTour, DEFAULT_MONITOR_INTERVAL, DEFAULT_TOTAL_BUDGET};
pub use monitor::{MonitorHandle, MonitorSummary, PopupMonitor};
pub use result::{DismissMethod, DismissalResult};
pub use warden::PageWarden;
