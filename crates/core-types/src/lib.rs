//! Shared primitives for the pagewarden crates.
//!
//! Everything that sleeps or measures elapsed time goes through [`Clock`] so
//! tests can swap in [`ManualClock`] and never wait on the wall clock.

pub mod budget;
pub mod clock;

pub use budget::Budget;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
