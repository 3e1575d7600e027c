//! Page boundary for pagewarden.
//!
//! The obstruction and selector crates never talk to a browser directly; they
//! go through [`PageDriver`]. Two implementations ship here:
//! - [`fake::FakePage`] (feature `fake`): a scripted in-memory page for tests.
//! - [`chromium::ChromiumPage`] (feature `chromium`): a chromiumoxide page.

pub mod driver;
pub mod errors;
pub mod types;

#[cfg(feature = "chromium")]
pub mod chromium;
#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use driver::PageDriver;
pub use errors::{recoverable, DriverError};
pub use types::{ElementHandle, ElementState};
