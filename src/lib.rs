//! pagewarden command-line front end.
//!
//! Loads `pagewarden.yaml`, wires the knowledge store, resolver and dismissal
//! cascade from it and exposes them through the `pagewarden` binary.

pub mod cli;
pub mod config;

pub use config::{ConfigError, WardenConfig};
