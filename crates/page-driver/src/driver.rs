use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::DriverError;
use crate::types::{ElementHandle, ElementState};

/// The automation surface the core consumes. Any engine exposing it is enough.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Handles for every element currently matching `selector`, in document order.
    async fn locate(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError>;

    /// Waits until `selector` reaches `state`. `Ok(false)` means the timeout elapsed.
    async fn wait_for(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<bool, DriverError>;

    async fn is_visible(&self, handle: &ElementHandle, timeout: Duration)
        -> Result<bool, DriverError>;

    async fn is_enabled(&self, handle: &ElementHandle) -> Result<bool, DriverError>;

    /// Clicks the element. `force` skips actionability checks.
    async fn click(
        &self,
        handle: &ElementHandle,
        timeout: Duration,
        force: bool,
    ) -> Result<(), DriverError>;

    /// Runs `script`, a JavaScript function expression, with `args` as its only argument.
    async fn evaluate_script(&self, script: &str, args: Value) -> Result<Value, DriverError>;

    /// Current document markup.
    async fn content(&self) -> Result<String, DriverError>;

    /// PNG capture of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    async fn keyboard_press(&self, key: &str) -> Result<(), DriverError>;

    async fn click_at(&self, x: f64, y: f64) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<Option<String>, DriverError> {
        Ok(None)
    }
}
