//! Scripted in-memory page.
//!
//! Elements are keyed by the exact selector string that finds them. Clicks,
//! key presses and named script routines can carry a [`FakeEffect`] that
//! removes or reveals elements and swaps the markup, which is enough to model
//! a popup going away. Every call is counted so tests can assert which driver
//! operations a flow used.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use pagewarden_core_types::SharedClock;
use parking_lot::Mutex;
use serde_json::Value;

use crate::driver::PageDriver;
use crate::errors::DriverError;
use crate::types::{ElementHandle, ElementState};

/// Key under which script routines name themselves in their `args` object.
pub const ROUTINE_ARG: &str = "routine";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeElement {
    pub visible: bool,
    pub enabled: bool,
    pub count: usize,
}

impl Default for FakeElement {
    fn default() -> Self {
        Self {
            visible: true,
            enabled: true,
            count: 1,
        }
    }
}

/// Page mutation applied when an action fires.
#[derive(Clone, Debug, Default)]
pub struct FakeEffect {
    pub remove: Vec<String>,
    pub reveal: Vec<String>,
    pub markup: Option<String>,
}

impl FakeEffect {
    pub fn removes(selector: impl Into<String>) -> Self {
        Self::default().and_remove(selector)
    }

    pub fn and_remove(mut self, selector: impl Into<String>) -> Self {
        self.remove.push(selector.into());
        self
    }

    pub fn and_reveal(mut self, selector: impl Into<String>) -> Self {
        self.reveal.push(selector.into());
        self
    }

    pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = Some(markup.into());
        self
    }
}

/// Per-operation call counters plus the ordered action log.
#[derive(Clone, Debug, Default)]
pub struct FakeCalls {
    pub locate: usize,
    pub wait_for: usize,
    pub is_visible: usize,
    pub is_enabled: usize,
    pub click: usize,
    pub evaluate: usize,
    pub content: usize,
    pub screenshot: usize,
    pub keyboard: usize,
    pub click_at: usize,
    pub clicked: Vec<String>,
    pub routines: Vec<String>,
    pub keys: Vec<String>,
}

impl FakeCalls {
    /// Calls that mutate or inspect the page beyond plain lookups.
    pub fn forced_actions(&self) -> usize {
        self.evaluate + self.keyboard + self.click_at
    }
}

#[derive(Clone)]
struct WaitClock(SharedClock);

impl std::fmt::Debug for WaitClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WaitClock")
    }
}

#[derive(Debug)]
struct FakeState {
    elements: HashMap<String, FakeElement>,
    click_effects: HashMap<String, FakeEffect>,
    click_failures: HashMap<String, DriverError>,
    routines: HashMap<String, (Value, FakeEffect)>,
    key_effects: HashMap<String, FakeEffect>,
    click_at_effect: Option<FakeEffect>,
    markup: String,
    url: Option<String>,
    screenshot: Vec<u8>,
    closed: bool,
    wait_clock: Option<WaitClock>,
    stalled_enabled: HashSet<String>,
    calls: FakeCalls,
}

#[derive(Debug)]
pub struct FakePage {
    state: Mutex<FakeState>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    /// Empty page with a clickable `body`.
    pub fn new() -> Self {
        let mut elements = HashMap::new();
        elements.insert("body".to_string(), FakeElement::default());
        Self {
            state: Mutex::new(FakeState {
                elements,
                click_effects: HashMap::new(),
                click_failures: HashMap::new(),
                routines: HashMap::new(),
                key_effects: HashMap::new(),
                click_at_effect: None,
                markup: "<html><body></body></html>".to_string(),
                url: None,
                screenshot: b"\x89PNG\r\n\x1a\nfake".to_vec(),
                closed: false,
                wait_clock: None,
                stalled_enabled: HashSet::new(),
                calls: FakeCalls::default(),
            }),
        }
    }

    pub fn with_markup(self, markup: impl Into<String>) -> Self {
        self.state.lock().markup = markup.into();
        self
    }

    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.state.lock().url = Some(url.into());
        self
    }

    /// A `wait_for` that misses sleeps its full timeout on `clock`, the way a
    /// real driver polls until it gives up.
    pub fn with_timed_waits(self, clock: SharedClock) -> Self {
        self.state.lock().wait_clock = Some(WaitClock(clock));
        self
    }

    /// `is_enabled` on `selector` never answers.
    pub fn with_stalled_enabled(self, selector: impl Into<String>) -> Self {
        self.state.lock().stalled_enabled.insert(selector.into());
        self
    }

    pub fn with_element(self, selector: impl Into<String>) -> Self {
        self.with_element_state(selector, FakeElement::default())
    }

    pub fn with_hidden(self, selector: impl Into<String>) -> Self {
        self.with_element_state(
            selector,
            FakeElement {
                visible: false,
                ..FakeElement::default()
            },
        )
    }

    pub fn with_disabled(self, selector: impl Into<String>) -> Self {
        self.with_element_state(
            selector,
            FakeElement {
                enabled: false,
                ..FakeElement::default()
            },
        )
    }

    pub fn with_element_state(self, selector: impl Into<String>, element: FakeElement) -> Self {
        self.state.lock().elements.insert(selector.into(), element);
        self
    }

    pub fn without_element(self, selector: &str) -> Self {
        self.state.lock().elements.remove(selector);
        self
    }

    pub fn on_click(self, selector: impl Into<String>, effect: FakeEffect) -> Self {
        self.state
            .lock()
            .click_effects
            .insert(selector.into(), effect);
        self
    }

    pub fn failing_click(self, selector: impl Into<String>, error: DriverError) -> Self {
        self.state
            .lock()
            .click_failures
            .insert(selector.into(), error);
        self
    }

    /// Result and effect for a script whose args carry `{"routine": name}`.
    pub fn on_routine(self, name: impl Into<String>, result: Value, effect: FakeEffect) -> Self {
        self.state
            .lock()
            .routines
            .insert(name.into(), (result, effect));
        self
    }

    pub fn on_key(self, key: impl Into<String>, effect: FakeEffect) -> Self {
        self.state.lock().key_effects.insert(key.into(), effect);
        self
    }

    pub fn on_click_at(self, effect: FakeEffect) -> Self {
        self.state.lock().click_at_effect = Some(effect);
        self
    }

    pub fn with_screenshot(self, bytes: Vec<u8>) -> Self {
        self.state.lock().screenshot = bytes;
        self
    }

    pub fn set_markup(&self, markup: impl Into<String>) {
        self.state.lock().markup = markup.into();
    }

    pub fn insert_element(&self, selector: impl Into<String>) {
        self.state
            .lock()
            .elements
            .insert(selector.into(), FakeElement::default());
    }

    pub fn remove_element(&self, selector: &str) {
        self.state.lock().elements.remove(selector);
    }

    /// Simulates the tab or browser going away.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    pub fn has_element(&self, selector: &str) -> bool {
        self.state.lock().elements.contains_key(selector)
    }

    pub fn calls(&self) -> FakeCalls {
        self.state.lock().calls.clone()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.state.lock().calls.clicked.clone()
    }

    pub fn markup(&self) -> String {
        self.state.lock().markup.clone()
    }
}

impl FakeState {
    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed {
            Err(DriverError::SessionClosed("fake page closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn apply(&mut self, effect: &FakeEffect) {
        for selector in &effect.remove {
            self.elements.remove(selector);
        }
        for selector in &effect.reveal {
            self.elements
                .entry(selector.clone())
                .and_modify(|element| element.visible = true)
                .or_default();
        }
        if let Some(markup) = &effect.markup {
            self.markup = markup.clone();
        }
    }

    fn element(&self, handle: &ElementHandle) -> Option<&FakeElement> {
        self.elements
            .get(&handle.selector)
            .filter(|element| handle.index < element.count)
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn locate(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.calls.locate += 1;
        let count = state.elements.get(selector).map(|e| e.count).unwrap_or(0);
        Ok((0..count)
            .map(|index| ElementHandle::new(selector, index))
            .collect())
    }

    async fn wait_for(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let (reached, clock) = {
            let mut page = self.state.lock();
            page.ensure_open()?;
            page.calls.wait_for += 1;
            let element = page.elements.get(selector).filter(|e| e.count > 0);
            let reached = match state {
                ElementState::Attached => element.is_some(),
                ElementState::Detached => element.is_none(),
                ElementState::Visible => element.map(|e| e.visible).unwrap_or(false),
                ElementState::Hidden => element.map(|e| !e.visible).unwrap_or(true),
            };
            (reached, page.wait_clock.clone())
        };
        if let (false, Some(WaitClock(clock))) = (reached, clock) {
            clock.sleep(timeout).await;
        }
        Ok(reached)
    }

    async fn is_visible(
        &self,
        handle: &ElementHandle,
        _timeout: Duration,
    ) -> Result<bool, DriverError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.calls.is_visible += 1;
        Ok(state.element(handle).map(|e| e.visible).unwrap_or(false))
    }

    async fn is_enabled(&self, handle: &ElementHandle) -> Result<bool, DriverError> {
        {
            let mut state = self.state.lock();
            state.ensure_open()?;
            state.calls.is_enabled += 1;
            if !state.stalled_enabled.contains(&handle.selector) {
                return state
                    .element(handle)
                    .map(|e| e.enabled)
                    .ok_or_else(|| DriverError::Detached(handle.to_string()));
            }
        }
        std::future::pending().await
    }

    async fn click(
        &self,
        handle: &ElementHandle,
        timeout: Duration,
        force: bool,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.calls.click += 1;
        if let Some(err) = state.click_failures.get(&handle.selector) {
            return Err(err.clone());
        }
        let visible = match state.element(handle) {
            Some(element) => element.visible,
            None => return Err(DriverError::NotFound(handle.to_string())),
        };
        if !visible && !force {
            return Err(DriverError::timeout(format!("click {handle}"), timeout));
        }
        state.calls.clicked.push(handle.selector.clone());
        if let Some(effect) = state.click_effects.get(&handle.selector).cloned() {
            state.apply(&effect);
        }
        Ok(())
    }

    async fn evaluate_script(&self, _script: &str, args: Value) -> Result<Value, DriverError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.calls.evaluate += 1;
        let routine = args
            .get(ROUTINE_ARG)
            .and_then(Value::as_str)
            .unwrap_or("anonymous")
            .to_string();
        state.calls.routines.push(routine.clone());
        match state.routines.get(&routine).cloned() {
            Some((result, effect)) => {
                state.apply(&effect);
                Ok(result)
            }
            None => Ok(Value::Null),
        }
    }

    async fn content(&self) -> Result<String, DriverError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.calls.content += 1;
        Ok(state.markup.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.calls.screenshot += 1;
        Ok(state.screenshot.clone())
    }

    async fn keyboard_press(&self, key: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.calls.keyboard += 1;
        state.calls.keys.push(key.to_string());
        if let Some(effect) = state.key_effects.get(key).cloned() {
            state.apply(&effect);
        }
        Ok(())
    }

    async fn click_at(&self, _x: f64, _y: f64) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.calls.click_at += 1;
        if let Some(effect) = state.click_at_effect.clone() {
            state.apply(&effect);
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>, DriverError> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.url.clone())
    }
}
