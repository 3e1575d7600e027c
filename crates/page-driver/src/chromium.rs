//! Chromium-backed [`PageDriver`] over chromiumoxide.
//!
//! Selectors are resolved in page JavaScript so the `:has-text("...")`
//! pseudo-class used by the selector catalog works alongside plain CSS.
//! Clicks dispatch real mouse events at the element centre.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::driver::PageDriver;
use crate::errors::DriverError;
use crate::types::{ElementHandle, ElementState};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

const PRELUDE: &str = r#"
const __pwFind = (sel) => {
  const m = sel.match(/^(.*?):has-text\((['"])(.*)\2\)\s*$/);
  if (!m) return Array.from(document.querySelectorAll(sel));
  const base = m[1].trim() || '*';
  const text = m[3].toLowerCase();
  return Array.from(document.querySelectorAll(base))
    .filter((el) => (el.innerText || el.textContent || '').toLowerCase().includes(text));
};
const __pwVisible = (el) => {
  if (!el || !el.isConnected) return false;
  const style = window.getComputedStyle(el);
  if (style.display === 'none' || style.visibility === 'hidden' || parseFloat(style.opacity) === 0) return false;
  const rect = el.getBoundingClientRect();
  return rect.width > 0 && rect.height > 0;
};
"#;

pub(crate) fn map_cdp_error(err: CdpError) -> DriverError {
    let message = err.to_string();
    if message.contains("AlreadyClosed")
        || message.contains("ConnectionClosed")
        || message.contains("channel closed")
        || message.contains("ChannelSendError")
    {
        return DriverError::SessionClosed(message);
    }
    match err {
        CdpError::JavascriptException(_) => DriverError::Script(message),
        CdpError::Timeout => DriverError::Io(format!("cdp request timed out: {message}")),
        _ => DriverError::Io(message),
    }
}

#[derive(Debug, Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

/// One chromiumoxide tab.
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn eval(&self, expression: String) -> Result<Value, DriverError> {
        let result = self.page.evaluate(expression).await.map_err(map_cdp_error)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    fn with_element(handle: &ElementHandle, body: &str) -> Result<String, DriverError> {
        let selector = serde_json::to_string(&handle.selector)
            .map_err(|err| DriverError::InvalidSelector(err.to_string()))?;
        Ok(format!(
            "(() => {{ {PRELUDE} const el = __pwFind({selector})[{index}]; {body} }})()",
            index = handle.index
        ))
    }

    async fn count(&self, selector: &str) -> Result<usize, DriverError> {
        let quoted = serde_json::to_string(selector)
            .map_err(|err| DriverError::InvalidSelector(err.to_string()))?;
        let value = self
            .eval(format!("(() => {{ {PRELUDE} return __pwFind({quoted}).length; }})()"))
            .await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn state_reached(&self, selector: &str, state: ElementState) -> Result<bool, DriverError> {
        let quoted = serde_json::to_string(selector)
            .map_err(|err| DriverError::InvalidSelector(err.to_string()))?;
        let check = match state {
            ElementState::Attached => "nodes.length > 0",
            ElementState::Detached => "nodes.length === 0",
            ElementState::Visible => "nodes.some(__pwVisible)",
            ElementState::Hidden => "!nodes.some(__pwVisible)",
        };
        let value = self
            .eval(format!(
                "(() => {{ {PRELUDE} const nodes = __pwFind({quoted}); return {check}; }})()"
            ))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn center_of(&self, handle: &ElementHandle) -> Result<Option<Point>, DriverError> {
        let script = Self::with_element(
            handle,
            "if (!__pwVisible(el)) return null; \
             el.scrollIntoView({block: 'center', inline: 'center'}); \
             const r = el.getBoundingClientRect(); \
             return {x: r.left + r.width / 2, y: r.top + r.height / 2};",
        )?;
        let value = self.eval(script).await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| DriverError::Script(err.to_string()))
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<(), DriverError> {
        for kind in [
            DispatchMouseEventType::MousePressed,
            DispatchMouseEventType::MouseReleased,
        ] {
            let cmd = DispatchMouseEventParams::builder()
                .r#type(kind)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build()
                .map_err(DriverError::Io)?;
            self.page.execute(cmd).await.map_err(map_cdp_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn locate(&self, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let count = self.count(selector).await?;
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
        let deadline = Instant::now() + timeout;
        loop {
            match self.state_reached(selector, state).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(DriverError::Script(message)) => {
                    return Err(DriverError::InvalidSelector(format!("{selector}: {message}")))
                }
                Err(err) => debug!(selector, error = %err, "wait_for lookup failed"),
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn is_visible(
        &self,
        handle: &ElementHandle,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let script = Self::with_element(handle, "return __pwVisible(el);")?;
        match tokio::time::timeout(timeout.max(POLL_INTERVAL), self.eval(script)).await {
            Ok(value) => Ok(value?.as_bool().unwrap_or(false)),
            Err(_) => Err(DriverError::timeout(format!("is_visible {handle}"), timeout)),
        }
    }

    async fn is_enabled(&self, handle: &ElementHandle) -> Result<bool, DriverError> {
        let script = Self::with_element(
            handle,
            "if (!el) return null; \
             return !el.disabled && el.getAttribute('aria-disabled') !== 'true';",
        )?;
        match self.eval(script).await? {
            Value::Bool(enabled) => Ok(enabled),
            _ => Err(DriverError::Detached(handle.to_string())),
        }
    }

    async fn click(
        &self,
        handle: &ElementHandle,
        timeout: Duration,
        force: bool,
    ) -> Result<(), DriverError> {
        if force {
            let script = Self::with_element(handle, "if (!el) return false; el.click(); return true;")?;
            return match self.eval(script).await? {
                Value::Bool(true) => Ok(()),
                _ => Err(DriverError::NotFound(handle.to_string())),
            };
        }

        let deadline = Instant::now() + timeout;
        let point = loop {
            if let Some(point) = self.center_of(handle).await? {
                break point;
            }
            if Instant::now() >= deadline {
                return Err(DriverError::timeout(format!("click {handle}"), timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        };
        self.mouse_click(point.x, point.y).await?;
        debug!(element = %handle, x = point.x, y = point.y, "clicked element");
        Ok(())
    }

    async fn evaluate_script(&self, script: &str, args: Value) -> Result<Value, DriverError> {
        let args = serde_json::to_string(&args).map_err(|err| DriverError::Script(err.to_string()))?;
        self.eval(format!("({script})({args})")).await
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.page.content().await.map_err(map_cdp_error)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(false)
                    .build(),
            )
            .await
            .map_err(map_cdp_error)
    }

    async fn keyboard_press(&self, key: &str) -> Result<(), DriverError> {
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let cmd = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key(key)
                .code(key)
                .build()
                .map_err(DriverError::Io)?;
            self.page.execute(cmd).await.map_err(map_cdp_error)?;
        }
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.mouse_click(x, y).await
    }

    async fn current_url(&self) -> Result<Option<String>, DriverError> {
        self.page.url().await.map_err(map_cdp_error)
    }
}

/// Browser launch settings.
#[derive(Clone, Debug)]
pub struct ChromiumLaunch {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub args: Vec<String>,
    pub request_timeout: Duration,
}

impl Default for ChromiumLaunch {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            args: Vec::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// A launched browser plus its event-handler task.
pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    pub async fn launch(options: &ChromiumLaunch) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder();
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.chrome_path {
            builder = builder.chrome_executable(path);
        }
        for arg in &options.args {
            builder = builder.arg(arg);
        }
        let config = builder
            .request_timeout(options.request_timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-sandbox")
            .build()
            .map_err(|err| DriverError::Io(format!("failed to build browser config: {err}")))?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|err| DriverError::Io(format!("browser launch failed: {err}")))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "browser handler event error");
                }
            }
            debug!("browser event handler exited");
        });
        info!(headless = options.headless, "launched chromium");
        Ok(Self { browser, handler })
    }

    /// Opens a new tab on `url` and waits for the first navigation.
    pub async fn open(&self, url: &str) -> Result<ChromiumPage, DriverError> {
        let page = self.browser.new_page(url).await.map_err(map_cdp_error)?;
        if let Err(err) = page.wait_for_navigation().await {
            debug!(url, error = %err, "navigation wait failed");
        }
        Ok(ChromiumPage::new(page))
    }

    pub async fn shutdown(mut self) {
        if let Err(err) = self.browser.close().await {
            debug!(error = %err, "browser close failed");
        }
        self.handler.abort();
    }
}
