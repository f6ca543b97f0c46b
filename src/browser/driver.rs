use std::process::Child;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::Browser;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::cdp;
use super::launcher::BrowserLauncher;
use super::recorder::ScreencastRecorder;
use super::BrowserBackend;
use crate::config::Config;
use crate::error::{PagepilotError, Result};

/// Drives the session's single page over raw CDP.
///
/// Owns the launched browser process, the chromiumoxide handle used for
/// lifecycle control, the dedicated browser context, and the page target.
pub struct PageDriver {
    child: Child,
    browser: Browser,
    handler_task: JoinHandle<()>,
    console_task: JoinHandle<()>,
    recorder: Option<ScreencastRecorder>,
    browser_ws_url: String,
    context_id: String,
    page_ws_url: String,
    closed: bool,
}

impl PageDriver {
    /// Launch the browser, create one isolated context and one page in it,
    /// and wire up console forwarding (and the recorder when requested).
    pub async fn launch(config: &Config) -> Result<Self> {
        let launcher = BrowserLauncher::from_config(config)?;
        tracing::info!(
            "Starting browser session ({}, {})",
            launcher.browser_info().browser_type.name(),
            if config.browser.headless {
                "headless"
            } else {
                "visible"
            }
        );

        let (child, browser_ws_url) = launcher.launch_and_wait().await?;

        let (browser, mut handler) = Browser::connect(&browser_ws_url).await.map_err(|e| {
            PagepilotError::CdpConnectionFailed(format!("Failed to connect to browser: {}", e))
        })?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let context = cdp::send(
            &browser_ws_url,
            "Target.createBrowserContext",
            serde_json::json!({}),
        )
        .await?;
        let context_id = context
            .get("browserContextId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                PagepilotError::CdpConnectionFailed("No browserContextId in response".to_string())
            })?
            .to_string();

        let target = cdp::send(
            &browser_ws_url,
            "Target.createTarget",
            serde_json::json!({
                "url": "about:blank",
                "browserContextId": context_id,
            }),
        )
        .await?;
        let target_id = target
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                PagepilotError::CdpConnectionFailed("No targetId in response".to_string())
            })?
            .to_string();

        let page_ws_url = format!(
            "ws://127.0.0.1:{}/devtools/page/{}",
            launcher.cdp_port(),
            target_id
        );

        let console_task = spawn_console_forwarder(page_ws_url.clone());

        let recorder = if config.capture.video {
            Some(ScreencastRecorder::start(page_ws_url.clone(), config.video_dir()).await?)
        } else {
            None
        };

        tracing::info!("Browser ready. Send JSON commands via stdin.");

        Ok(Self {
            child,
            browser,
            handler_task,
            console_task,
            recorder,
            browser_ws_url,
            context_id,
            page_ws_url,
            closed: false,
        })
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value> {
        cdp::send(&self.page_ws_url, method, params).await
    }

    async fn eval_js(&self, expression: &str) -> Result<Value> {
        cdp::evaluate(&self.page_ws_url, expression).await
    }

    /// JavaScript that defines `__findElement(selector)`, resolving CSS
    /// selectors and XPath expressions (those starting with `//`).
    fn find_element_js() -> &'static str {
        r#"
        function __findElement(selector) {
            if (selector.startsWith('//') || selector.startsWith('(//')) {
                const result = document.evaluate(selector, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null);
                return result.singleNodeValue;
            }
            return document.querySelector(selector);
        }
        "#
    }

    /// Scroll the element into view and return its center coordinates.
    async fn element_center(&self, selector: &str) -> Result<(f64, f64)> {
        let selector_json = serde_json::to_string(selector)?;
        let js = [
            "(function() {",
            Self::find_element_js(),
            &format!("const el = __findElement({selector_json});"),
            "if (!el) return null;",
            "el.scrollIntoView({ behavior: 'instant', block: 'center', inline: 'center' });",
            "const rect = el.getBoundingClientRect();",
            "return { x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };",
            "})()",
        ]
        .join("\n");

        let coords = self.eval_js(&js).await?;
        if coords.is_null() {
            return Err(PagepilotError::ElementNotFound(selector.to_string()));
        }

        let x = coords
            .get("x")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| PagepilotError::Other("Invalid coordinates".to_string()))?;
        let y = coords
            .get("y")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| PagepilotError::Other("Invalid coordinates".to_string()))?;

        Ok((x, y))
    }

    async fn dispatch_mouse(&self, kind: &str, x: f64, y: f64, with_button: bool) -> Result<()> {
        let mut params = serde_json::json!({
            "type": kind,
            "x": x,
            "y": y,
        });
        if with_button {
            params["button"] = serde_json::json!("left");
            params["clickCount"] = serde_json::json!(1);
        }
        self.send("Input.dispatchMouseEvent", params).await?;
        Ok(())
    }

    async fn screenshot_viewport(&self) -> Result<Vec<u8>> {
        let result = self
            .send(
                "Page.captureScreenshot",
                serde_json::json!({ "format": "png" }),
            )
            .await?;
        decode_screenshot(&result)
    }

    async fn screenshot_full(&self) -> Result<Vec<u8>> {
        let metrics = self
            .send("Page.getLayoutMetrics", serde_json::json!({}))
            .await?;

        let content_size = metrics
            .get("contentSize")
            .ok_or_else(|| PagepilotError::Other("No content size".to_string()))?;
        let width = content_size
            .get("width")
            .and_then(|v| v.as_f64())
            .unwrap_or(1280.0);
        let height = content_size
            .get("height")
            .and_then(|v| v.as_f64())
            .unwrap_or(720.0);

        let result = self
            .send(
                "Page.captureScreenshot",
                serde_json::json!({
                    "format": "png",
                    "clip": {
                        "x": 0,
                        "y": 0,
                        "width": width,
                        "height": height,
                        "scale": 1
                    },
                    "captureBeyondViewport": true
                }),
            )
            .await?;
        decode_screenshot(&result)
    }
}

fn decode_screenshot(result: &Value) -> Result<Vec<u8>> {
    let data = result
        .get("data")
        .and_then(|v| v.as_str())
        .ok_or_else(|| PagepilotError::Other("No screenshot data".to_string()))?;

    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| PagepilotError::Other(format!("Failed to decode screenshot: {}", e)))
}

/// Match a URL against a pattern where `*` stands for any substring.
/// A pattern without `*` must match exactly.
pub(crate) fn wildcard_match(pattern: &str, input: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == input;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let Some((first, rest_parts)) = parts.split_first() else {
        return false;
    };
    let Some((last, middle)) = rest_parts.split_last() else {
        return false;
    };

    if !input.starts_with(first) {
        return false;
    }
    let mut rest = &input[first.len()..];

    for part in middle {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(i) => rest = &rest[i + part.len()..],
            None => return false,
        }
    }

    last.is_empty() || rest.ends_with(last)
}

/// Map a friendly key name onto CDP key event fields.
/// Virtual key codes follow the Windows VK standard, which CDP uses cross-platform.
fn key_event_fields(key: &str) -> (&str, &str, &str, u32) {
    match key.to_lowercase().as_str() {
        "enter" | "return" => ("Enter", "Enter", "\r", 13),
        "tab" => ("Tab", "Tab", "\t", 9),
        "escape" | "esc" => ("Escape", "Escape", "", 27),
        "backspace" => ("Backspace", "Backspace", "", 8),
        "delete" => ("Delete", "Delete", "", 46),
        "arrowup" | "up" => ("ArrowUp", "ArrowUp", "", 38),
        "arrowdown" | "down" => ("ArrowDown", "ArrowDown", "", 40),
        "arrowleft" | "left" => ("ArrowLeft", "ArrowLeft", "", 37),
        "arrowright" | "right" => ("ArrowRight", "ArrowRight", "", 39),
        "home" => ("Home", "Home", "", 36),
        "end" => ("End", "End", "", 35),
        "pageup" => ("PageUp", "PageUp", "", 33),
        "pagedown" => ("PageDown", "PageDown", "", 34),
        "space" => (" ", "Space", " ", 32),
        _ => ("", "", "", 0),
    }
}

fn spawn_console_forwarder(page_ws_url: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = forward_console(&page_ws_url).await {
            tracing::debug!("Console forwarding stopped: {}", e);
        }
    })
}

/// Persistent listener that forwards in-page console output to the
/// diagnostic stream.
async fn forward_console(ws_url: &str) -> Result<()> {
    let (mut ws, _) = connect_async(ws_url).await.map_err(|e| {
        PagepilotError::CdpConnectionFailed(format!("WebSocket connection failed: {}", e))
    })?;

    let enable = serde_json::json!({
        "id": 1,
        "method": "Runtime.enable",
        "params": {}
    });
    ws.send(Message::Text(enable.to_string().into()))
        .await
        .map_err(|e| PagepilotError::Other(format!("Failed to enable runtime: {}", e)))?;

    while let Some(msg) = ws.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(_) => continue,
            Err(e) => return Err(PagepilotError::Other(format!("WebSocket error: {}", e))),
        };

        let event: Value = match serde_json::from_str(text.as_str()) {
            Ok(v) => v,
            Err(_) => continue,
        };

        if event.get("method").and_then(|m| m.as_str()) != Some("Runtime.consoleAPICalled") {
            continue;
        }

        let kind = event["params"]["type"].as_str().unwrap_or("log");
        let message = event["params"]["args"]
            .as_array()
            .map(|args| {
                args.iter()
                    .map(|arg| {
                        arg.get("value")
                            .map(render_console_value)
                            .or_else(|| {
                                arg.get("description")
                                    .and_then(|d| d.as_str())
                                    .map(String::from)
                            })
                            .unwrap_or_default()
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();

        tracing::info!(target: "browser.console", "{}: {}", kind, message);
    }

    Ok(())
}

fn render_console_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl BrowserBackend for PageDriver {
    async fn navigate(&self, url: &str) -> Result<(String, String)> {
        let result = self
            .send("Page.navigate", serde_json::json!({ "url": url }))
            .await?;

        if let Some(err_text) = result.get("errorText").and_then(|v| v.as_str()) {
            if !err_text.is_empty() {
                return Err(PagepilotError::NavigationFailed(format!(
                    "{}: {}",
                    url, err_text
                )));
            }
        }

        // Wait only until the DOM is parsed, not the full load.
        // Evaluation failures mid-navigation count as not-ready.
        let start = Instant::now();
        let deadline = Duration::from_secs(30);
        loop {
            tokio::time::sleep(Duration::from_millis(100)).await;

            let ready = self
                .eval_js("document.readyState")
                .await
                .unwrap_or(Value::Null);
            if matches!(ready.as_str(), Some("interactive") | Some("complete")) {
                break;
            }

            if start.elapsed() > deadline {
                return Err(PagepilotError::Timeout(format!(
                    "Navigation to {} did not reach DOM-ready within {}ms",
                    url,
                    deadline.as_millis()
                )));
            }
        }

        let final_url = self
            .eval_js("document.location.href")
            .await?
            .as_str()
            .unwrap_or(url)
            .to_string();
        let title = self
            .eval_js("document.title")
            .await?
            .as_str()
            .unwrap_or("")
            .to_string();

        Ok((final_url, title))
    }

    async fn click(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        self.wait_for_selector(selector, timeout_ms).await?;
        let (x, y) = self.element_center(selector).await?;

        // Move first so the browser updates its hit-test target; without
        // mouseMoved the click may land on the wrong DOM element.
        self.dispatch_mouse("mouseMoved", x, y, false).await?;
        self.dispatch_mouse("mousePressed", x, y, true).await?;
        self.dispatch_mouse("mouseReleased", x, y, true).await?;

        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str, timeout_ms: u64) -> Result<()> {
        self.wait_for_selector(selector, timeout_ms).await?;

        let selector_json = serde_json::to_string(selector)?;
        let value_json = serde_json::to_string(value)?;
        let js = [
            "(function() {",
            Self::find_element_js(),
            &format!("const el = __findElement({selector_json});"),
            "if (!el) return false;",
            "el.focus();",
            &format!("el.value = {value_json};"),
            "el.dispatchEvent(new Event('input', { bubbles: true }));",
            "el.dispatchEvent(new Event('change', { bubbles: true }));",
            "return true;",
            "})()",
        ]
        .join("\n");

        let filled = self.eval_js(&js).await?;
        if !filled.as_bool().unwrap_or(false) {
            return Err(PagepilotError::ElementNotFound(selector.to_string()));
        }

        Ok(())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        if full_page {
            self.screenshot_full().await
        } else {
            self.screenshot_viewport().await
        }
    }

    async fn content(&self) -> Result<String> {
        let html = self.eval_js("document.documentElement.outerHTML").await?;
        match html {
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    async fn text(&self, selector: Option<&str>) -> Result<String> {
        let js = match selector {
            Some(sel) => {
                let sel_json = serde_json::to_string(sel)?;
                [
                    "(function() {",
                    Self::find_element_js(),
                    &format!("const el = __findElement({sel_json});"),
                    "return el ? el.innerText : null;",
                    "})()",
                ]
                .join("\n")
            }
            None => "document.body.innerText".to_string(),
        };

        let text = self.eval_js(&js).await?;
        match text {
            Value::String(s) => Ok(s),
            Value::Null => Err(PagepilotError::ElementNotFound(
                selector.unwrap_or("body").to_string(),
            )),
            other => Ok(other.to_string()),
        }
    }

    async fn eval(&self, js: &str) -> Result<Value> {
        self.eval_js(js).await
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let selector_json = serde_json::to_string(selector)?;

        loop {
            let js = [
                "(function() {",
                Self::find_element_js(),
                &format!("return __findElement({selector_json}) !== null;"),
                "})()",
            ]
            .join("\n");
            let found = self.eval_js(&js).await?;

            if found.as_bool().unwrap_or(false) {
                return Ok(());
            }

            if start.elapsed() > timeout {
                return Err(PagepilotError::Timeout(format!(
                    "Element '{}' not found within {}ms",
                    selector, timeout_ms
                )));
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn wait_for_url(&self, pattern: &str, timeout_ms: u64) -> Result<String> {
        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);

        loop {
            let current = self
                .eval_js("document.location.href")
                .await?
                .as_str()
                .unwrap_or("")
                .to_string();

            if wildcard_match(pattern, &current) {
                return Ok(current);
            }

            if start.elapsed() > timeout {
                return Err(PagepilotError::Timeout(format!(
                    "URL did not match '{}' within {}ms",
                    pattern, timeout_ms
                )));
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn select(&self, selector: &str, value: &str, timeout_ms: u64) -> Result<()> {
        self.wait_for_selector(selector, timeout_ms).await?;

        let selector_json = serde_json::to_string(selector)?;
        let value_json = serde_json::to_string(value)?;
        let js = [
            "(function() {",
            Self::find_element_js(),
            &format!("const el = __findElement({selector_json});"),
            "if (!el || el.tagName !== 'SELECT') return false;",
            &format!("el.value = {value_json};"),
            "el.dispatchEvent(new Event('change', { bubbles: true }));",
            "return true;",
            "})()",
        ]
        .join("\n");

        let selected = self.eval_js(&js).await?;
        if !selected.as_bool().unwrap_or(false) {
            return Err(PagepilotError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    async fn set_checked(&self, selector: &str, checked: bool, timeout_ms: u64) -> Result<()> {
        self.wait_for_selector(selector, timeout_ms).await?;

        let selector_json = serde_json::to_string(selector)?;
        let desired = if checked { "true" } else { "false" };
        // Prefer a real click so change handlers fire; fall back to setting
        // the property directly for inputs that intercept clicks.
        let js = [
            "(function() {",
            Self::find_element_js(),
            &format!("const el = __findElement({selector_json});"),
            "if (!el) return null;",
            &format!("const desired = {desired};"),
            "if (el.checked !== desired) { el.click(); }",
            "if (el.checked !== desired) {",
            "    el.checked = desired;",
            "    el.dispatchEvent(new Event('change', { bubbles: true }));",
            "}",
            "return el.checked === desired;",
            "})()",
        ]
        .join("\n");

        let result = self.eval_js(&js).await?;
        match result {
            Value::Null => Err(PagepilotError::ElementNotFound(selector.to_string())),
            other if other.as_bool().unwrap_or(false) => Ok(()),
            _ => Err(PagepilotError::Other(format!(
                "Could not set checked={} on {}",
                checked, selector
            ))),
        }
    }

    async fn hover(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        self.wait_for_selector(selector, timeout_ms).await?;
        let (x, y) = self.element_center(selector).await?;
        self.dispatch_mouse("mouseMoved", x, y, false).await
    }

    async fn press(&self, selector: Option<&str>, key: &str) -> Result<()> {
        if let Some(sel) = selector {
            let sel_json = serde_json::to_string(sel)?;
            let js = [
                "(function() {",
                Self::find_element_js(),
                &format!("const el = __findElement({sel_json});"),
                "if (!el) return false;",
                "el.focus();",
                "return true;",
                "})()",
            ]
            .join("\n");

            let focused = self.eval_js(&js).await?;
            if !focused.as_bool().unwrap_or(false) {
                return Err(PagepilotError::ElementNotFound(sel.to_string()));
            }
        }

        let (key_value, code, text, vk) = key_event_fields(key);
        // Unknown names are sent through as literal key text
        let (key_value, code, text) = if key_value.is_empty() {
            (key, key, key)
        } else {
            (key_value, code, text)
        };

        let mut key_down = serde_json::json!({
            "type": "keyDown",
            "key": key_value,
            "code": code,
            "windowsVirtualKeyCode": vk,
        });
        if !text.is_empty() {
            key_down["text"] = serde_json::json!(text);
        }

        self.send("Input.dispatchKeyEvent", key_down).await?;
        self.send(
            "Input.dispatchKeyEvent",
            serde_json::json!({
                "type": "keyUp",
                "key": key_value,
                "code": code,
                "windowsVirtualKeyCode": vk,
            }),
        )
        .await?;

        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .eval_js("document.location.href")
            .await?
            .as_str()
            .unwrap_or("")
            .to_string())
    }

    async fn title(&self) -> Result<String> {
        Ok(self
            .eval_js("document.title")
            .await?
            .as_str()
            .unwrap_or("")
            .to_string())
    }

    async fn cookies(&self) -> Result<Vec<Value>> {
        let result = self
            .send("Network.getAllCookies", serde_json::json!({}))
            .await?;

        Ok(result
            .get("cookies")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        tracing::info!("Closing browser...");

        if let Some(recorder) = self.recorder.take() {
            recorder.stop().await;
        }
        self.console_task.abort();

        // Best-effort teardown: half-closed handles must not fault shutdown
        if let Err(e) = cdp::send(
            &self.browser_ws_url,
            "Target.disposeBrowserContext",
            serde_json::json!({ "browserContextId": self.context_id }),
        )
        .await
        {
            tracing::debug!("Context dispose failed: {}", e);
        }

        if let Err(e) = self.browser.close().await {
            tracing::debug!("Browser close failed: {}", e);
        }
        self.handler_task.abort();

        if let Err(e) = self.child.kill() {
            tracing::debug!("Browser process already gone: {}", e);
        }
        let _ = self.child.wait();

        Ok(())
    }
}
