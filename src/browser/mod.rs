mod cdp;
mod discovery;
mod driver;
mod launcher;
mod recorder;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

#[allow(unused_imports)]
pub use discovery::{discover_all_browsers, discover_browser, BrowserInfo, BrowserType};
pub use driver::PageDriver;
pub use launcher::BrowserLauncher;

/// The browser capability the dispatcher drives.
///
/// One implementation talks CDP to a real browser; tests substitute a mock.
/// Every method operates on the session's single page.
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    /// Navigate and wait until the DOM is parsed (not full load).
    /// Returns the resulting URL and page title.
    async fn navigate(&self, url: &str) -> Result<(String, String)>;

    async fn click(&self, selector: &str, timeout_ms: u64) -> Result<()>;

    /// Clear the element and set its value.
    async fn fill(&self, selector: &str, value: &str, timeout_ms: u64) -> Result<()>;

    /// Capture the page as PNG bytes.
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;

    /// Full page HTML, untruncated.
    async fn content(&self) -> Result<String>;

    /// Inner text of the selector, or of `body` when none is given.
    async fn text(&self, selector: Option<&str>) -> Result<String>;

    /// Evaluate JS in the page and return its value verbatim.
    async fn eval(&self, js: &str) -> Result<Value>;

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()>;

    /// Wait until the page URL matches the pattern (`*` wildcards allowed).
    /// Returns the matching URL.
    async fn wait_for_url(&self, pattern: &str, timeout_ms: u64) -> Result<String>;

    async fn select(&self, selector: &str, value: &str, timeout_ms: u64) -> Result<()>;

    async fn set_checked(&self, selector: &str, checked: bool, timeout_ms: u64) -> Result<()>;

    async fn hover(&self, selector: &str, timeout_ms: u64) -> Result<()>;

    /// Press a keyboard key, optionally focusing a selector first.
    async fn press(&self, selector: Option<&str>, key: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn cookies(&self) -> Result<Vec<Value>>;

    /// Tear down the browser resources. Must be idempotent and best-effort:
    /// errors from half-closed handles are swallowed.
    async fn shutdown(&mut self) -> Result<()>;
}
