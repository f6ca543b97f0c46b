use std::path::PathBuf;

use crate::error::{PagepilotError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserType {
    Chrome,
    Brave,
    Edge,
    Chromium,
}

impl BrowserType {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserType::Chrome => "Google Chrome",
            BrowserType::Brave => "Brave",
            BrowserType::Edge => "Microsoft Edge",
            BrowserType::Chromium => "Chromium",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserInfo {
    pub browser_type: BrowserType,
    pub path: PathBuf,
}

impl BrowserInfo {
    pub fn new(browser_type: BrowserType, path: PathBuf) -> Self {
        Self { browser_type, path }
    }
}

/// Discover the best available browser on the system
pub fn discover_browser() -> Result<BrowserInfo> {
    discover_all_browsers()
        .into_iter()
        .next()
        .ok_or(PagepilotError::BrowserNotFound)
}

/// Discover all available browsers on the system, highest priority first
pub fn discover_all_browsers() -> Vec<BrowserInfo> {
    let mut found = Vec::new();

    for (browser_type, paths) in get_browser_candidates() {
        for path in paths {
            let path = PathBuf::from(path);
            if path.exists() {
                found.push(BrowserInfo::new(browser_type, path));
                break;
            }
        }
    }

    // Fall back to whatever is on PATH
    if found.is_empty() {
        for (browser_type, name) in path_candidates() {
            if let Ok(path) = which::which(name) {
                found.push(BrowserInfo::new(browser_type, path));
                break;
            }
        }
    }

    found
}

fn path_candidates() -> Vec<(BrowserType, &'static str)> {
    vec![
        (BrowserType::Chrome, "google-chrome"),
        (BrowserType::Chrome, "google-chrome-stable"),
        (BrowserType::Chromium, "chromium"),
        (BrowserType::Chromium, "chromium-browser"),
    ]
}

/// Get browser candidates based on the current platform
fn get_browser_candidates() -> Vec<(BrowserType, Vec<&'static str>)> {
    #[cfg(target_os = "macos")]
    {
        vec![
            (
                BrowserType::Chrome,
                vec![
                    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                    "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                ],
            ),
            (
                BrowserType::Brave,
                vec![
                    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
                    "~/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
                ],
            ),
            (
                BrowserType::Edge,
                vec!["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"],
            ),
            (
                BrowserType::Chromium,
                vec!["/Applications/Chromium.app/Contents/MacOS/Chromium"],
            ),
        ]
    }

    #[cfg(target_os = "linux")]
    {
        vec![
            (
                BrowserType::Chrome,
                vec![
                    "/usr/bin/google-chrome",
                    "/usr/bin/google-chrome-stable",
                    "/usr/bin/google-chrome-beta",
                    "/snap/bin/chromium",
                ],
            ),
            (
                BrowserType::Brave,
                vec!["/usr/bin/brave-browser", "/usr/bin/brave"],
            ),
            (
                BrowserType::Edge,
                vec!["/usr/bin/microsoft-edge", "/usr/bin/microsoft-edge-stable"],
            ),
            (
                BrowserType::Chromium,
                vec!["/usr/bin/chromium", "/usr/bin/chromium-browser"],
            ),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            (
                BrowserType::Chrome,
                vec![
                    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                ],
            ),
            (
                BrowserType::Brave,
                vec![
                    r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
                ],
            ),
            (
                BrowserType::Edge,
                vec![
                    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                ],
            ),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        vec![]
    }
}
