use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::time::sleep;

use super::discovery::{discover_browser, BrowserInfo, BrowserType};
use crate::config::Config;
use crate::error::{PagepilotError, Result};

/// Launches a Chromium-family browser with CDP enabled.
pub struct BrowserLauncher {
    browser_info: BrowserInfo,
    cdp_port: u16,
    headless: bool,
    user_data_dir: PathBuf,
}

impl BrowserLauncher {
    /// Create a launcher from the process configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let browser_info = match config.browser.executable {
            Some(ref path) => {
                let path = PathBuf::from(shellexpand::tilde(path).to_string());
                if !path.exists() {
                    return Err(PagepilotError::BrowserLaunchFailed(format!(
                        "Browser not found at: {:?}",
                        path
                    )));
                }
                // Assume Chrome-compatible when the path is explicit
                BrowserInfo::new(BrowserType::Chrome, path)
            }
            None => discover_browser()?,
        };

        Ok(Self {
            browser_info,
            cdp_port: config.browser.cdp_port,
            headless: config.browser.headless,
            user_data_dir: config.user_data_dir(),
        })
    }

    /// Build the browser launch arguments
    fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.cdp_port),
            format!("--user-data-dir={}", self.user_data_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-infobars".to_string(),
            "--window-size=1280,720".to_string(),
        ];

        if self.headless {
            args.push("--headless=new".to_string());
        }

        args
    }

    /// Launch the browser and return the process handle
    fn launch(&self) -> Result<Child> {
        std::fs::create_dir_all(&self.user_data_dir)?;

        let args = self.build_args();

        tracing::debug!(
            "Launching browser: {:?} with args: {:?}",
            self.browser_info.path,
            args
        );

        let child = Command::new(&self.browser_info.path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                PagepilotError::BrowserLaunchFailed(format!(
                    "Failed to launch {}: {}",
                    self.browser_info.browser_type.name(),
                    e
                ))
            })?;

        Ok(child)
    }

    /// Launch the browser and wait for CDP to be ready
    pub async fn launch_and_wait(&self) -> Result<(Child, String)> {
        let child = self.launch()?;
        let cdp_url = self.wait_for_cdp().await?;
        Ok((child, cdp_url))
    }

    /// Wait for the CDP endpoint to expose its browser WebSocket URL
    async fn wait_for_cdp(&self) -> Result<String> {
        let url = format!("http://127.0.0.1:{}/json/version", self.cdp_port);

        // Bypass any configured proxy for localhost
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        // Try for up to 10 seconds
        for i in 0..20 {
            sleep(Duration::from_millis(500)).await;

            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    let json: serde_json::Value = response.json().await.map_err(|e| {
                        PagepilotError::CdpConnectionFailed(format!(
                            "Failed to parse CDP response: {}",
                            e
                        ))
                    })?;

                    if let Some(ws_url) = json.get("webSocketDebuggerUrl").and_then(|v| v.as_str())
                    {
                        tracing::info!("CDP ready at: {}", ws_url);
                        return Ok(ws_url.to_string());
                    }
                }
                Ok(_) => {
                    tracing::debug!("CDP not ready yet (attempt {})", i + 1);
                }
                Err(e) => {
                    tracing::debug!("CDP connection attempt {} failed: {}", i + 1, e);
                }
            }
        }

        Err(PagepilotError::CdpConnectionFailed(
            "Timeout waiting for CDP to be ready".to_string(),
        ))
    }

    pub fn cdp_port(&self) -> u16 {
        self.cdp_port
    }

    pub fn browser_info(&self) -> &BrowserInfo {
        &self.browser_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrowserConfig;

    fn launcher_for_test(headless: bool) -> BrowserLauncher {
        BrowserLauncher {
            browser_info: BrowserInfo::new(BrowserType::Chrome, PathBuf::from("/usr/bin/true")),
            cdp_port: 9400,
            headless,
            user_data_dir: PathBuf::from("/tmp/pagepilot-test-profile"),
        }
    }

    #[test]
    fn headless_adds_the_new_headless_flag() {
        let args = launcher_for_test(true).build_args();
        assert!(args.iter().any(|a| a == "--headless=new"));
    }

    #[test]
    fn visible_mode_omits_headless_flag() {
        let args = launcher_for_test(false).build_args();
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn args_carry_the_configured_cdp_port() {
        let args = launcher_for_test(true).build_args();
        assert!(args.iter().any(|a| a == "--remote-debugging-port=9400"));
    }

    #[test]
    fn from_config_rejects_missing_explicit_executable() {
        let config = Config {
            browser: BrowserConfig {
                executable: Some("/nonexistent/browser".to_string()),
                ..BrowserConfig::default()
            },
            ..Config::default()
        };

        let result = BrowserLauncher::from_config(&config);
        assert!(matches!(
            result,
            Err(PagepilotError::BrowserLaunchFailed(_))
        ));
    }
}
