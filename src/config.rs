use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{PagepilotError, Result};

/// Main configuration structure, fixed at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Browser launch configuration
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Screenshot and video output configuration
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Browser executable path (overrides auto-discovery)
    pub executable: Option<String>,

    /// Run without a visible window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Artificial delay before each command, in milliseconds.
    /// Only applied when the browser is visible.
    #[serde(default)]
    pub slow_mo: u64,

    /// CDP port the browser is launched with
    #[serde(default = "default_cdp_port")]
    pub cdp_port: u16,

    /// User data directory for the browser profile
    pub user_data_dir: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: default_headless(),
            slow_mo: 0,
            cdp_port: default_cdp_port(),
            user_data_dir: None,
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_cdp_port() -> u16 {
    9222
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Record the session as screencast frames
    #[serde(default)]
    pub video: bool,

    /// Directory for screenshots taken without an explicit path
    pub screenshot_dir: Option<String>,

    /// Directory for recorded screencast frames
    pub video_dir: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            video: false,
            screenshot_dir: None,
            video_dir: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from all sources (defaults, file, env).
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            // Environment variables use double underscores between sections,
            // e.g. PAGEPILOT_BROWSER__HEADLESS=false
            .merge(Env::prefixed("PAGEPILOT_").split("__"))
            .extract()
            .map_err(|e| PagepilotError::ConfigError(e.to_string()))?;

        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pagepilot")
            .join("config.toml")
    }

    fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pagepilot")
    }

    /// Directory screenshots land in when a command gives no path.
    pub fn screenshot_dir(&self) -> PathBuf {
        match self.capture.screenshot_dir {
            Some(ref dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => Self::data_dir().join("screenshots"),
        }
    }

    /// Directory recorded screencast frames land in.
    pub fn video_dir(&self) -> PathBuf {
        match self.capture.video_dir {
            Some(ref dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => Self::data_dir().join("videos"),
        }
    }

    /// User data directory for the launched browser profile.
    pub fn user_data_dir(&self) -> PathBuf {
        match self.browser.user_data_dir {
            Some(ref dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => Self::data_dir().join("profile"),
        }
    }
}
