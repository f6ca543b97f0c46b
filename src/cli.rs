use clap::Parser;

use crate::config::Config;
use crate::error::Result;
use crate::repl;
use crate::session::Session;

/// Long-lived browser session driven by JSON commands on stdin.
///
/// Reads one JSON command per line, executes it against a single browser
/// page, and writes one JSON result per line to stdout. Diagnostics go to
/// stderr.
#[derive(Debug, Parser)]
#[command(name = "pagepilot", version, about)]
pub struct Cli {
    /// Show the browser window instead of running headless
    #[arg(long, env = "PAGEPILOT_VISIBLE")]
    pub visible: bool,

    /// Delay before each command, in milliseconds (visible mode only)
    #[arg(long, value_name = "MS", env = "PAGEPILOT_SLOW_MO")]
    pub slow_mo: Option<u64>,

    /// Record the session as screencast frames
    #[arg(long, env = "PAGEPILOT_VIDEO")]
    pub video: bool,

    /// Browser executable to launch instead of auto-discovery
    #[arg(long, value_name = "PATH", env = "PAGEPILOT_BROWSER_PATH")]
    pub browser_path: Option<String>,

    /// DevTools port for the launched browser
    #[arg(long, value_name = "PORT", env = "PAGEPILOT_CDP_PORT")]
    pub cdp_port: Option<u16>,

    /// Directory for screenshots taken without an explicit path
    #[arg(long, value_name = "DIR", env = "PAGEPILOT_SCREENSHOT_DIR")]
    pub screenshot_dir: Option<String>,
}

impl Cli {
    /// Layer command-line flags over the file and environment configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if self.visible {
            config.browser.headless = false;
            // Visible sessions default to a human-followable pace.
            if self.slow_mo.is_none() && config.browser.slow_mo == 0 {
                config.browser.slow_mo = 100;
            }
        }
        if let Some(ms) = self.slow_mo {
            config.browser.slow_mo = ms;
        }
        if self.video {
            config.capture.video = true;
        }
        if let Some(ref path) = self.browser_path {
            config.browser.executable = Some(path.clone());
        }
        if let Some(port) = self.cdp_port {
            config.browser.cdp_port = port;
        }
        if let Some(ref dir) = self.screenshot_dir {
            config.capture.screenshot_dir = Some(dir.clone());
        }
    }

    pub async fn run(&self) -> Result<()> {
        let mut config = Config::load()?;
        self.apply_to(&mut config);

        // No command is read before the browser is up; a launch failure
        // is fatal and exits non-zero.
        let mut session = Session::initialize(&config).await?;
        tracing::info!("Session ready, reading commands from stdin");

        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();

        let result = tokio::select! {
            r = repl::run_loop(&mut session, stdin, stdout) => r,
            _ = repl::shutdown_signal() => {
                tracing::info!("Termination signal received, shutting down");
                Ok(())
            }
        };

        session.shutdown().await;
        result
    }
}
