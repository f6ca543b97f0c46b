use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::browser::{BrowserBackend, PageDriver};
use crate::config::Config;
use crate::error::Result;

/// Lifecycle status of a session. Transitions are one-directional:
/// Uninitialized -> Ready -> Closed, and Closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Uninitialized,
    Ready,
    Closed,
}

/// One running session: exactly one browser, one context, one page,
/// exclusively owned by the protocol loop.
///
/// The backend is present exactly while the status is `Ready`.
pub struct Session<B: BrowserBackend> {
    status: Status,
    backend: Option<B>,
    screenshot_dir: PathBuf,
    slow_mo: Duration,
}

impl Session<PageDriver> {
    /// Launch the browser and bring the session to `Ready`.
    ///
    /// A launch failure here is fatal to the process; the protocol loop
    /// never starts.
    pub async fn initialize(config: &Config) -> Result<Self> {
        let mut session = Self {
            status: Status::Uninitialized,
            backend: None,
            screenshot_dir: config.screenshot_dir(),
            // Slow-motion only applies when the browser is visible
            slow_mo: if config.browser.headless {
                Duration::ZERO
            } else {
                Duration::from_millis(config.browser.slow_mo)
            },
        };

        let driver = PageDriver::launch(config).await?;
        session.backend = Some(driver);
        session.status = Status::Ready;
        Ok(session)
    }
}

impl<B: BrowserBackend> Session<B> {
    /// Build a ready session around an existing backend.
    pub fn with_backend(backend: B, screenshot_dir: PathBuf) -> Self {
        Self {
            status: Status::Ready,
            backend: Some(backend),
            screenshot_dir,
            slow_mo: Duration::ZERO,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn screenshot_dir(&self) -> &Path {
        &self.screenshot_dir
    }

    pub fn slow_mo(&self) -> Duration {
        self.slow_mo
    }

    /// Tear the session down. Safe to call any number of times; errors from
    /// the backend are logged and suppressed so shutdown never faults the
    /// process.
    pub async fn shutdown(&mut self) {
        if self.status == Status::Closed {
            return;
        }

        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = backend.shutdown().await {
                tracing::warn!("Error during shutdown (suppressed): {}", e);
            }
        }
        self.status = Status::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockBackend;

    #[tokio::test]
    async fn session_starts_ready_with_a_backend() {
        let session = Session::with_backend(MockBackend::new(), PathBuf::from("/tmp"));
        assert_eq!(session.status(), Status::Ready);
        assert!(session.backend().is_some());
    }

    #[tokio::test]
    async fn shutdown_moves_to_closed_and_drops_the_backend() {
        let backend = MockBackend::new();
        let shutdowns = backend.shutdowns.clone();
        let mut session = Session::with_backend(backend, PathBuf::from("/tmp"));

        session.shutdown().await;

        assert_eq!(session.status(), Status::Closed);
        assert!(session.backend().is_none());
        assert_eq!(*shutdowns.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let backend = MockBackend::new();
        let shutdowns = backend.shutdowns.clone();
        let mut session = Session::with_backend(backend, PathBuf::from("/tmp"));

        session.shutdown().await;
        session.shutdown().await;
        session.shutdown().await;

        assert_eq!(session.status(), Status::Closed);
        assert_eq!(*shutdowns.lock().unwrap(), 1);
    }
}
