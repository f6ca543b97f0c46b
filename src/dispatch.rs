use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::actions::{self, Action};
use crate::browser::BrowserBackend;
use crate::error::{PagepilotError, Result};
use crate::protocol::{Command, Outcome};
use crate::session::Session;

const DEFAULT_INTERACTION_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CONTENT_MAX_LEN: usize = 10_000;
const DEFAULT_TEXT_MAX_LEN: usize = 5_000;

/// Execute one command against the session and produce its outcome.
///
/// Never faults the loop: every failure, including unknown actions and
/// missing parameters, comes back as a failed `Outcome` and the session
/// stays usable for the next line.
pub async fn dispatch<B: BrowserBackend>(session: &mut Session<B>, cmd: &Command) -> Outcome {
    let Some(action) = actions::resolve(&cmd.action) else {
        return Outcome::fail(format!("Unknown action: {}", cmd.action));
    };

    if session.slow_mo() > Duration::ZERO {
        tokio::time::sleep(session.slow_mo()).await;
    }

    match run(session, action, cmd).await {
        Ok(outcome) => outcome,
        Err(e) => Outcome::fail(e.to_string()),
    }
}

async fn run<B: BrowserBackend>(
    session: &mut Session<B>,
    action: Action,
    cmd: &Command,
) -> Result<Outcome> {
    if action == Action::Close {
        session.shutdown().await;
        return Ok(Outcome::ok().with("closed", true));
    }

    let Some(backend) = session.backend() else {
        return Ok(Outcome::fail("Session is closed"));
    };

    let timeout = cmd.timeout.unwrap_or(DEFAULT_INTERACTION_TIMEOUT_MS);

    let outcome = match action {
        Action::Navigate => {
            let url = require(cmd.url.as_deref(), "url", &cmd.action)?;
            let (url, title) = backend.navigate(url).await?;
            Outcome::ok().with("url", url).with("title", title)
        }

        Action::Click => {
            let selector = require(cmd.selector.as_deref(), "selector", &cmd.action)?;
            backend.click(selector, timeout).await?;
            Outcome::ok().with("clicked", selector)
        }

        Action::Fill => {
            let selector = require(cmd.selector.as_deref(), "selector", &cmd.action)?;
            let value = require(cmd.value.as_deref(), "value", &cmd.action)?;
            backend.fill(selector, value, timeout).await?;
            Outcome::ok().with("filled", selector)
        }

        Action::Screenshot => {
            let full_page = cmd.full_page.unwrap_or(true);
            let path = match &cmd.path {
                Some(p) => PathBuf::from(p),
                None => synthesized_screenshot_path(session.screenshot_dir()),
            };

            let bytes = backend.screenshot(full_page).await?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, bytes)?;
            Outcome::ok().with("path", path.to_string_lossy().to_string())
        }

        Action::Content => {
            let content = backend.content().await?;
            let max = cmd.max_length.unwrap_or(DEFAULT_CONTENT_MAX_LEN);
            let length = content.chars().count();
            Outcome::ok()
                .with("content", truncate(&content, max))
                .with("length", length as u64)
        }

        Action::Text => {
            let text = backend.text(cmd.selector.as_deref()).await?;
            let max = cmd.max_length.unwrap_or(DEFAULT_TEXT_MAX_LEN);
            let length = text.chars().count();
            Outcome::ok()
                .with("text", truncate(&text, max))
                .with("length", length as u64)
        }

        Action::Eval => {
            let js = require(cmd.js.as_deref(), "js", &cmd.action)?;
            let value = backend.eval(js).await?;
            Outcome::ok().with("result", value)
        }

        // Polymorphic: selector wait wins over fixed delay over URL pattern.
        Action::Wait => {
            if let Some(selector) = &cmd.selector {
                let timeout = cmd.timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
                backend.wait_for_selector(selector, timeout).await?;
                Outcome::ok().with("found", selector.clone())
            } else if let Some(ms) = cmd.ms {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Outcome::ok().with("waited", ms)
            } else if let Some(pattern) = &cmd.url {
                let timeout = cmd.timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
                let url = backend.wait_for_url(pattern, timeout).await?;
                Outcome::ok().with("url", url)
            } else {
                Outcome::fail("wait requires one of: selector, ms, url")
            }
        }

        Action::Select => {
            let selector = require(cmd.selector.as_deref(), "selector", &cmd.action)?;
            let value = require(cmd.value.as_deref(), "value", &cmd.action)?;
            backend.select(selector, value, timeout).await?;
            Outcome::ok().with("selected", value)
        }

        Action::Check => {
            let selector = require(cmd.selector.as_deref(), "selector", &cmd.action)?;
            backend.set_checked(selector, true, timeout).await?;
            Outcome::ok().with("checked", selector)
        }

        Action::Uncheck => {
            let selector = require(cmd.selector.as_deref(), "selector", &cmd.action)?;
            backend.set_checked(selector, false, timeout).await?;
            Outcome::ok().with("unchecked", selector)
        }

        Action::Hover => {
            let selector = require(cmd.selector.as_deref(), "selector", &cmd.action)?;
            backend.hover(selector, timeout).await?;
            Outcome::ok().with("hovered", selector)
        }

        Action::Press => {
            let key = require(cmd.key.as_deref(), "key", &cmd.action)?;
            backend.press(cmd.selector.as_deref(), key).await?;
            Outcome::ok().with("pressed", key)
        }

        Action::Url => Outcome::ok().with("url", backend.current_url().await?),

        Action::Title => Outcome::ok().with("title", backend.title().await?),

        Action::Cookies => {
            let cookies = backend.cookies().await?;
            Outcome::ok().with("cookies", Value::Array(cookies))
        }

        Action::Close => unreachable!("handled before backend lookup"),
    };

    Ok(outcome)
}

fn require<'a>(value: Option<&'a str>, field: &str, action: &str) -> Result<&'a str> {
    value.ok_or_else(|| {
        PagepilotError::Other(format!("Missing required field '{field}' for action '{action}'"))
    })
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn synthesized_screenshot_path(dir: &Path) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    dir.join(format!("screenshot-{millis}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockBackend;
    use crate::session::Status;

    fn command(json: &str) -> Command {
        serde_json::from_str(json).unwrap()
    }

    fn session_with(backend: MockBackend) -> Session<MockBackend> {
        Session::with_backend(backend, std::env::temp_dir())
    }

    #[tokio::test]
    async fn unknown_action_fails_without_touching_the_backend() {
        let backend = MockBackend::new();
        let calls = backend.calls.clone();
        let mut session = session_with(backend);

        let out = dispatch(&mut session, &command(r#"{"action":"teleport"}"#)).await;

        assert!(!out.success);
        assert_eq!(out.error.as_deref(), Some("Unknown action: teleport"));
        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(session.status(), Status::Ready);
    }

    #[tokio::test]
    async fn navigate_returns_url_and_title() {
        let mut session = session_with(MockBackend::new());

        let out = dispatch(
            &mut session,
            &command(r#"{"action":"navigate","url":"https://example.com"}"#),
        )
        .await;

        assert!(out.success);
        assert_eq!(out.fields["url"], "https://example.com");
        assert_eq!(out.fields["title"], "Mock Page");
    }

    #[tokio::test]
    async fn navigate_without_url_fails() {
        let mut session = session_with(MockBackend::new());

        let out = dispatch(&mut session, &command(r#"{"action":"goto"}"#)).await;

        assert!(!out.success);
        assert!(out.error.unwrap().contains("url"));
    }

    #[tokio::test]
    async fn click_uses_the_default_timeout() {
        let backend = MockBackend::new();
        let calls = backend.calls.clone();
        let mut session = session_with(backend);

        let out = dispatch(&mut session, &command(r##"{"action":"click","selector":"#go"}"##)).await;

        assert!(out.success);
        assert_eq!(out.fields["clicked"], "#go");
        assert_eq!(calls.lock().unwrap()[0], "click #go 5000");
    }

    #[tokio::test]
    async fn explicit_timeout_overrides_the_default() {
        let backend = MockBackend::new();
        let calls = backend.calls.clone();
        let mut session = session_with(backend);

        dispatch(
            &mut session,
            &command(r##"{"action":"click","selector":"#go","timeout":250}"##),
        )
        .await;

        assert_eq!(calls.lock().unwrap()[0], "click #go 250");
    }

    #[tokio::test]
    async fn fill_alias_type_reaches_the_backend() {
        let backend = MockBackend::new();
        let calls = backend.calls.clone();
        let mut session = session_with(backend);

        let out = dispatch(
            &mut session,
            &command(r##"{"action":"type","selector":"#name","value":"alice"}"##),
        )
        .await;

        assert!(out.success);
        assert_eq!(out.fields["filled"], "#name");
        assert_eq!(calls.lock().unwrap()[0], "fill #name=alice 5000");
    }

    #[tokio::test]
    async fn screenshot_writes_a_file_and_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut session =
            Session::with_backend(MockBackend::new(), dir.path().to_path_buf());

        let out = dispatch(&mut session, &command(r#"{"action":"screenshot"}"#)).await;

        assert!(out.success);
        let path = PathBuf::from(out.fields["path"].as_str().unwrap());
        assert!(path.starts_with(dir.path()));
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn screenshot_honors_an_explicit_path_and_full_page_flag() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("shots/custom.png");
        let backend = MockBackend::new();
        let calls = backend.calls.clone();
        let mut session = session_with(backend);

        let cmd_json = format!(
            r#"{{"action":"ss","path":"{}","fullPage":false}}"#,
            target.display()
        );
        let out = dispatch(&mut session, &command(&cmd_json)).await;

        assert!(out.success);
        assert!(target.exists());
        assert_eq!(calls.lock().unwrap()[0], "screenshot full_page=false");
    }

    #[tokio::test]
    async fn content_truncates_but_reports_the_full_length() {
        let mut session = session_with(MockBackend::new());

        let out = dispatch(
            &mut session,
            &command(r#"{"action":"content","maxLength":5}"#),
        )
        .await;

        assert!(out.success);
        assert_eq!(out.fields["content"], "<html");
        assert_eq!(
            out.fields["length"],
            "<html><body>hello world</body></html>".len() as u64
        );
    }

    #[tokio::test]
    async fn text_defaults_to_the_body() {
        let backend = MockBackend::new();
        let calls = backend.calls.clone();
        let mut session = session_with(backend);

        let out = dispatch(&mut session, &command(r#"{"action":"text"}"#)).await;

        assert!(out.success);
        assert_eq!(out.fields["text"], "hello world");
        assert_eq!(out.fields["length"], 11);
        assert_eq!(calls.lock().unwrap()[0], "text body");
    }

    #[tokio::test]
    async fn eval_returns_the_value_verbatim() {
        let mut session = session_with(MockBackend::new());

        let out = dispatch(&mut session, &command(r#"{"action":"eval","js":"6*7"}"#)).await;

        assert!(out.success);
        assert_eq!(out.fields["result"], 42);
    }

    #[tokio::test]
    async fn eval_without_js_fails() {
        let mut session = session_with(MockBackend::new());

        let out = dispatch(&mut session, &command(r#"{"action":"evaluate"}"#)).await;

        assert!(!out.success);
        assert!(out.error.unwrap().contains("js"));
    }

    #[tokio::test]
    async fn wait_prefers_selector_over_ms_and_url() {
        let backend = MockBackend::new();
        let calls = backend.calls.clone();
        let mut session = session_with(backend);

        let out = dispatch(
            &mut session,
            &command(r##"{"action":"wait","selector":"#done","ms":1,"url":"*x*"}"##),
        )
        .await;

        assert!(out.success);
        assert_eq!(out.fields["found"], "#done");
        assert_eq!(calls.lock().unwrap()[0], "wait_for_selector #done 10000");
    }

    #[tokio::test]
    async fn wait_with_ms_sleeps_and_reports_the_duration() {
        let mut session = session_with(MockBackend::new());

        let out = dispatch(&mut session, &command(r#"{"action":"wait","ms":5}"#)).await;

        assert!(out.success);
        assert_eq!(out.fields["waited"], 5);
    }

    #[tokio::test]
    async fn wait_with_url_pattern_returns_the_matched_url() {
        let mut session = session_with(MockBackend::new());

        let out = dispatch(
            &mut session,
            &command(r#"{"action":"wait","url":"*dashboard*"}"#),
        )
        .await;

        assert!(out.success);
        assert_eq!(out.fields["url"], "matcheddashboardmatched");
    }

    #[tokio::test]
    async fn wait_with_no_condition_fails() {
        let mut session = session_with(MockBackend::new());

        let out = dispatch(&mut session, &command(r#"{"action":"wait"}"#)).await;

        assert!(!out.success);
        assert!(out.error.unwrap().contains("selector, ms, url"));
    }

    #[tokio::test]
    async fn check_and_uncheck_flip_the_checked_flag() {
        let backend = MockBackend::new();
        let calls = backend.calls.clone();
        let mut session = session_with(backend);

        dispatch(&mut session, &command(r##"{"action":"check","selector":"#a"}"##)).await;
        dispatch(&mut session, &command(r##"{"action":"uncheck","selector":"#a"}"##)).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], "set_checked #a=true 5000");
        assert_eq!(calls[1], "set_checked #a=false 5000");
    }

    #[tokio::test]
    async fn press_without_selector_targets_the_body() {
        let backend = MockBackend::new();
        let calls = backend.calls.clone();
        let mut session = session_with(backend);

        let out = dispatch(&mut session, &command(r#"{"action":"press","key":"Enter"}"#)).await;

        assert!(out.success);
        assert_eq!(out.fields["pressed"], "Enter");
        assert_eq!(calls.lock().unwrap()[0], "press body Enter");
    }

    #[tokio::test]
    async fn cookies_come_back_as_an_array() {
        let mut session = session_with(MockBackend::new());

        let out = dispatch(&mut session, &command(r#"{"action":"cookies"}"#)).await;

        assert!(out.success);
        assert!(out.fields["cookies"].is_array());
        assert_eq!(out.fields["cookies"][0]["name"], "sid");
    }

    #[tokio::test]
    async fn close_shuts_the_session_down() {
        let backend = MockBackend::new();
        let shutdowns = backend.shutdowns.clone();
        let mut session = session_with(backend);

        let out = dispatch(&mut session, &command(r#"{"action":"close"}"#)).await;

        assert!(out.success);
        assert_eq!(out.fields["closed"], true);
        assert_eq!(session.status(), Status::Closed);
        assert_eq!(*shutdowns.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn close_aliases_behave_identically() {
        for alias in ["quit", "exit"] {
            let mut session = session_with(MockBackend::new());
            let out =
                dispatch(&mut session, &command(&format!(r#"{{"action":"{alias}"}}"#))).await;
            assert!(out.success);
            assert_eq!(out.fields["closed"], true);
            assert_eq!(session.status(), Status::Closed);
        }
    }

    #[tokio::test]
    async fn commands_after_close_fail_cleanly() {
        let mut session = session_with(MockBackend::new());
        dispatch(&mut session, &command(r#"{"action":"close"}"#)).await;

        let out = dispatch(&mut session, &command(r#"{"action":"title"}"#)).await;

        assert!(!out.success);
        assert_eq!(out.error.as_deref(), Some("Session is closed"));
    }

    #[tokio::test]
    async fn backend_errors_surface_as_failed_outcomes() {
        let mut session = session_with(MockBackend::failing("element vanished"));

        let out = dispatch(
            &mut session,
            &command(r##"{"action":"click","selector":"#gone"}"##),
        )
        .await;

        assert!(!out.success);
        assert!(out.error.unwrap().contains("element vanished"));
        // Failure does not close the session.
        assert_eq!(session.status(), Status::Ready);
    }
}
