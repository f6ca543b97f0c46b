use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::browser::BrowserBackend;
use crate::dispatch::dispatch;
use crate::error::Result;
use crate::protocol::{Command, Outcome};
use crate::session::{Session, Status};

/// Drive the session from a line-oriented command stream.
///
/// One JSON command per input line, one JSON outcome per output line, in
/// order. Blank lines are skipped. Lines that fail to parse produce a failed
/// outcome and the loop continues. The loop ends when a close command moves
/// the session to `Closed` or the input reaches end-of-stream; either way the
/// session is shut down before returning.
pub async fn run_loop<B, R, W>(session: &mut Session<B>, reader: R, mut writer: W) -> Result<()>
where
    B: BrowserBackend,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let started = Instant::now();
        let mut outcome = match serde_json::from_str::<Command>(line) {
            Ok(cmd) => {
                tracing::info!(action = %cmd.action, "command received");
                dispatch(session, &cmd).await
            }
            Err(e) => Outcome::fail(format!("Parse error: {e}")),
        };
        outcome.duration = started.elapsed().as_millis() as u64;

        let mut buf = serde_json::to_vec(&outcome)?;
        buf.push(b'\n');
        writer.write_all(&buf).await?;
        writer.flush().await?;

        if session.status() == Status::Closed {
            break;
        }
    }

    // End-of-stream behaves like an explicit close.
    session.shutdown().await;
    Ok(())
}

/// Resolves when the process receives a termination signal.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Failed to install SIGINT handler: {}", e);
                return std::future::pending().await;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received ctrl-c");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::MockBackend;

    async fn run_lines(backend: MockBackend, input: &str) -> (Vec<serde_json::Value>, Status) {
        let mut session = Session::with_backend(backend, std::env::temp_dir());
        let mut out = std::io::Cursor::new(Vec::new());

        run_loop(&mut session, input.as_bytes(), &mut out)
            .await
            .unwrap();

        let outcomes = String::from_utf8(out.into_inner())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (outcomes, session.status())
    }

    #[tokio::test]
    async fn outcomes_come_back_one_per_line_in_input_order() {
        let input = concat!(
            r#"{"action":"navigate","url":"https://a.test"}"#,
            "\n",
            r#"{"action":"title"}"#,
            "\n",
            r#"{"action":"url"}"#,
            "\n",
        );

        let (outcomes, _) = run_lines(MockBackend::new(), input).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0]["url"], "https://a.test");
        assert_eq!(outcomes[1]["title"], "Example Domain");
        assert_eq!(outcomes[2]["url"], "https://example.com/");
    }

    #[tokio::test]
    async fn blank_lines_are_skipped_silently() {
        let input = "\n   \n{\"action\":\"title\"}\n\n";

        let (outcomes, _) = run_lines(MockBackend::new(), input).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0]["success"], true);
    }

    #[tokio::test]
    async fn malformed_json_produces_a_parse_error_outcome() {
        let input = "{not json}\n{\"action\":\"title\"}\n";

        let (outcomes, _) = run_lines(MockBackend::new(), input).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0]["success"], false);
        assert!(outcomes[0]["error"]
            .as_str()
            .unwrap()
            .starts_with("Parse error:"));
        // The loop recovered and served the next command.
        assert_eq!(outcomes[1]["success"], true);
    }

    #[tokio::test]
    async fn unknown_action_does_not_stop_the_loop() {
        let input = "{\"action\":\"teleport\"}\n{\"action\":\"title\"}\n";

        let (outcomes, status) = run_lines(MockBackend::new(), input).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0]["error"], "Unknown action: teleport");
        assert_eq!(outcomes[1]["success"], true);
        assert_eq!(status, Status::Closed);
    }

    #[tokio::test]
    async fn close_emits_its_outcome_then_stops_reading() {
        let input = "{\"action\":\"close\"}\n{\"action\":\"title\"}\n";

        let (outcomes, status) = run_lines(MockBackend::new(), input).await;

        // The line after close is never processed.
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0]["closed"], true);
        assert_eq!(status, Status::Closed);
    }

    #[tokio::test]
    async fn eof_shuts_the_session_down_exactly_once() {
        let backend = MockBackend::new();
        let shutdowns = backend.shutdowns.clone();

        let (_, status) = run_lines(backend, "{\"action\":\"title\"}\n").await;

        assert_eq!(status, Status::Closed);
        assert_eq!(*shutdowns.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn explicit_close_then_eof_does_not_shut_down_twice() {
        let backend = MockBackend::new();
        let shutdowns = backend.shutdowns.clone();

        run_lines(backend, "{\"action\":\"close\"}\n").await;

        assert_eq!(*shutdowns.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn every_outcome_carries_a_duration() {
        let input = "{\"action\":\"wait\",\"ms\":2}\nnot json\n";

        let (outcomes, _) = run_lines(MockBackend::new(), input).await;

        for outcome in &outcomes {
            assert!(outcome["duration"].is_u64());
        }
    }
}
