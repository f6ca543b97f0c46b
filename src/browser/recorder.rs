use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{PagepilotError, Result};

/// Records the session page as a sequence of screencast frames.
///
/// CDP has no container-format video output; frames arrive as base64 PNGs
/// via `Page.screencastFrame` and are written as numbered files under the
/// video directory. Each frame must be acked or Chrome stops sending.
pub struct ScreencastRecorder {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    dir: PathBuf,
}

impl ScreencastRecorder {
    /// Start recording frames from the given page debugger URL.
    pub async fn start(page_ws_url: String, dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let frame_dir = dir.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = record(&page_ws_url, &frame_dir, stop_rx).await {
                tracing::warn!("Screencast recording ended early: {}", e);
            }
        });

        tracing::info!("Recording screencast frames to {}", dir.display());

        Ok(Self {
            stop_tx: Some(stop_tx),
            task,
            dir,
        })
    }

    /// Stop the screencast and wait for pending frame writes to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(2), self.task).await;
        tracing::info!("Screencast frames saved under {}", self.dir.display());
    }
}

async fn record(ws_url: &str, dir: &Path, mut stop_rx: oneshot::Receiver<()>) -> Result<()> {
    let (mut ws, _) = connect_async(ws_url).await.map_err(|e| {
        PagepilotError::CdpConnectionFailed(format!("WebSocket connection failed: {}", e))
    })?;

    let start = serde_json::json!({
        "id": 1,
        "method": "Page.startScreencast",
        "params": { "format": "png", "everyNthFrame": 2 }
    });
    ws.send(Message::Text(start.to_string().into()))
        .await
        .map_err(|e| PagepilotError::Other(format!("Failed to start screencast: {}", e)))?;

    let mut frame_no: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                let stop = serde_json::json!({
                    "id": 2,
                    "method": "Page.stopScreencast",
                    "params": {}
                });
                let _ = ws.send(Message::Text(stop.to_string().into())).await;
                break;
            }
            msg = ws.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!("Screencast socket error: {}", e);
                        break;
                    }
                    None => break,
                };

                let event: Value = match serde_json::from_str(text.as_str()) {
                    Ok(v) => v,
                    Err(_) => continue,
                };

                if event.get("method").and_then(|m| m.as_str()) != Some("Page.screencastFrame") {
                    continue;
                }

                let params = &event["params"];
                if let Some(data) = params.get("data").and_then(|v| v.as_str()) {
                    match base64::engine::general_purpose::STANDARD.decode(data) {
                        Ok(bytes) => {
                            let path = dir.join(format!("frame-{:06}.png", frame_no));
                            if let Err(e) = std::fs::write(&path, bytes) {
                                tracing::warn!("Failed to write frame {}: {}", frame_no, e);
                            }
                            frame_no += 1;
                        }
                        Err(e) => tracing::debug!("Bad frame payload: {}", e),
                    }
                }

                // Ack or Chrome stops delivering frames
                if let Some(session_id) = params.get("sessionId") {
                    let ack = serde_json::json!({
                        "id": 100 + frame_no,
                        "method": "Page.screencastFrameAck",
                        "params": { "sessionId": session_id }
                    });
                    let _ = ws.send(Message::Text(ack.to_string().into())).await;
                }
            }
        }
    }

    Ok(())
}
