//! Raw CDP plumbing: one WebSocket connection per command.
//!
//! Each call opens a connection to the target's debugger URL, sends a single
//! CDP command, and reads frames until the matching response arrives.

use futures::SinkExt;
use futures::StreamExt;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{PagepilotError, Result};

/// Send one CDP command to the given debugger WebSocket URL and return
/// the `result` object of the response.
pub async fn send(ws_url: &str, method: &str, params: Value) -> Result<Value> {
    let (mut ws, _) = connect_async(ws_url).await.map_err(|e| {
        PagepilotError::CdpConnectionFailed(format!("WebSocket connection failed: {}", e))
    })?;

    let cmd = serde_json::json!({
        "id": 1,
        "method": method,
        "params": params
    });

    ws.send(Message::Text(cmd.to_string().into()))
        .await
        .map_err(|e| PagepilotError::Other(format!("Failed to send command: {}", e)))?;

    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let response: Value = serde_json::from_str(text.as_str())?;
                if response.get("id") == Some(&serde_json::json!(1)) {
                    if let Some(error) = response.get("error") {
                        return Err(PagepilotError::Other(format!("CDP error: {}", error)));
                    }
                    return Ok(response.get("result").cloned().unwrap_or(Value::Null));
                }
            }
            Ok(_) => continue,
            Err(e) => return Err(PagepilotError::Other(format!("WebSocket error: {}", e))),
        }
    }

    Err(PagepilotError::Other("No response received".to_string()))
}

/// Evaluate a JS expression in the page and return its value.
///
/// Promises are awaited; in-page exceptions surface as `JavaScriptError`.
pub async fn evaluate(ws_url: &str, expression: &str) -> Result<Value> {
    let result = send(
        ws_url,
        "Runtime.evaluate",
        serde_json::json!({
            "expression": expression,
            "returnByValue": true,
            "awaitPromise": true,
        }),
    )
    .await?;

    if let Some(exception) = result.get("exceptionDetails") {
        let msg = exception
            .get("exception")
            .and_then(|e| e.get("description"))
            .or_else(|| exception.get("text"))
            .and_then(|v| v.as_str())
            .unwrap_or("JavaScript exception");
        return Err(PagepilotError::JavaScriptError(msg.to_string()));
    }

    if let Some(inner) = result.get("result") {
        if let Some(value) = inner.get("value") {
            return Ok(value.clone());
        }
        // No plain value (e.g. undefined, or a non-serializable object)
        return Ok(Value::Null);
    }

    Ok(Value::Null)
}
