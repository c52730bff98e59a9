//! The stdio relay.
//!
//! [`Relay`] reads newline delimited JSON-RPC messages, POSTs each one to the
//! target MCP server through a [`SigningTransport`] and writes the responses
//! back, one message per line. Requests are sent verbatim. Responses are
//! checked to be JSON-RPC and written on a single line. A request the server
//! could not answer with JSON-RPC gets a JSON-RPC error instead.

use std::future::Future;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderValue, StatusCode, Uri};
use http_body_util::Full;
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use sigv4_proxy_core::{Error, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::SigningTransport;

/// Header carrying the MCP session id.
pub const MCP_SESSION_ID: &str = "mcp-session-id";

/// Streamable HTTP servers require both media types in `accept`.
const ACCEPT_STREAM: &str = "application/json, text/event-stream";
const ACCEPT_PREFER_JSON: &str = "application/json, text/event-stream;q=0.5";
const EVENT_STREAM: &str = "text/event-stream";

/// JSON-RPC internal error.
const INTERNAL_ERROR: i64 = -32603;

/// Relay between a line based client and a remote MCP server.
#[derive(Debug)]
pub struct Relay {
    transport: SigningTransport,
    target: Uri,
    enable_sse: bool,
    session_id: Option<HeaderValue>,
}

impl Relay {
    /// Create a relay that sends every message to `target`.
    ///
    /// `text/event-stream` responses are always split into their `data:`
    /// payloads. `enable_sse` only decides whether the server is told that
    /// streams are as welcome as plain JSON.
    pub fn new(transport: SigningTransport, target: Uri, enable_sse: bool) -> Self {
        Self {
            transport,
            target,
            enable_sse,
            session_id: None,
        }
    }

    /// The session id announced by the server, if any.
    pub fn session_id(&self) -> Option<&HeaderValue> {
        self.session_id.as_ref()
    }

    /// Relay messages until `input` is closed or `shutdown` completes.
    ///
    /// Failing to forward a message does not stop the relay. Only failing to
    /// read `input` or to write `output` does.
    pub async fn run<R, W, F>(&mut self, input: R, mut output: W, shutdown: F) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        let mut lines = input.lines();
        tokio::pin!(shutdown);

        loop {
            let line = tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping relay");
                    break;
                }
                line = lines.next_line() => line.map_err(|err| {
                    Error::unexpected("failed to read message from input").with_source(err)
                })?,
            };
            let Some(line) = line else {
                info!("input closed, stopping relay");
                break;
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let messages = match self.forward(line).await {
                Ok(messages) => messages,
                Err(err) => {
                    error!("failed to forward message: {err}");
                    error_response(line, &err.to_string()).into_iter().collect()
                }
            };

            for msg in messages {
                output.write_all(msg.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }
            output.flush().await?;
        }

        Ok(())
    }

    /// Forward one message and return the messages to write back.
    pub async fn forward(&mut self, message: &str) -> Result<Vec<String>> {
        let mut req = http::Request::post(self.target.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, self.accept());
        if let Some(id) = &self.session_id {
            req = req.header(MCP_SESSION_ID, id.clone());
        }
        let req = req.body(Full::new(Bytes::copy_from_slice(message.as_bytes())))?;

        let resp = self.transport.execute(req).await?;
        let (parts, body) = resp.into_parts();

        if let Some(id) = parts.headers.get(MCP_SESSION_ID) {
            if self.session_id.as_ref() != Some(id) {
                debug!("target MCP server assigned session {id:?}");
                self.session_id = Some(id.clone());
            }
        }

        let status = parts.status;
        if !status.is_success() {
            warn!(
                "target MCP server responded with {status}: {}",
                String::from_utf8_lossy(&body)
            );
        }
        if status == StatusCode::ACCEPTED || body.is_empty() {
            if status.is_success() {
                return Ok(Vec::new());
            }
            let reason = format!("target MCP server responded with {status}");
            return Ok(error_response(message, &reason).into_iter().collect());
        }

        let is_event_stream = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_start().starts_with(EVENT_STREAM))
            .unwrap_or_default();
        let body = String::from_utf8_lossy(&body);
        let payloads = if is_event_stream {
            event_data(&body)
        } else {
            vec![body.into_owned()]
        };

        let mut messages = Vec::with_capacity(payloads.len());
        let mut rejected = None;
        for payload in payloads {
            match single_line_message(&payload) {
                Some(msg) => messages.push(msg),
                None => {
                    warn!("target MCP server sent a non JSON-RPC payload: {payload}");
                    if rejected.is_none() {
                        rejected = Some(payload);
                    }
                }
            }
        }

        if messages.is_empty() {
            if let Some(payload) = rejected {
                let reason = format!(
                    "target MCP server responded with {status}: {}",
                    payload.trim()
                );
                return Ok(error_response(message, &reason).into_iter().collect());
            }
        }
        Ok(messages)
    }

    fn accept(&self) -> &'static str {
        if self.enable_sse {
            ACCEPT_STREAM
        } else {
            ACCEPT_PREFER_JSON
        }
    }
}

/// Return `payload` as a one line JSON-RPC message.
///
/// Single line payloads are kept verbatim, others are compacted. Anything
/// that is not a JSON-RPC object or batch yields `None`.
fn single_line_message(payload: &str) -> Option<String> {
    let payload = payload.trim();
    let value: Value = serde_json::from_str(payload).ok()?;
    let is_jsonrpc = match &value {
        Value::Object(obj) => obj.contains_key("jsonrpc"),
        Value::Array(batch) => !batch.is_empty() && batch.iter().all(|v| v.get("jsonrpc").is_some()),
        _ => false,
    };
    if !is_jsonrpc {
        return None;
    }

    if payload.contains(['\r', '\n']) {
        Some(value.to_string())
    } else {
        Some(payload.to_string())
    }
}

/// Collect the `data` of every event in an SSE stream.
///
/// Multiple `data:` lines of one event are joined with `\n`. Events without
/// data are skipped.
fn event_data(stream: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut data: Vec<&str> = Vec::new();

    for line in stream.lines() {
        if line.is_empty() {
            if !data.is_empty() {
                events.push(data.join("\n"));
                data.clear();
            }
            continue;
        }
        if let Some(v) = line.strip_prefix("data:") {
            data.push(v.strip_prefix(' ').unwrap_or(v));
        }
    }
    if !data.is_empty() {
        events.push(data.join("\n"));
    }

    events
}

/// Build the JSON-RPC error answering `message`.
///
/// Returns `None` for notifications and anything else that expects no
/// response.
fn error_response(message: &str, reason: &str) -> Option<String> {
    let msg: Value = serde_json::from_str(message).ok()?;
    let id = msg.get("id").filter(|v| !v.is_null())?;
    msg.get("method")?;

    Some(
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": INTERNAL_ERROR,
                "message": reason,
            },
        })
        .to_string(),
    )
}
