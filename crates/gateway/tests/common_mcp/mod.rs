#![allow(dead_code)]

use anyhow::Context as _;
use futures::StreamExt as _;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::io::AsyncBufReadExt as _;
use tokio_util::io::StreamReader;

/// Minimal MCP client for the gateway's streamable HTTP endpoint, for integration tests only.
pub struct McpSession {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
}

impl McpSession {
    /// Run the `initialize` handshake against `{base_url}{path}`.
    pub async fn connect(base_url: &str, path: &str) -> anyhow::Result<(Self, Value)> {
        let client = reqwest::Client::new();
        let endpoint = format!("{}{path}", base_url.trim_end_matches('/'));

        let init_resp = post(&client, &endpoint, None, json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "apigate-integration-tests", "version": "0" }
            }
        }))
        .await?;

        let session_id = init_resp
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|h| h.to_str().ok())
            .context("missing Mcp-Session-Id header")?
            .to_string();

        let init = read_first_event_stream_json_message(init_resp).await?;
        anyhow::ensure!(init.get("id") == Some(&json!(0)), "unexpected initialize id");

        let initialized = post(
            &client,
            &endpoint,
            Some(&session_id),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        )
        .await?;
        anyhow::ensure!(
            initialized.status().as_u16() == 202,
            "notifications/initialized returned {}",
            initialized.status()
        );

        Ok((
            Self {
                client,
                endpoint,
                session_id,
            },
            init,
        ))
    }

    pub async fn request(&self, id: u64, method: &str, params: Value) -> anyhow::Result<Value> {
        let resp = post(
            &self.client,
            &self.endpoint,
            Some(&self.session_id),
            json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }),
        )
        .await?;

        tokio::time::timeout(
            Duration::from_secs(10),
            read_first_event_stream_json_message(resp),
        )
        .await
        .context("timeout waiting for event-stream response")?
    }

    /// `tools/list` names, in server order.
    pub async fn tool_names(&self, id: u64) -> anyhow::Result<Vec<String>> {
        let msg = self.request(id, "tools/list", json!({})).await?;
        let tools = msg
            .pointer("/result/tools")
            .and_then(Value::as_array)
            .context("tools/list missing result.tools")?;
        Ok(tools
            .iter()
            .filter_map(|t| t.get("name").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    pub async fn call_tool(&self, id: u64, name: &str, arguments: Value) -> anyhow::Result<Value> {
        self.request(
            id,
            "tools/call",
            json!({ "name": name, "arguments": arguments }),
        )
        .await
    }
}

/// The upstream response body carried by a successful `tools/call` result.
///
/// Reads `structuredContent.body` when present, otherwise parses `content[0].text` as JSON.
pub fn tool_call_body_json(msg: &Value) -> anyhow::Result<Value> {
    let result = msg.get("result").context("tools/call missing result")?;

    if let Some(body) = result.pointer("/structuredContent/body") {
        return Ok(body.clone());
    }

    let text = result
        .pointer("/content/0/text")
        .and_then(Value::as_str)
        .context("tools/call missing result.content[0].text")?;
    serde_json::from_str(text).context("tools/call text is not JSON")
}

async fn post(
    client: &reqwest::Client,
    endpoint: &str,
    session_id: Option<&str>,
    body: Value,
) -> anyhow::Result<reqwest::Response> {
    let mut req = client
        .post(endpoint)
        .header("Accept", "application/json, text/event-stream")
        .header("Content-Type", "application/json")
        .json(&body);

    if let Some(session_id) = session_id {
        req = req.header("Mcp-Session-Id", session_id);
    }

    req.send()
        .await
        .with_context(|| format!("POST {endpoint}"))?
        .error_for_status()
        .with_context(|| format!("POST {endpoint} status"))
}

async fn read_first_event_stream_json_message(resp: reqwest::Response) -> anyhow::Result<Value> {
    let mut stream = resp.bytes_stream();
    let byte_stream = futures::stream::poll_fn(move |cx| stream.poll_next_unpin(cx))
        .map(|r| r.map_err(std::io::Error::other));
    let reader = StreamReader::new(byte_stream);
    let mut lines = tokio::io::BufReader::new(reader).lines();

    let mut data_lines: Vec<String> = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end();
        if line.is_empty() {
            let data = data_lines.join("\n");
            data_lines.clear();
            // Priming events carry no data.
            if data.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(&data).context("parse event-stream data as JSON");
        }
        if let Some(v) = line.strip_prefix("data:") {
            data_lines.push(v.trim().to_string());
        }
    }

    anyhow::bail!("event-stream ended without a JSON message")
}
