// Copyright 2025 Newswire Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Pipe transport
//!
//! Newline-delimited JSON-RPC over stdin/stdout for subprocess embedding.
//! The hosting process is the trust boundary: no auth layer, no rate
//! limiting, full permissions. EOF is a clean shutdown, not an error.

use crate::dispatch::RpcDispatcher;
use newswire_core::{CallerContext, Protocol};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub struct StdioAdapter {
    dispatcher: Arc<RpcDispatcher>,
}

impl StdioAdapter {
    pub fn new(dispatcher: Arc<RpcDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Serve the process pipes until stdin closes.
    pub async fn run(&self) -> anyhow::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        serve_lines(&self.dispatcher, stdin, stdout).await
    }
}

/// Pump newline-delimited requests from `reader` to `writer`.
///
/// Generic over the streams so tests can drive it with in-memory pipes.
pub async fn serve_lines<R, W>(
    dispatcher: &RpcDispatcher,
    mut reader: R,
    mut writer: W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = match reader.read_line(&mut line).await {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => 0,
            Err(e) => return Err(e.into()),
        };
        if read == 0 {
            tracing::info!("stdin closed, pipe transport shutting down");
            return Ok(());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let ctx = CallerContext::trusted(Protocol::Stdio);
        let response = match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(value) => dispatcher.dispatch_value(value, ctx).await,
            Err(e) => crate::protocol::JsonRpcResponse::error(
                crate::protocol::JsonRpcId::Null,
                crate::protocol::JsonRpcError::parse_error(format!("Invalid JSON: {e}")),
            ),
        };

        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        if writer.write_all(out.as_bytes()).await.is_err() {
            // Reader side of stdout is gone; same silent shutdown as EOF.
            tracing::info!("stdout closed, pipe transport shutting down");
            return Ok(());
        }
        writer.flush().await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{default_catalog, StaticNewsProvider};
    use std::time::Duration;

    fn dispatcher() -> RpcDispatcher {
        RpcDispatcher::new(Arc::new(default_catalog(
            Arc::new(StaticNewsProvider),
            Duration::from_secs(5),
        )))
    }

    async fn roundtrip(input: &str) -> Vec<serde_json::Value> {
        let d = dispatcher();
        let reader = BufReader::new(input.as_bytes());
        let mut output = Vec::new();
        serve_lines(&d, reader, &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_eof_is_clean_shutdown() {
        let responses = roundtrip("").await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn test_line_per_response() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"ping","id":2}"#,
            "\n",
        );
        let responses = roundtrip(input).await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_blank_lines_skipped() {
        let input = concat!("\n", r#"{"jsonrpc":"2.0","method":"ping","id":7}"#, "\n", "\n");
        let responses = roundtrip(input).await;
        assert_eq!(responses.len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_line_yields_parse_error() {
        let responses = roundtrip("not json at all\n").await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[0]["id"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_trusted_context_can_call_tools() {
        let input = format!(
            "{}\n",
            serde_json::json!({
                "jsonrpc": "2.0",
                "method": "tools/call",
                "params": { "name": "echo", "arguments": { "message": "over the pipe" } },
                "id": 9
            })
        );
        let responses = roundtrip(&input).await;
        assert_eq!(responses[0]["result"]["content"][0]["text"], "over the pipe");
    }
}
