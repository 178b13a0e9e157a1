//! Unix socket client for the vigild control socket.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::sleep;
use vigil_common::error::VigilError;
use vigil_common::ipc::{Method, Request, Response, ResponseData};

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

const DEFAULT_SOCKET: &str = "/run/vigil/vigil.sock";
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RpcClient {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl RpcClient {
    /// Socket discovery order:
    ///
    /// 1. Explicit --socket flag
    /// 2. $VIGILD_SOCKET environment variable
    /// 3. /run/vigil/vigil.sock (default)
    pub fn discover_socket_path(explicit: Option<&str>) -> String {
        if let Some(path) = explicit {
            return path.to_string();
        }
        if let Ok(path) = std::env::var("VIGILD_SOCKET") {
            return path;
        }
        DEFAULT_SOCKET.to_string()
    }

    /// Connect with retry and capped backoff. The daemon recreates its
    /// socket on restart, so a short retry window covers the common case
    /// of racing a service restart.
    pub async fn connect(socket: Option<&str>) -> Result<Self> {
        let path = Self::discover_socket_path(socket);
        let max_retries = 5;
        let mut retry_delay = Duration::from_millis(50);

        for attempt in 0..max_retries {
            match tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(&path)).await {
                Ok(Ok(stream)) => {
                    let (reader, writer) = stream.into_split();
                    return Ok(Self {
                        reader: BufReader::new(reader),
                        writer,
                    });
                }
                Ok(Err(e)) if attempt == max_retries - 1 => {
                    return Err(VigilError::DaemonUnavailable(format!(
                        "{path}: {e}. Is vigild running?"
                    ))
                    .into());
                }
                _ => {
                    sleep(retry_delay).await;
                    retry_delay = (retry_delay * 2).min(Duration::from_millis(400));
                }
            }
        }

        Err(VigilError::DaemonUnavailable(format!("{path}: connection timed out")).into())
    }

    /// One request/response pair under an overall deadline.
    pub async fn call(&mut self, method: Method) -> Result<ResponseData> {
        tokio::time::timeout(CALL_TIMEOUT, self.call_inner(method))
            .await
            .map_err(|_| VigilError::DaemonUnavailable("rpc call timed out".to_string()))?
    }

    async fn call_inner(&mut self, method: Method) -> Result<ResponseData> {
        let id = REQUEST_ID.fetch_add(1, Ordering::SeqCst);

        let request_json = serde_json::to_string(&Request { id, method })? + "\n";
        self.writer
            .write_all(request_json.as_bytes())
            .await
            .context("failed to send request")?;

        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .await
            .context("failed to read response")?;

        let response: Response =
            serde_json::from_str(&line).context("failed to parse response")?;
        if response.id != id {
            anyhow::bail!("response id mismatch: sent {id}, got {}", response.id);
        }

        response
            .result
            .map_err(|e| anyhow::anyhow!("daemon error: {e}"))
    }
}
