//! Line-delimited JSON control channel over a unix socket.
//!
//! One request per connection: the client writes a single JSON line and reads
//! a single JSON line back.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/dex_price_estimator.sock";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum AdminRequest {
    Status,
    /// Stop scheduling orderbook refreshes. Queries keep using the last snapshot.
    Pause,
    Resume,
    /// Run one refresh cycle now and report the resulting status.
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AdminStatus {
    pub run_id: String,
    pub fetch_state: String,
    pub refresh_running: bool,
    pub markets: usize,
    pub records: usize,
    pub built_at_ms: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum AdminResponse {
    Status(AdminStatus),
    Ack,
    Error(String),
}

pub async fn run_server<F, Fut>(socket_path: impl Into<PathBuf>, handler: F) -> Result<()>
where
    F: Fn(AdminRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AdminResponse>> + Send + 'static,
{
    let socket_path = socket_path.into();
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)?;
    let handler = Arc::new(handler);
    info!(socket = %socket_path.display(), "admin ipc listening");
    loop {
        let (stream, _) = listener.accept().await?;
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            if let Err(err) = handle_stream(stream, handler).await {
                warn!(error = ?err, "admin ipc connection failed");
            }
        });
    }
}

async fn handle_stream<F, Fut>(stream: UnixStream, handler: Arc<F>) -> Result<()>
where
    F: Fn(AdminRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AdminResponse>> + Send + 'static,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();
    if reader.read_line(&mut buf).await? == 0 {
        return Ok(());
    }
    let resp = match serde_json::from_str::<AdminRequest>(buf.trim()) {
        Ok(req) => handler(req)
            .await
            .unwrap_or_else(|err| AdminResponse::Error(format!("{err:#}"))),
        Err(err) => AdminResponse::Error(format!("malformed request: {err}")),
    };
    let line = serde_json::to_string(&resp)? + "\n";
    write_half.write_all(line.as_bytes()).await?;
    Ok(())
}

pub async fn send_request(socket_path: impl AsRef<Path>, req: &AdminRequest) -> Result<AdminResponse> {
    let stream = UnixStream::connect(socket_path.as_ref()).await?;
    let (read_half, mut write_half) = stream.into_split();
    let line = serde_json::to_string(req)? + "\n";
    write_half.write_all(line.as_bytes()).await?;
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();
    reader.read_line(&mut buf).await?;
    Ok(serde_json::from_str(buf.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_use_tagged_wire_form() {
        assert_eq!(
            serde_json::to_string(&AdminRequest::Refresh).expect("encode"),
            r#"{"type":"Refresh"}"#
        );
        let status: AdminResponse = serde_json::from_str(
            r#"{"type":"Status","payload":{"run_id":"r","fetch_state":"streaming","refresh_running":true,"markets":2,"records":3,"built_at_ms":null}}"#,
        )
        .expect("decode");
        assert!(matches!(status, AdminResponse::Status(AdminStatus { markets: 2, .. })));
    }
}
