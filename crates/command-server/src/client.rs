//! Client side of the daemon protocol.

use std::path::Path;

use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::protocol::{Command, Reply};

/// Send `command` to the daemon at `socket_path` and wait for its reply.
pub async fn send_command(socket_path: &Path, command: Command) -> KmsgrabResult<Reply> {
    let response = send_raw(socket_path, command.to_line().as_bytes()).await?;
    Reply::parse(&response)
}

/// Write `request` verbatim and return everything the daemon sends back.
pub async fn send_raw(socket_path: &Path, request: &[u8]) -> KmsgrabResult<String> {
    let mut stream = UnixStream::connect(socket_path).await.map_err(|e| {
        KmsgrabError::ipc(format!(
            "cannot connect to {}: {e}",
            socket_path.display()
        ))
    })?;

    stream
        .write_all(request)
        .await
        .map_err(|e| KmsgrabError::ipc(format!("failed to send request: {e}")))?;

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .map_err(|e| KmsgrabError::ipc(format!("failed to read reply: {e}")))?;

    tracing::debug!(reply = %response.trim_end(), "Daemon replied");
    Ok(response)
}
