//! Daemon accept loop and the single capture worker.
//!
//! ```text
//! accept ─▶ reader task ─┬─ GRAB ─▶ bounded queue ─▶ capture worker ─▶ OK / ERR
//!                        └─ other ─▶ ERR unsupported command
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kmsgrab_capture_engine::Capturer;
use kmsgrab_common::config::DaemonDefaults;
use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};
use kmsgrab_platform_core::FrameSource;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::protocol::{Command, Reply, MAX_COMMAND_LEN};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Performs one capture per `GRAB`. Called on the blocking pool.
pub trait GrabHandler: Send + Sync + 'static {
    fn grab(&self) -> KmsgrabResult<()>;
}

impl<S: FrameSource + 'static> GrabHandler for Capturer<S> {
    fn grab(&self) -> KmsgrabResult<()> {
        self.capture().map(|_| ())
    }
}

/// Socket and queue settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    /// GRAB requests that may wait while a capture runs.
    pub queue_depth: usize,
    /// Bytes read from a client in its single read.
    pub max_command_len: usize,
}

impl ServerConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            queue_depth: 4,
            max_command_len: MAX_COMMAND_LEN,
        }
    }

    pub fn from_defaults(defaults: &DaemonDefaults) -> Self {
        Self {
            socket_path: defaults.socket_path.clone(),
            queue_depth: defaults.queue_depth.max(1),
            max_command_len: defaults.max_command_len.clamp(1, MAX_COMMAND_LEN),
        }
    }
}

/// Removes the socket file when the server goes away.
struct SocketGuard {
    path: PathBuf,
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove socket")
            }
        }
    }
}

/// A captured client waiting for its reply.
struct GrabJob {
    stream: UnixStream,
}

/// A bound daemon, ready to serve.
pub struct CommandServer<H> {
    config: ServerConfig,
    handler: Arc<H>,
    listener: UnixListener,
    _socket: SocketGuard,
}

impl<H: GrabHandler> CommandServer<H> {
    /// Replace any stale socket file and bind the listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: ServerConfig, handler: H) -> KmsgrabResult<Self> {
        let path = &config.socket_path;
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(KmsgrabError::ipc(format!(
                    "cannot remove stale socket {}: {e}",
                    path.display()
                )))
            }
        }

        let listener = UnixListener::bind(path).map_err(|e| {
            KmsgrabError::ipc(format!("unable to bind socket {}: {e}", path.display()))
        })?;

        tracing::info!(
            socket = %path.display(),
            queue_depth = config.queue_depth,
            "Daemon listening"
        );

        Ok(Self {
            _socket: SocketGuard { path: path.clone() },
            config,
            handler: Arc::new(handler),
            listener,
        })
    }

    /// Serve clients until `shutdown` resolves, then finish queued captures.
    pub async fn run<F>(self, shutdown: F) -> KmsgrabResult<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            handler,
            listener,
            _socket,
        } = self;

        let (jobs_tx, jobs_rx) = mpsc::channel(config.queue_depth.max(1));
        let worker = tokio::spawn(capture_worker(handler, jobs_rx));
        let mut readers = JoinSet::new();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, no longer accepting clients");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        tracing::debug!("Client connected");
                        readers.spawn(read_command(stream, jobs_tx.clone(), config.max_command_len));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(_) = readers.join_next(), if !readers.is_empty() => {}
            }
        }

        drop(listener);
        // Readers still waiting on a silent client would hold the queue open.
        readers.abort_all();
        while readers.join_next().await.is_some() {}
        drop(jobs_tx);

        worker
            .await
            .map_err(|e| KmsgrabError::ipc(format!("capture worker failed: {e}")))?;

        tracing::info!("Daemon stopped");
        Ok(())
    }
}

/// Single read of at most `max_len` bytes, then either queue or reject.
async fn read_command(mut stream: UnixStream, jobs: mpsc::Sender<GrabJob>, max_len: usize) {
    let mut buf = vec![0u8; max_len];
    let n = match stream.read(&mut buf).await {
        Ok(0) => {
            tracing::debug!("Client closed without sending a command");
            return;
        }
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read command");
            return;
        }
    };

    match Command::parse(&buf[..n]) {
        Some(Command::Grab) => {
            tracing::debug!("GRAB queued");
            if jobs.send(GrabJob { stream }).await.is_err() {
                tracing::debug!("Capture worker gone, dropping GRAB");
            }
        }
        None => {
            tracing::info!(
                command = %String::from_utf8_lossy(&buf[..n]).trim(),
                "Unsupported command"
            );
            send_reply(stream, &Reply::unsupported()).await;
        }
    }
}

async fn capture_worker<H: GrabHandler>(handler: Arc<H>, mut jobs: mpsc::Receiver<GrabJob>) {
    while let Some(job) = jobs.recv().await {
        let handler = Arc::clone(&handler);
        let result = tokio::task::spawn_blocking(move || handler.grab())
            .await
            .unwrap_or_else(|e| {
                Err(KmsgrabError::CaptureCrashed {
                    message: e.to_string(),
                })
            });

        if let Err(ref e) = result {
            tracing::error!(error = %e, "Capture failed");
        }
        send_reply(job.stream, &Reply::from_result(&result)).await;
    }
}

async fn send_reply(mut stream: UnixStream, reply: &Reply) {
    if let Err(e) = stream.write_all(reply.to_line().as_bytes()).await {
        tracing::warn!(error = %e, %reply, "Failed to send reply");
        return;
    }
    if let Err(e) = stream.shutdown().await {
        tracing::debug!(error = %e, "Client went away before close");
    }
}
