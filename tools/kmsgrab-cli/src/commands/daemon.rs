//! Serve GRAB requests until Ctrl-C or SIGTERM.

use kmsgrab_capture_engine::{CaptureConfig, Capturer};
use kmsgrab_command_server::{CommandServer, ServerConfig};
use kmsgrab_common::config::CaptureDefaults;
use kmsgrab_platform_linux::KmsSource;
use tokio::signal::unix::{signal, SignalKind};

pub async fn run(
    capture: CaptureConfig,
    defaults: &CaptureDefaults,
    server: ServerConfig,
) -> anyhow::Result<()> {
    tracing::info!(
        output = %capture.output_path.display(),
        width = capture.width,
        height = capture.height,
        filter = ?capture.filter,
        "Starting capture daemon"
    );

    let capturer = Capturer::new(KmsSource::from_defaults(defaults), capture);
    let server = CommandServer::bind(server, capturer)?;
    server.run(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl-C will stop the daemon");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Ctrl-C handler failed, stopping");
            }
        }
        _ = terminate.recv() => tracing::info!("Received SIGTERM"),
    }
}
