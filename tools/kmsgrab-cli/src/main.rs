//! kmsgrab CLI: screenshots straight from the KMS scanout buffer.
//!
//! Usage:
//!   kmsgrab [OPTIONS] <OUTPUT>          Grab one screenshot
//!   kmsgrab --daemon [OPTIONS] <OUTPUT> Serve GRAB requests on a Unix socket
//!   kmsgrab --trigger [--socket PATH]   Ask a running daemon for a capture
//!   kmsgrab --check                     Check devices and privileges

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use kmsgrab_capture_engine::pipeline::is_jpeg_path;
use kmsgrab_capture_engine::CaptureConfig;
use kmsgrab_command_server::ServerConfig;
use kmsgrab_common::config::{clamp_jpeg_quality, AppConfig, ScaleFilter};

mod commands;

#[derive(Parser)]
#[command(
    name = "kmsgrab",
    about = "Screenshot the active display straight from the kernel's scanout buffer",
    version,
    author
)]
struct Cli {
    /// Output file; .jpg/.jpeg selects JPEG, anything else PNG
    output: Option<PathBuf>,

    /// Output width (0 = native, or derived from --height)
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// Output height (0 = native, or derived from --width)
    #[arg(long, default_value_t = 0)]
    height: u32,

    /// JPEG quality, clamped to 1-100
    #[arg(long)]
    quality: Option<u32>,

    /// Use bilinear instead of nearest-neighbor scaling
    #[arg(long)]
    bilinear: bool,

    /// Run as a daemon, capturing on every GRAB request
    #[arg(long, conflicts_with_all = ["trigger", "check"])]
    daemon: bool,

    /// Daemon socket path
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Send GRAB to a running daemon and print its reply
    #[arg(long, conflicts_with = "check")]
    trigger: bool,

    /// Check devices, planes, and privileges
    #[arg(long)]
    check: bool,

    /// Read settings from this file instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging, overriding RUST_LOG
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::try_load_from(path)?,
        None => AppConfig::load(),
    };
    kmsgrab_common::logging::init_logging(&config.logging, cli.verbose);

    let socket_path = cli
        .socket
        .clone()
        .unwrap_or_else(|| config.daemon.socket_path.clone());

    if cli.check {
        return commands::check::run(&config.capture);
    }
    if cli.trigger {
        return commands::trigger::run(&socket_path).await;
    }

    let preset = if cli.daemon {
        config.daemon.output.clone()
    } else {
        None
    };
    let output = match cli.output.clone().or(preset) {
        Some(output) => output,
        None => Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "an OUTPUT file is required to capture",
            )
            .exit(),
    };

    let capture = capture_config(&cli, &config, output);

    if cli.daemon {
        let mut server = ServerConfig::from_defaults(&config.daemon);
        server.socket_path = socket_path;
        commands::daemon::run(capture, &config.capture, server).await
    } else {
        commands::grab::run(capture, &config.capture)
    }
}

/// Merge command-line flags over the configured capture defaults.
fn capture_config(cli: &Cli, config: &AppConfig, output: PathBuf) -> CaptureConfig {
    if cli.quality.is_some() && !is_jpeg_path(&output) {
        tracing::warn!(output = %output.display(), "--quality only applies to JPEG output");
    }

    let quality = cli
        .quality
        .map(clamp_jpeg_quality)
        .unwrap_or(config.capture.jpeg_quality);
    let filter = if cli.bilinear {
        ScaleFilter::Bilinear
    } else {
        config.capture.filter
    };

    CaptureConfig::new(output, &config.capture)
        .with_size(cli.width, cli.height)
        .with_filter(filter)
        .with_jpeg_quality(quality)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("kmsgrab").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_flags_override_config() {
        let cli = parse(&["--width", "1280", "--quality", "300", "--bilinear", "shot.jpg"]);
        let config = AppConfig::default();

        let capture = capture_config(&cli, &config, PathBuf::from("shot.jpg"));

        assert_eq!(capture.width, 1280);
        assert_eq!(capture.height, 0);
        assert_eq!(capture.jpeg_quality, 100);
        assert_eq!(capture.filter, ScaleFilter::Bilinear);
    }

    #[test]
    fn test_config_defaults_apply_without_flags() {
        let cli = parse(&["shot.png"]);
        let mut config = AppConfig::default();
        config.capture.filter = ScaleFilter::Bilinear;
        config.capture.jpeg_quality = 70;

        let capture = capture_config(&cli, &config, PathBuf::from("shot.png"));

        assert_eq!(capture.filter, ScaleFilter::Bilinear);
        assert_eq!(capture.jpeg_quality, 70);
    }

    #[test]
    fn test_daemon_conflicts_with_trigger() {
        let result = Cli::try_parse_from(["kmsgrab", "--daemon", "--trigger", "x.png"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
