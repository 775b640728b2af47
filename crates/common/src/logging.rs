//! Logging and tracing initialization.

use crate::config::LoggingConfig;

/// Level forced by `-v`.
pub const VERBOSE_LEVEL: &str = "debug";

/// Initialize the tracing subscriber with the given configuration.
///
/// `verbose` forces [`VERBOSE_LEVEL`]. Otherwise `RUST_LOG` wins over the
/// configured level. Logs go to stderr so they never interleave with report
/// output on stdout.
pub fn init_logging(config: &LoggingConfig, verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = filter_directives(&config.level, rust_log.as_deref(), verbose);
    let env_filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("Invalid log filter {directives:?}: {e}");
        EnvFilter::new(&config.level)
    });

    if config.json {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}


/// Pick the filter directives: `-v` first, then `RUST_LOG`, then the config.
fn filter_directives(configured: &str, rust_log: Option<&str>, verbose: bool) -> String {
    if verbose {
        return VERBOSE_LEVEL.to_string();
    }
    match rust_log.map(str::trim) {
        Some(env) if !env.is_empty() => env.to_string(),
        _ => configured.to_string(),
    }
}
