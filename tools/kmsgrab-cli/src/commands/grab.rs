//! One-shot capture.

use anyhow::Context;
use kmsgrab_capture_engine::{CaptureConfig, Capturer};
use kmsgrab_common::config::CaptureDefaults;
use kmsgrab_platform_linux::KmsSource;

pub fn run(config: CaptureConfig, defaults: &CaptureDefaults) -> anyhow::Result<()> {
    let output = config.output_path.clone();
    let capturer = Capturer::new(KmsSource::from_defaults(defaults), config);

    capturer
        .capture()
        .with_context(|| format!("Failed to grab screenshot into {}", output.display()))?;

    Ok(())
}
