//! Single-shot capture orchestration.
//!
//! A capture walks the stages in a fixed order:
//!
//! ```text
//! acquire ─▶ resolve size ─▶ drop privileges ─▶ normalize ─▶ release frame
//!                                                               │
//!                                          encode ◀─ resample ◀─┘
//! ```
//!
//! Every stage owns its resources through guards, so an error at any point
//! releases what earlier stages acquired before it propagates.

use std::path::{Path, PathBuf};
use std::time::Instant;

use kmsgrab_common::config::{CaptureDefaults, ScaleFilter};
use kmsgrab_common::error::KmsgrabResult;
use kmsgrab_platform_core::{FrameSource, PixelFormat, ScanoutFrame};

use crate::encode::{encode, OutputFormat};
use crate::normalize::normalize;
use crate::resample::{resample, resolve_output_size};

/// Parameters of one capture. Fixed for the lifetime of a [`Capturer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Destination file; its suffix picks the codec.
    pub output_path: PathBuf,
    /// Requested width, 0 for native or derived.
    pub width: u32,
    /// Requested height, 0 for native or derived.
    pub height: u32,
    pub filter: ScaleFilter,
    /// JPEG quality in 1..=100. Ignored for PNG.
    pub jpeg_quality: u8,
}

impl CaptureConfig {
    /// Native-size capture to `output_path` using the configured defaults.
    pub fn new(output_path: impl Into<PathBuf>, defaults: &CaptureDefaults) -> Self {
        Self {
            output_path: output_path.into(),
            width: 0,
            height: 0,
            filter: defaults.filter,
            jpeg_quality: defaults.jpeg_quality,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_filter(mut self, filter: ScaleFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::from_path(&self.output_path, self.jpeg_quality)
    }
}

/// Summary of a finished capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    pub source_width: u32,
    pub source_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub pixel_format: PixelFormat,
    pub resampled: bool,
    pub path: PathBuf,
    pub elapsed_ms: u64,
}

/// Runs captures from a [`FrameSource`] with a fixed [`CaptureConfig`].
pub struct Capturer<S> {
    source: S,
    config: CaptureConfig,
}

impl<S: FrameSource> Capturer<S> {
    pub fn new(source: S, config: CaptureConfig) -> Self {
        Self { source, config }
    }

    /// Grab the current scanout and write it to the configured path.
    pub fn capture(&self) -> KmsgrabResult<CaptureReport> {
        let started = Instant::now();
        let config = &self.config;

        let frame = self.source.acquire()?;
        let fb = frame.descriptor().clone();
        let pixel_format = PixelFormat::from_bpp(fb.bpp)?;

        tracing::debug!(
            fb_id = fb.fb_id,
            width = fb.width,
            height = fb.height,
            bpp = fb.bpp,
            depth = fb.depth,
            pitch = fb.pitch,
            fourcc = fb.fourcc_name().as_deref().unwrap_or("legacy"),
            "Acquired scanout frame"
        );

        let (out_w, out_h) = resolve_output_size(fb.width, fb.height, config.width, config.height)?;

        let _privileges = self.source.enter_unprivileged()?;

        let native = normalize(&fb, frame.bytes())?;
        drop(frame);

        let resampled = (out_w, out_h) != native.dimensions();
        let image = if resampled {
            resample(&native, out_w, out_h, config.filter)?
        } else {
            native
        };

        encode(&image, &config.output_path, config.output_format())?;

        let report = CaptureReport {
            source_width: fb.width,
            source_height: fb.height,
            output_width: out_w,
            output_height: out_h,
            pixel_format,
            resampled,
            path: config.output_path.clone(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            path = %report.path.display(),
            source = %format!("{}x{}", report.source_width, report.source_height),
            output = %format!("{}x{}", report.output_width, report.output_height),
            format = ?report.pixel_format,
            codec = config.output_format().name(),
            elapsed_ms = report.elapsed_ms,
            "Capture complete"
        );

        Ok(report)
    }
}

/// True when `path` would be written as JPEG.
pub fn is_jpeg_path(path: &Path) -> bool {
    matches!(OutputFormat::from_path(path, 0), OutputFormat::Jpeg { .. })
}
