//! kmsgrab Capture Engine
//!
//! Turns a mapped scanout buffer into an image file:
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌───────────┐   ┌─────────┐
//! │ FrameSource  │──▶│ normalize │──▶│ resample  │──▶│ encode  │
//! │ (KMS / test) │   │ to RGB8   │   │ (opt.)    │   │ PNG/JPG │
//! └──────────────┘   └───────────┘   └───────────┘   └─────────┘
//! ```
//!
//! [`Capturer`] drives the stages; the hardware side lives behind the
//! [`kmsgrab_platform_core::FrameSource`] trait.

pub mod encode;
pub mod normalize;
pub mod pipeline;
pub mod resample;
pub mod rgb;

pub use encode::OutputFormat;
pub use pipeline::{CaptureConfig, CaptureReport, Capturer};
pub use rgb::RgbImage;
