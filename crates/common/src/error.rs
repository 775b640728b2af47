//! Error types shared across kmsgrab crates.

use std::path::PathBuf;

/// Top-level error type for kmsgrab operations.
#[derive(Debug, thiserror::Error)]
pub enum KmsgrabError {
    #[error("No KMS/DRM device with dumb buffer support found under {searched}")]
    NoCapableDevice { searched: PathBuf },

    #[error("No plane with both a framebuffer and a CRTC attached")]
    NoActivePlane,

    #[error("Failed to query framebuffer {fb_id}: {source}")]
    FramebufferQuery {
        fb_id: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Device error: {message}")]
    Device { message: String },

    #[error("Failed to export buffer handle {handle}: {message}")]
    ExportFailed { handle: u32, message: String },

    #[error("Failed to map {len} bytes of scanout memory: {source}")]
    MapFailed {
        len: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported pixel depth: {bpp} bits per pixel")]
    UnsupportedFormat { bpp: u32 },

    #[error("Invalid framebuffer geometry: {message}")]
    InvalidGeometry { message: String },

    #[error("Invalid output size {width}x{height}")]
    InvalidOutputSize { width: u32, height: u32 },

    #[error("Cannot allocate a {width}x{height} image")]
    AllocationFailed { width: u32, height: u32 },

    #[error("Failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },

    #[error("Privilege error: {message}")]
    Privilege { message: String },

    #[error("IPC error: {message}")]
    Ipc { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Capture crashed: {message}")]
    CaptureCrashed { message: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using KmsgrabError.
pub type KmsgrabResult<T> = Result<T, KmsgrabError>;

impl KmsgrabError {
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device {
            message: msg.into(),
        }
    }

    pub fn export_failed(handle: u32, msg: impl Into<String>) -> Self {
        Self::ExportFailed {
            handle,
            message: msg.into(),
        }
    }

    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            message: msg.into(),
        }
    }

    pub fn encode(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Encode {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn privilege(msg: impl Into<String>) -> Self {
        Self::Privilege {
            message: msg.into(),
        }
    }

    pub fn ipc(msg: impl Into<String>) -> Self {
        Self::Ipc {
            message: msg.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Short phrase sent back to daemon clients as `ERR <reason>`.
    pub fn reply_reason(&self) -> &'static str {
        match self {
            Self::NoCapableDevice { .. } => "no capable device",
            Self::NoActivePlane => "no active plane",
            Self::FramebufferQuery { .. } => "framebuffer query failed",
            Self::Device { .. } => "device error",
            Self::ExportFailed { .. } => "export failed",
            Self::MapFailed { .. } => "map failed",
            Self::UnsupportedFormat { .. } => "unsupported format",
            Self::InvalidGeometry { .. } => "invalid geometry",
            Self::InvalidOutputSize { .. } => "invalid output size",
            Self::AllocationFailed { .. } => "allocation failed",
            Self::Encode { .. } => "encode failed",
            Self::Privilege { .. } => "privilege error",
            Self::Ipc { .. } | Self::Protocol { .. } => "ipc error",
            Self::Config { .. } | Self::Json(_) => "configuration error",
            Self::CaptureCrashed { .. } => "capture crashed",
            Self::Io(_) => "grab failed",
        }
    }
}
