//! kmsgrab platform core contracts.
//!
//! This crate contains the scanout data structures and the [`FrameSource`]
//! seam shared by the capture pipeline and the concrete DRM backend, so the
//! pipeline can be driven without hardware.

use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};

/// A hardware plane as reported by plane enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneDescriptor {
    pub plane_id: u32,
    /// Framebuffer currently bound to the plane, 0 if none.
    pub fb_id: u32,
    /// CRTC the plane feeds, 0 if none.
    pub crtc_id: u32,
    /// Bitmask of CRTC indices the plane can be attached to.
    pub possible_crtcs: u32,
}

impl PlaneDescriptor {
    /// A plane is scanning out when it has both a framebuffer and a CRTC.
    pub fn is_active(&self) -> bool {
        self.fb_id != 0 && self.crtc_id != 0
    }
}

/// Select the first plane that is actively scanning out.
pub fn first_active_plane(planes: &[PlaneDescriptor]) -> Option<&PlaneDescriptor> {
    planes.iter().find(|plane| plane.is_active())
}

/// Geometry of the framebuffer being captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDescriptor {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    /// Bits per pixel as stored in memory.
    pub bpp: u32,
    /// Color depth (significant bits).
    pub depth: u32,
    /// Kernel memory handle of plane 0.
    pub handle: u32,
    /// Bytes between the starts of consecutive scanlines.
    pub pitch: u32,
    /// DRM fourcc code, when the extended query succeeded.
    pub fourcc: Option<u32>,
    /// Format modifier of plane 0, when the extended query succeeded.
    pub modifier: Option<u64>,
}

impl FramebufferDescriptor {
    /// Bytes occupied by one pixel, rounded down.
    pub fn bytes_per_pixel(&self) -> u32 {
        self.bpp / 8
    }

    /// Bytes of pixel data in one scanline, excluding padding.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel() as usize
    }

    /// Length of the memory mapping covering the whole framebuffer.
    pub fn mapping_len(&self) -> usize {
        self.pitch as usize * self.height as usize
    }

    /// Check the pitch covers at least one full row of pixels.
    pub fn validate(&self) -> KmsgrabResult<()> {
        if (self.pitch as usize) < self.row_bytes() {
            return Err(KmsgrabError::invalid_geometry(format!(
                "pitch {} is smaller than {} bytes per row ({}x{} @ {} bpp)",
                self.pitch,
                self.row_bytes(),
                self.width,
                self.height,
                self.bpp
            )));
        }
        Ok(())
    }

    /// Human-readable fourcc, e.g. `XR24`.
    pub fn fourcc_name(&self) -> Option<String> {
        self.fourcc.map(fourcc_to_string)
    }
}

/// Render a DRM fourcc code as its four ASCII characters.
pub fn fourcc_to_string(code: u32) -> String {
    code.to_le_bytes()
        .iter()
        .map(|b| {
            if b.is_ascii_graphic() {
                *b as char
            } else {
                '?'
            }
        })
        .collect()
}

/// Source pixel encodings the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 16-bit 5-6-5 packed RGB.
    Rgb565,
    /// 32-bit packed `x:r:g:b`, the top byte ignored.
    Rgb888x,
}

impl PixelFormat {
    /// Resolve the pixel format from a framebuffer bit depth.
    pub fn from_bpp(bpp: u32) -> KmsgrabResult<Self> {
        match bpp {
            16 => Ok(Self::Rgb565),
            32 => Ok(Self::Rgb888x),
            other => Err(KmsgrabError::UnsupportedFormat { bpp: other }),
        }
    }
}

/// A captured scanout buffer, valid while the value is alive.
///
/// Dropping the frame releases every kernel resource behind it.
pub trait ScanoutFrame {
    /// Geometry of the captured framebuffer.
    fn descriptor(&self) -> &FramebufferDescriptor;

    /// Raw pixel memory, `pitch * height` bytes.
    fn bytes(&self) -> &[u8];
}

/// Something that can hand out the currently displayed framebuffer.
pub trait FrameSource: Send + Sync {
    type Frame: ScanoutFrame;

    /// Locate, export, and map the active scanout buffer.
    fn acquire(&self) -> KmsgrabResult<Self::Frame>;

    /// Drop elevated privileges until the returned scope is dropped.
    ///
    /// Called after [`FrameSource::acquire`] and before any file is written.
    fn enter_unprivileged(&self) -> KmsgrabResult<PrivilegeScope> {
        Ok(PrivilegeScope::unchanged())
    }
}

/// Restores the previous privilege level when dropped.
#[must_use = "privileges are restored as soon as the scope is dropped"]
pub struct PrivilegeScope {
    restore: Option<Box<dyn FnOnce() + Send>>,
}

impl PrivilegeScope {
    /// A scope that did not change anything.
    pub fn unchanged() -> Self {
        Self { restore: None }
    }

    /// A scope that runs `restore` on drop.
    pub fn with_restore(restore: impl FnOnce() + Send + 'static) -> Self {
        Self {
            restore: Some(Box::new(restore)),
        }
    }
}

impl Drop for PrivilegeScope {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

impl std::fmt::Debug for PrivilegeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivilegeScope")
            .field("restores", &self.restore.is_some())
            .finish()
    }
}
