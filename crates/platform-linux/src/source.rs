//! The KMS framebuffer source used for real captures.

use std::path::PathBuf;

use kmsgrab_common::config::CaptureDefaults;
use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};
use kmsgrab_platform_core::{
    first_active_plane, FrameSource, FramebufferDescriptor, PrivilegeScope, ScanoutFrame,
};

use crate::device::{DrmDevice, ScanoutBuffer};
use crate::mapping::MappedBuffer;
use crate::privileges;

/// Grabs whatever the first active plane of the first capable card shows.
#[derive(Debug, Clone)]
pub struct KmsSource {
    device_dir: PathBuf,
    max_cards: u32,
}

impl KmsSource {
    pub fn new(device_dir: impl Into<PathBuf>, max_cards: u32) -> Self {
        Self {
            device_dir: device_dir.into(),
            max_cards,
        }
    }

    pub fn from_defaults(defaults: &CaptureDefaults) -> Self {
        Self::new(defaults.device_dir.clone(), defaults.max_cards)
    }
}

impl FrameSource for KmsSource {
    type Frame = KmsFrame;

    fn acquire(&self) -> KmsgrabResult<KmsFrame> {
        let device = DrmDevice::probe(&self.device_dir, self.max_cards)?;
        device.enable_client_caps()?;

        let planes = device.planes()?;
        let plane = first_active_plane(&planes)
            .copied()
            .ok_or(KmsgrabError::NoActivePlane)?;

        tracing::debug!(
            device = %device.path().display(),
            plane_id = plane.plane_id,
            fb_id = plane.fb_id,
            crtc_id = plane.crtc_id,
            "Using plane"
        );

        let scanout = device.into_scanout(plane.fb_id)?;
        let descriptor = scanout.descriptor();
        descriptor.validate()?;

        let fd = scanout.export()?;
        let mapping = MappedBuffer::map(fd, descriptor.mapping_len())?;

        Ok(KmsFrame { mapping, scanout })
    }

    fn enter_unprivileged(&self) -> KmsgrabResult<PrivilegeScope> {
        privileges::enter_unprivileged()
    }
}

/// A mapped scanout buffer. Dropping it unmaps the memory, closes the
/// exported descriptor, the GEM handles, and finally the device.
#[derive(Debug)]
pub struct KmsFrame {
    mapping: MappedBuffer,
    scanout: ScanoutBuffer,
}

impl ScanoutFrame for KmsFrame {
    fn descriptor(&self) -> &FramebufferDescriptor {
        self.scanout.descriptor()
    }

    fn bytes(&self) -> &[u8] {
        self.mapping.as_bytes()
    }
}
