//! DRM device discovery and framebuffer resolution.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};
use kmsgrab_platform_core::{fourcc_to_string, FramebufferDescriptor, PlaneDescriptor};

use crate::drm;

/// Path of the `index`-th card node under `device_dir`.
pub fn card_path(device_dir: &Path, index: u32) -> PathBuf {
    device_dir.join(format!("card{index}"))
}

/// An open KMS/DRM card node.
#[derive(Debug)]
pub struct DrmDevice {
    file: File,
    path: PathBuf,
}

impl DrmDevice {
    /// Open a card node read-write.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open the first card node that supports dumb buffers.
    ///
    /// Nodes are tried in ascending index order; the first missing node ends
    /// the search.
    pub fn probe(device_dir: &Path, max_cards: u32) -> KmsgrabResult<Self> {
        for index in 0..max_cards {
            let path = card_path(device_dir, index);
            let device = match Self::open(&path) {
                Ok(device) => device,
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping DRM device");
                    continue;
                }
            };

            match device.supports_dumb_buffers() {
                Ok(true) => {
                    tracing::debug!(path = %path.display(), "Selected DRM device");
                    return Ok(device);
                }
                Ok(false) => {
                    tracing::debug!(path = %path.display(), "No dumb buffer support");
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Capability query failed");
                }
            }
        }

        Err(KmsgrabError::NoCapableDevice {
            searched: device_dir.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }

    pub fn supports_dumb_buffers(&self) -> io::Result<bool> {
        Ok(drm::get_cap(self.fd(), drm::DRM_CAP_DUMB_BUFFER)? != 0)
    }

    /// Ask for every plane type and the atomic property set.
    pub fn enable_client_caps(&self) -> KmsgrabResult<()> {
        drm::set_client_cap(self.fd(), drm::DRM_CLIENT_CAP_ATOMIC, 1)
            .map_err(|e| KmsgrabError::device(format!("Unable to set atomic cap: {e}")))?;
        drm::set_client_cap(self.fd(), drm::DRM_CLIENT_CAP_UNIVERSAL_PLANES, 1).map_err(|e| {
            KmsgrabError::device(format!("Unable to set universal planes cap: {e}"))
        })?;
        Ok(())
    }

    /// Enumerate planes. Planes whose query fails are skipped.
    pub fn planes(&self) -> KmsgrabResult<Vec<PlaneDescriptor>> {
        let ids = drm::plane_ids(self.fd())
            .map_err(|e| KmsgrabError::device(format!("Unable to get plane resources: {e}")))?;

        let mut planes = Vec::with_capacity(ids.len());
        for (index, id) in ids.into_iter().enumerate() {
            match drm::get_plane(self.fd(), id) {
                Ok(plane) => {
                    tracing::debug!(
                        index,
                        plane_id = plane.plane_id,
                        fb_id = plane.fb_id,
                        crtc_id = plane.crtc_id,
                        possible_crtcs = format_args!("{:#x}", plane.possible_crtcs),
                        "Plane"
                    );
                    planes.push(plane);
                }
                Err(e) => {
                    tracing::debug!(index, plane_id = id, error = %e, "Plane query failed");
                }
            }
        }
        Ok(planes)
    }

    /// Resolve the geometry of `fb_id`, taking ownership of the device so the
    /// returned buffer can close its memory handles on drop.
    pub fn into_scanout(self, fb_id: u32) -> KmsgrabResult<ScanoutBuffer> {
        let legacy = drm::get_fb(self.fd(), fb_id)
            .map_err(|source| KmsgrabError::FramebufferQuery { fb_id, source })?;

        tracing::debug!(
            fb_id = legacy.fb_id,
            width = legacy.width,
            height = legacy.height,
            bpp = legacy.bpp,
            depth = legacy.depth,
            handle = legacy.handle,
            pitch = legacy.pitch,
            "Legacy framebuffer query"
        );

        let mut scanout = ScanoutBuffer {
            descriptor: FramebufferDescriptor {
                fb_id,
                width: legacy.width,
                height: legacy.height,
                bpp: legacy.bpp,
                depth: legacy.depth,
                handle: legacy.handle,
                pitch: legacy.width * (legacy.bpp / 8),
                fourcc: None,
                modifier: None,
            },
            handles: Vec::new(),
            device: self,
        };
        scanout.own_handle(legacy.handle);

        match drm::get_fb2(scanout.device.fd(), fb_id) {
            Ok(extended) => {
                tracing::debug!(
                    width = extended.width,
                    height = extended.height,
                    pixel_format = %fourcc_to_string(extended.pixel_format),
                    flags = format_args!("{:#x}", extended.flags),
                    handles = ?extended.handles,
                    pitches = ?extended.pitches,
                    offsets = ?extended.offsets,
                    modifier = ?extended.modifier(),
                    "Extended framebuffer query"
                );
                for handle in extended.handles {
                    scanout.own_handle(handle);
                }
                scanout.descriptor.handle = extended.handles[0];
                scanout.descriptor.pitch = extended.pitches[0];
                scanout.descriptor.fourcc = Some(extended.pixel_format);
                scanout.descriptor.modifier = extended.modifier();
            }
            Err(e) => {
                tracing::debug!(fb_id, error = %e, "Extended framebuffer query failed, using legacy geometry");
            }
        }

        Ok(scanout)
    }
}

/// A resolved scanout framebuffer and the device it lives on.
///
/// Every GEM handle the queries produced is closed on drop, before the
/// device itself is closed.
#[derive(Debug)]
pub struct ScanoutBuffer {
    descriptor: FramebufferDescriptor,
    handles: Vec<u32>,
    device: DrmDevice,
}

impl ScanoutBuffer {
    pub fn descriptor(&self) -> &FramebufferDescriptor {
        &self.descriptor
    }

    /// Export the plane 0 handle as a read-only dma-buf descriptor.
    pub fn export(&self) -> KmsgrabResult<OwnedFd> {
        let handle = self.descriptor.handle;
        if handle == 0 {
            return Err(KmsgrabError::export_failed(
                handle,
                "the kernel hid the buffer handle; run as root or with CAP_SYS_ADMIN",
            ));
        }

        let fd = drm::prime_handle_to_fd(self.device.fd(), handle)
            .map_err(|e| KmsgrabError::export_failed(handle, e.to_string()))?;
        tracing::debug!(handle, "Exported prime buffer");
        Ok(fd)
    }

    fn own_handle(&mut self, handle: u32) {
        if handle != 0 && !self.handles.contains(&handle) {
            self.handles.push(handle);
        }
    }
}

impl Drop for ScanoutBuffer {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = drm::gem_close(self.device.fd(), handle) {
                tracing::debug!(handle, error = %e, "Failed to close GEM handle");
            }
        }
    }
}

/// What a single card node reports, for diagnostics.
#[derive(Debug, Clone)]
pub struct DeviceSurvey {
    pub path: PathBuf,
    pub dumb_buffers: bool,
    pub planes: Vec<PlaneDescriptor>,
    /// Why the node could not be inspected, if it could not.
    pub error: Option<String>,
}

/// Inspect every card node under `device_dir`.
pub fn survey_devices(device_dir: &Path, max_cards: u32) -> Vec<DeviceSurvey> {
    let mut surveys = Vec::new();

    for index in 0..max_cards {
        let path = card_path(device_dir, index);
        let device = match DrmDevice::open(&path) {
            Ok(device) => device,
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => {
                surveys.push(DeviceSurvey {
                    path,
                    dumb_buffers: false,
                    planes: Vec::new(),
                    error: Some(e.to_string()),
                });
                continue;
            }
        };

        let dumb_buffers = device.supports_dumb_buffers().unwrap_or(false);
        let (planes, error) = match device.enable_client_caps().and_then(|_| device.planes()) {
            Ok(planes) => (planes, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        surveys.push(DeviceSurvey {
            path,
            dumb_buffers,
            planes,
            error,
        });
    }

    surveys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_paths_are_indexed() {
        assert_eq!(
            card_path(Path::new("/dev/dri"), 3),
            PathBuf::from("/dev/dri/card3")
        );
    }

    #[test]
    fn probe_empty_directory_reports_no_device() {
        let dir = tempfile::tempdir().unwrap();
        let err = DrmDevice::probe(dir.path(), 16).unwrap_err();
        assert!(matches!(err, KmsgrabError::NoCapableDevice { .. }));
    }

    #[test]
    fn probe_skips_nodes_without_drm_support() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file opens fine but rejects DRM ioctls.
        std::fs::write(card_path(dir.path(), 0), b"").unwrap();

        let err = DrmDevice::probe(dir.path(), 16).unwrap_err();
        assert!(matches!(err, KmsgrabError::NoCapableDevice { .. }));
    }

    #[test]
    fn survey_stops_at_first_missing_node() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(card_path(dir.path(), 0), b"").unwrap();
        std::fs::write(card_path(dir.path(), 2), b"").unwrap();

        let surveys = survey_devices(dir.path(), 16);
        assert_eq!(surveys.len(), 1);
        assert!(!surveys[0].dumb_buffers);
        assert!(surveys[0].error.is_some());
    }
}
