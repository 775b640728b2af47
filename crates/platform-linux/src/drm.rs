//! Raw DRM ioctl interface.
//!
//! Only the handful of requests needed to find and export the active scanout
//! buffer are bound here. Struct layouts mirror `include/uapi/drm/drm.h` and
//! `drm_mode.h`; request numbers are derived from the struct sizes the same
//! way the kernel's `DRM_IOWR`/`DRM_IOW` macros do.

use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use kmsgrab_platform_core::PlaneDescriptor;
use libc::c_ulong;

const DRM_IOCTL_BASE: u32 = b'd' as u32;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const fn ioc(dir: u32, nr: u32, size: usize) -> c_ulong {
    ((dir << 30) | ((size as u32) << 16) | (DRM_IOCTL_BASE << 8) | nr) as c_ulong
}

const fn iowr<T>(nr: u32) -> c_ulong {
    ioc(IOC_READ | IOC_WRITE, nr, size_of::<T>())
}

const fn iow<T>(nr: u32) -> c_ulong {
    ioc(IOC_WRITE, nr, size_of::<T>())
}

pub const DRM_CAP_DUMB_BUFFER: u64 = 0x1;
pub const DRM_CLIENT_CAP_UNIVERSAL_PLANES: u64 = 2;
pub const DRM_CLIENT_CAP_ATOMIC: u64 = 3;

/// `drm_mode_fb_cmd2.flags` bit telling the modifier array is valid.
const DRM_MODE_FB_MODIFIERS: u32 = 1 << 1;

#[repr(C)]
#[derive(Debug, Default)]
struct DrmGemClose {
    handle: u32,
    pad: u32,
}

#[repr(C)]
#[derive(Debug, Default)]
struct DrmGetCap {
    capability: u64,
    value: u64,
}

#[repr(C)]
#[derive(Debug, Default)]
struct DrmSetClientCap {
    capability: u64,
    value: u64,
}

#[repr(C)]
#[derive(Debug, Default)]
struct DrmPrimeHandle {
    handle: u32,
    flags: u32,
    fd: i32,
}

#[repr(C)]
#[derive(Debug, Default)]
struct DrmModeGetPlaneRes {
    plane_id_ptr: u64,
    count_planes: u32,
}

#[repr(C)]
#[derive(Debug, Default)]
struct DrmModeGetPlane {
    plane_id: u32,
    crtc_id: u32,
    fb_id: u32,
    possible_crtcs: u32,
    gamma_size: u32,
    count_format_types: u32,
    format_type_ptr: u64,
}

/// Legacy framebuffer query result (`struct drm_mode_fb_cmd`).
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyFramebuffer {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
    pub depth: u32,
    pub handle: u32,
}

/// Extended framebuffer query result (`struct drm_mode_fb_cmd2`).
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtendedFramebuffer {
    pub fb_id: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_format: u32,
    pub flags: u32,
    pub handles: [u32; 4],
    pub pitches: [u32; 4],
    pub offsets: [u32; 4],
    pub modifier: [u64; 4],
}

impl ExtendedFramebuffer {
    /// Modifier of plane 0, if the kernel reported one.
    pub fn modifier(&self) -> Option<u64> {
        (self.flags & DRM_MODE_FB_MODIFIERS != 0).then_some(self.modifier[0])
    }
}

const DRM_IOCTL_GEM_CLOSE: c_ulong = iow::<DrmGemClose>(0x09);
const DRM_IOCTL_GET_CAP: c_ulong = iowr::<DrmGetCap>(0x0c);
const DRM_IOCTL_SET_CLIENT_CAP: c_ulong = iow::<DrmSetClientCap>(0x0d);
const DRM_IOCTL_PRIME_HANDLE_TO_FD: c_ulong = iowr::<DrmPrimeHandle>(0x2d);
const DRM_IOCTL_MODE_GETFB: c_ulong = iowr::<LegacyFramebuffer>(0xad);
const DRM_IOCTL_MODE_GETPLANERESOURCES: c_ulong = iowr::<DrmModeGetPlaneRes>(0xb5);
const DRM_IOCTL_MODE_GETPLANE: c_ulong = iowr::<DrmModeGetPlane>(0xb6);
const DRM_IOCTL_MODE_GETFB2: c_ulong = iowr::<ExtendedFramebuffer>(0xce);

/// Issue a DRM ioctl, restarting on `EINTR`/`EAGAIN` like libdrm does.
fn drm_ioctl<T>(fd: BorrowedFd<'_>, request: c_ulong, arg: &mut T) -> io::Result<()> {
    loop {
        // SAFETY: `arg` is an exclusively borrowed #[repr(C)] struct whose
        // layout matches the size encoded in `request`.
        let ret = unsafe { libc::ioctl(fd.as_raw_fd(), request as _, arg as *mut T) };
        if ret != -1 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
            _ => return Err(err),
        }
    }
}

pub fn get_cap(fd: BorrowedFd<'_>, capability: u64) -> io::Result<u64> {
    let mut arg = DrmGetCap {
        capability,
        value: 0,
    };
    drm_ioctl(fd, DRM_IOCTL_GET_CAP, &mut arg)?;
    Ok(arg.value)
}

pub fn set_client_cap(fd: BorrowedFd<'_>, capability: u64, value: u64) -> io::Result<()> {
    let mut arg = DrmSetClientCap { capability, value };
    drm_ioctl(fd, DRM_IOCTL_SET_CLIENT_CAP, &mut arg)
}

/// IDs of every plane exposed to this client.
pub fn plane_ids(fd: BorrowedFd<'_>) -> io::Result<Vec<u32>> {
    let mut counts = DrmModeGetPlaneRes::default();
    drm_ioctl(fd, DRM_IOCTL_MODE_GETPLANERESOURCES, &mut counts)?;

    // The plane count can grow between the two calls (hotplug), retry until
    // the buffer was large enough.
    loop {
        let mut ids = vec![0u32; counts.count_planes as usize];
        let mut fill = DrmModeGetPlaneRes {
            plane_id_ptr: ids.as_mut_ptr() as u64,
            count_planes: counts.count_planes,
        };
        drm_ioctl(fd, DRM_IOCTL_MODE_GETPLANERESOURCES, &mut fill)?;

        if fill.count_planes as usize <= ids.len() {
            ids.truncate(fill.count_planes as usize);
            return Ok(ids);
        }
        counts.count_planes = fill.count_planes;
    }
}

pub fn get_plane(fd: BorrowedFd<'_>, plane_id: u32) -> io::Result<PlaneDescriptor> {
    let mut arg = DrmModeGetPlane {
        plane_id,
        ..Default::default()
    };
    drm_ioctl(fd, DRM_IOCTL_MODE_GETPLANE, &mut arg)?;
    Ok(PlaneDescriptor {
        plane_id: arg.plane_id,
        fb_id: arg.fb_id,
        crtc_id: arg.crtc_id,
        possible_crtcs: arg.possible_crtcs,
    })
}

pub fn get_fb(fd: BorrowedFd<'_>, fb_id: u32) -> io::Result<LegacyFramebuffer> {
    let mut arg = LegacyFramebuffer {
        fb_id,
        ..Default::default()
    };
    drm_ioctl(fd, DRM_IOCTL_MODE_GETFB, &mut arg)?;
    Ok(arg)
}

pub fn get_fb2(fd: BorrowedFd<'_>, fb_id: u32) -> io::Result<ExtendedFramebuffer> {
    let mut arg = ExtendedFramebuffer {
        fb_id,
        ..Default::default()
    };
    drm_ioctl(fd, DRM_IOCTL_MODE_GETFB2, &mut arg)?;
    Ok(arg)
}

/// Export a GEM handle as a read-only dma-buf descriptor.
pub fn prime_handle_to_fd(fd: BorrowedFd<'_>, handle: u32) -> io::Result<OwnedFd> {
    let mut arg = DrmPrimeHandle {
        handle,
        flags: (libc::O_RDONLY | libc::O_CLOEXEC) as u32,
        fd: -1,
    };
    drm_ioctl(fd, DRM_IOCTL_PRIME_HANDLE_TO_FD, &mut arg)?;
    if arg.fd < 0 {
        return Err(io::Error::other(
            "kernel returned an invalid prime descriptor",
        ));
    }
    // SAFETY: the kernel just created this descriptor for us and nothing
    // else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(arg.fd) })
}

pub fn gem_close(fd: BorrowedFd<'_>, handle: u32) -> io::Result<()> {
    let mut arg = DrmGemClose { handle, pad: 0 };
    drm_ioctl(fd, DRM_IOCTL_GEM_CLOSE, &mut arg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsFd;

    #[test]
    fn struct_sizes_match_kernel_abi() {
        assert_eq!(size_of::<DrmGemClose>(), 8);
        assert_eq!(size_of::<DrmGetCap>(), 16);
        assert_eq!(size_of::<DrmSetClientCap>(), 16);
        assert_eq!(size_of::<DrmPrimeHandle>(), 12);
        assert_eq!(size_of::<DrmModeGetPlaneRes>(), 16);
        assert_eq!(size_of::<DrmModeGetPlane>(), 32);
        assert_eq!(size_of::<LegacyFramebuffer>(), 28);
        assert_eq!(size_of::<ExtendedFramebuffer>(), 104);
    }

    #[test]
    fn request_numbers_match_libdrm() {
        assert_eq!(DRM_IOCTL_GEM_CLOSE, 0x4008_6409);
        assert_eq!(DRM_IOCTL_GET_CAP, 0xc010_640c);
        assert_eq!(DRM_IOCTL_SET_CLIENT_CAP, 0x4010_640d);
        assert_eq!(DRM_IOCTL_PRIME_HANDLE_TO_FD, 0xc00c_642d);
        assert_eq!(DRM_IOCTL_MODE_GETFB, 0xc01c_64ad);
        assert_eq!(DRM_IOCTL_MODE_GETPLANERESOURCES, 0xc010_64b5);
        assert_eq!(DRM_IOCTL_MODE_GETPLANE, 0xc020_64b6);
        assert_eq!(DRM_IOCTL_MODE_GETFB2, 0xc068_64ce);
    }

    #[test]
    fn modifier_only_reported_when_flagged() {
        let mut fb = ExtendedFramebuffer {
            modifier: [0x0100_0000_0000_0001, 0, 0, 0],
            ..Default::default()
        };
        assert_eq!(fb.modifier(), None);
        fb.flags = DRM_MODE_FB_MODIFIERS;
        assert_eq!(fb.modifier(), Some(0x0100_0000_0000_0001));
    }

    #[test]
    fn ioctl_on_non_drm_fd_fails_cleanly() {
        let file = std::fs::File::open("/dev/null").unwrap();
        assert!(get_cap(file.as_fd(), DRM_CAP_DUMB_BUFFER).is_err());
    }
}
