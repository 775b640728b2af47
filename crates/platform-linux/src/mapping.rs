//! Read-only mapping of an exported scanout buffer.

use std::io;
use std::os::fd::OwnedFd;

use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};
use memmap2::{Mmap, MmapOptions};

/// A private, read-only view of `len` bytes of a dma-buf.
///
/// Field order matters: the mapping is torn down before the descriptor is
/// closed.
#[derive(Debug)]
pub struct MappedBuffer {
    map: Mmap,
    _fd: OwnedFd,
}

impl MappedBuffer {
    /// Map exactly `len` bytes of `fd`, taking ownership of the descriptor.
    pub fn map(fd: OwnedFd, len: usize) -> KmsgrabResult<Self> {
        if len == 0 {
            return Err(KmsgrabError::MapFailed {
                len,
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty framebuffer"),
            });
        }

        // SAFETY: the mapping is private and read-only. The display engine may
        // keep scanning out of the buffer while we read it, which can tear the
        // image but never invalidates the mapping itself.
        let map = unsafe { MmapOptions::new().len(len).map_copy_read_only(&fd) }
            .map_err(|source| KmsgrabError::MapFailed { len, source })?;

        tracing::debug!(len, "Mapped prime buffer");
        Ok(Self { map, _fd: fd })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
