//! Packed 24-bit RGB image.

use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};

/// Bytes per packed RGB pixel.
pub const RGB_CHANNELS: usize = 3;

/// A tightly packed, row-major RGB8 image with no row padding.
#[derive(Clone, PartialEq, Eq)]
pub struct RgbImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbImage {
    /// A black image of the given size.
    ///
    /// Fails instead of aborting when the buffer cannot be allocated.
    pub fn try_new(width: u32, height: u32) -> KmsgrabResult<Self> {
        let failed = || KmsgrabError::AllocationFailed { width, height };
        let len = packed_len(width, height).ok_or_else(failed)?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            tracing::warn!(width, height, bytes = len, error = %e, "Image allocation failed");
            failed()
        })?;
        data.resize(len, 0);

        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * RGB_CHANNELS
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Pixel at `(x, y)`. Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = self.offset(x, y);
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let offset = self.offset(x, y);
        self.data[offset..offset + RGB_CHANNELS].copy_from_slice(&rgb);
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} image",
            self.width,
            self.height
        );
        (y as usize * self.width as usize + x as usize) * RGB_CHANNELS
    }
}

impl std::fmt::Debug for RgbImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgbImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn packed_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(RGB_CHANNELS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_image_is_packed_and_black() {
        let image = RgbImage::try_new(5, 3).unwrap();
        assert_eq!(image.as_bytes().len(), 45);
        assert_eq!(image.stride(), 15);
        assert!(image.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn put_and_get_pixel() {
        let mut image = RgbImage::try_new(4, 4).unwrap();
        image.put_pixel(3, 2, [1, 2, 3]);
        assert_eq!(image.pixel(3, 2), [1, 2, 3]);
        assert_eq!(&image.as_bytes()[(2 * 4 + 3) * 3..][..3], &[1, 2, 3]);
    }

    #[test]
    fn overflowing_size_is_an_error() {
        let err = RgbImage::try_new(u32::MAX, u32::MAX).unwrap_err();
        assert!(matches!(
            err,
            KmsgrabError::AllocationFailed {
                width: u32::MAX,
                height: u32::MAX
            }
        ));
        assert_eq!(err.reply_reason(), "allocation failed");
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn size_beyond_address_space_is_an_error() {
        // Fits in usize but exceeds isize::MAX, so the reservation is refused.
        let err = RgbImage::try_new(u32::MAX, 1 << 30).unwrap_err();
        assert!(matches!(err, KmsgrabError::AllocationFailed { .. }));
    }

    #[test]
    fn empty_image_allocates_nothing() {
        let image = RgbImage::try_new(0, 7).unwrap();
        assert!(image.as_bytes().is_empty());
    }
}
