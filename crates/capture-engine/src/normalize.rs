//! Framebuffer memory to packed RGB conversion.
//!
//! Strips the per-row pitch padding and expands the native pixel encoding
//! into [`RgbImage`]. The converter is picked once per frame from the
//! [`PixelFormat`], never per pixel.

use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};
use kmsgrab_platform_core::{FramebufferDescriptor, PixelFormat};

use crate::rgb::{RgbImage, RGB_CHANNELS};

/// Expand one 5-6-5 pixel.
#[inline]
pub fn rgb565_to_rgb(px: u16) -> [u8; 3] {
    [
        ((px & 0xf800) >> 8) as u8,
        ((px & 0x07e0) >> 3) as u8,
        ((px & 0x001f) << 3) as u8,
    ]
}

/// Expand one `x:r:g:b` pixel, ignoring the top byte.
#[inline]
pub fn xrgb8888_to_rgb(px: u32) -> [u8; 3] {
    [(px >> 16) as u8, (px >> 8) as u8, px as u8]
}

type RowConverter = fn(&[u8], &mut [u8]);

fn convert_row_rgb565(src: &[u8], dst: &mut [u8]) {
    for (px, out) in src.chunks_exact(2).zip(dst.chunks_exact_mut(RGB_CHANNELS)) {
        out.copy_from_slice(&rgb565_to_rgb(u16::from_le_bytes([px[0], px[1]])));
    }
}

fn convert_row_xrgb8888(src: &[u8], dst: &mut [u8]) {
    for (px, out) in src.chunks_exact(4).zip(dst.chunks_exact_mut(RGB_CHANNELS)) {
        out.copy_from_slice(&xrgb8888_to_rgb(u32::from_le_bytes([
            px[0], px[1], px[2], px[3],
        ])));
    }
}

fn row_converter(format: PixelFormat) -> RowConverter {
    match format {
        PixelFormat::Rgb565 => convert_row_rgb565,
        PixelFormat::Rgb888x => convert_row_xrgb8888,
    }
}

/// Copy the framebuffer out of `memory` into a fresh, padding-free RGB image.
pub fn normalize(fb: &FramebufferDescriptor, memory: &[u8]) -> KmsgrabResult<RgbImage> {
    let format = PixelFormat::from_bpp(fb.bpp)?;
    fb.validate()?;

    let pitch = fb.pitch as usize;
    let row_bytes = fb.row_bytes();
    let needed = fb.mapping_len();
    if memory.len() < needed {
        return Err(KmsgrabError::invalid_geometry(format!(
            "mapping holds {} bytes, framebuffer needs {needed}",
            memory.len()
        )));
    }

    let convert = row_converter(format);
    let mut image = RgbImage::try_new(fb.width, fb.height)?;
    let stride = image.stride();

    if stride > 0 {
        for (y, out_row) in image.as_bytes_mut().chunks_exact_mut(stride).enumerate() {
            let start = y * pitch;
            convert(&memory[start..start + row_bytes], out_row);
        }
    }

    tracing::debug!(
        width = fb.width,
        height = fb.height,
        ?format,
        pitch,
        padding = pitch - row_bytes,
        "Normalized framebuffer"
    );
    Ok(image)
}
