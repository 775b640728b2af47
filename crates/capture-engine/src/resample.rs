//! Output sizing and image resampling.

use kmsgrab_common::config::ScaleFilter;
use kmsgrab_common::error::{KmsgrabError, KmsgrabResult};

use crate::rgb::{RgbImage, RGB_CHANNELS};

const FIXED_ONE: u64 = 1 << 16;
const FIXED_MASK: u64 = FIXED_ONE - 1;
const ROUND_HALF: u64 = 1 << 31;

/// Largest width or height an output image may have.
pub const MAX_OUTPUT_DIMENSION: u32 = 65_535;

/// Work out the output size from the source size and the requested size.
///
/// A zero request means "native" when both are zero, and "derive from the
/// other dimension keeping the aspect ratio" when only one is. Results above
/// [`MAX_OUTPUT_DIMENSION`] on either axis are rejected.
pub fn resolve_output_size(
    src_w: u32,
    src_h: u32,
    req_w: u32,
    req_h: u32,
) -> KmsgrabResult<(u32, u32)> {
    let invalid = || KmsgrabError::InvalidOutputSize {
        width: req_w,
        height: req_h,
    };

    let (w, h) = match (req_w, req_h) {
        (0, 0) => (src_w, src_h),
        (w, 0) => {
            if src_w == 0 {
                return Err(invalid());
            }
            (w, scale_dimension(w, src_h, src_w).ok_or_else(invalid)?)
        }
        (0, h) => {
            if src_h == 0 {
                return Err(invalid());
            }
            (scale_dimension(h, src_w, src_h).ok_or_else(invalid)?, h)
        }
        (w, h) => (w, h),
    };

    if w == 0 || h == 0 || w > MAX_OUTPUT_DIMENSION || h > MAX_OUTPUT_DIMENSION {
        return Err(invalid());
    }
    Ok((w, h))
}

fn scale_dimension(requested: u32, other: u32, known: u32) -> Option<u32> {
    let scaled = u64::from(requested) * u64::from(other) / u64::from(known);
    u32::try_from(scaled).ok()
}

/// Resample `src` to `dst_w` x `dst_h` with the chosen filter.
pub fn resample(
    src: &RgbImage,
    dst_w: u32,
    dst_h: u32,
    filter: ScaleFilter,
) -> KmsgrabResult<RgbImage> {
    let mut dst = RgbImage::try_new(dst_w, dst_h)?;
    if src.width() == 0 || src.height() == 0 || dst_w == 0 || dst_h == 0 {
        return Ok(dst);
    }

    match filter {
        ScaleFilter::Nearest => nearest(src, &mut dst),
        ScaleFilter::Bilinear => bilinear(src, &mut dst),
    }

    tracing::debug!(
        src_width = src.width(),
        src_height = src.height(),
        dst_width = dst_w,
        dst_height = dst_h,
        ?filter,
        "Resampled image"
    );
    Ok(dst)
}

fn nearest_index(d: u32, src_dim: u32, dst_dim: u32) -> usize {
    (u64::from(d) * u64::from(src_dim) / u64::from(dst_dim)) as usize
}

fn nearest(src: &RgbImage, dst: &mut RgbImage) {
    let (src_w, src_h) = src.dimensions();
    let (dst_w, dst_h) = dst.dimensions();
    let src_stride = src.stride();
    let dst_stride = dst.stride();
    let src_bytes = src.as_bytes();

    let columns: Vec<usize> = (0..dst_w)
        .map(|x| nearest_index(x, src_w, dst_w) * RGB_CHANNELS)
        .collect();

    for (y, out_row) in dst.as_bytes_mut().chunks_exact_mut(dst_stride).enumerate() {
        let sy = nearest_index(y as u32, src_h, dst_h);
        let src_row = &src_bytes[sy * src_stride..(sy + 1) * src_stride];
        for (out, &sx) in out_row.chunks_exact_mut(RGB_CHANNELS).zip(&columns) {
            out.copy_from_slice(&src_row[sx..sx + RGB_CHANNELS]);
        }
    }
}

/// Neighbour indices and the 16-bit fraction toward the second one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tap {
    i0: usize,
    i1: usize,
    frac: u64,
}

fn bilinear_tap(d: u32, src_dim: u32, dst_dim: u32) -> Tap {
    let s = if dst_dim > 1 {
        ((u64::from(d) * u64::from(src_dim - 1)) << 16) / u64::from(dst_dim - 1)
    } else {
        0
    };
    let i0 = (s >> 16) as usize;
    let i1 = (i0 + 1).min(src_dim as usize - 1);
    Tap {
        i0,
        i1,
        frac: s & FIXED_MASK,
    }
}

fn bilinear(src: &RgbImage, dst: &mut RgbImage) {
    let (src_w, src_h) = src.dimensions();
    let (dst_w, dst_h) = dst.dimensions();
    let src_stride = src.stride();
    let dst_stride = dst.stride();
    let src_bytes = src.as_bytes();

    let columns: Vec<Tap> = (0..dst_w).map(|x| bilinear_tap(x, src_w, dst_w)).collect();

    for (y, out_row) in dst.as_bytes_mut().chunks_exact_mut(dst_stride).enumerate() {
        let ty = bilinear_tap(y as u32, src_h, dst_h);
        let row0 = &src_bytes[ty.i0 * src_stride..(ty.i0 + 1) * src_stride];
        let row1 = &src_bytes[ty.i1 * src_stride..(ty.i1 + 1) * src_stride];
        let fy = ty.frac;

        for (out, tx) in out_row.chunks_exact_mut(RGB_CHANNELS).zip(&columns) {
            let fx = tx.frac;
            let w00 = (FIXED_ONE - fx) * (FIXED_ONE - fy);
            let w10 = fx * (FIXED_ONE - fy);
            let w01 = (FIXED_ONE - fx) * fy;
            let w11 = fx * fy;

            let x0 = tx.i0 * RGB_CHANNELS;
            let x1 = tx.i1 * RGB_CHANNELS;
            for c in 0..RGB_CHANNELS {
                let acc = u64::from(row0[x0 + c]) * w00
                    + u64::from(row0[x1 + c]) * w10
                    + u64::from(row1[x0 + c]) * w01
                    + u64::from(row1[x1 + c]) * w11;
                out[c] = ((acc + ROUND_HALF) >> 32) as u8;
            }
        }
    }
}
