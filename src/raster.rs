//! Pure pixel transforms over RGBA buffers.
//!
//! The worker pipeline for one page is `flatten` onto the paper color, then
//! `invert` when dark mode is active. Flattening must happen first: a
//! translucent pixel composited over white and then inverted lands on the
//! dark background, while the reverse order leaves the background color
//! wrong wherever the source was translucent.

use fast_image_resize as fr;

use crate::backend::RgbaFrame;
use crate::error::{AppError, AppResult};
use crate::geometry::Rotation;

/// Paper color pages are composited onto before any theming.
pub const WHITE: [u8; 3] = [255, 255, 255];

pub(crate) const DISPLAY_RESIZE_FILTER: fr::FilterType = fr::FilterType::CatmullRom;

const INVERT_LUT: [u8; 256] = build_invert_lut();

const fn build_invert_lut() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut value = 0;
    while value < 256 {
        table[value] = (255 - value) as u8;
        value += 1;
    }
    table
}

/// Composites translucent RGBA pixels over `background`, forcing alpha to
/// fully opaque.
pub fn flatten_in_place(pixels: &mut [u8], background: [u8; 3]) {
    for pixel in pixels.chunks_exact_mut(4) {
        let alpha = pixel[3] as u16;
        if alpha == 255 {
            continue;
        }
        let inverse = 255 - alpha;
        for channel in 0..3 {
            let source = pixel[channel] as u16;
            let base = background[channel] as u16;
            pixel[channel] = ((source * alpha + base * inverse + 127) / 255) as u8;
        }
        pixel[3] = 255;
    }
}

/// Per-channel table inversion of R/G/B; alpha is untouched.
pub fn invert_in_place(pixels: &mut [u8]) {
    for pixel in pixels.chunks_exact_mut(4) {
        pixel[0] = INVERT_LUT[pixel[0] as usize];
        pixel[1] = INVERT_LUT[pixel[1] as usize];
        pixel[2] = INVERT_LUT[pixel[2] as usize];
    }
}

/// The worker-side transform pipeline for one rasterized page.
pub fn compose_page(raw: &RgbaFrame, dark_mode: bool) -> RgbaFrame {
    let mut pixels = raw.pixels_to_vec();
    flatten_in_place(&mut pixels, WHITE);
    if dark_mode {
        invert_in_place(&mut pixels);
    }
    RgbaFrame {
        width: raw.width,
        height: raw.height,
        pixels: pixels.into(),
    }
}

/// Rotates an RGBA buffer by a quarter-turn multiple.
pub fn rotate_quarter(frame: &RgbaFrame, rotation: Rotation) -> RgbaFrame {
    if rotation == Rotation::Deg0 {
        return frame.clone();
    }

    let src_width = frame.width as usize;
    let src_height = frame.height as usize;
    let (dst_width, dst_height) = if rotation.swaps_axes() {
        (src_height, src_width)
    } else {
        (src_width, src_height)
    };

    let src = frame.pixels.as_ref();
    let mut dst = vec![0u8; src.len()];
    for y in 0..src_height {
        for x in 0..src_width {
            let (dst_x, dst_y) = match rotation {
                Rotation::Deg0 => (x, y),
                Rotation::Deg90 => (src_height - 1 - y, x),
                Rotation::Deg180 => (src_width - 1 - x, src_height - 1 - y),
                Rotation::Deg270 => (y, src_width - 1 - x),
            };
            let src_offset = (y * src_width + x) * 4;
            let dst_offset = (dst_y * dst_width + dst_x) * 4;
            dst[dst_offset..dst_offset + 4].copy_from_slice(&src[src_offset..src_offset + 4]);
        }
    }

    RgbaFrame {
        width: dst_width as u32,
        height: dst_height as u32,
        pixels: dst.into(),
    }
}

/// Convolution resize for surfaces that materialize zoom into pixels.
pub fn resize_frame(frame: &RgbaFrame, dst_width: u32, dst_height: u32) -> AppResult<RgbaFrame> {
    if frame.width == dst_width && frame.height == dst_height {
        return Ok(frame.clone());
    }
    if dst_width == 0 || dst_height == 0 {
        return Err(AppError::invalid_argument(
            "resize target dimensions must be non-zero",
        ));
    }

    let src = fr::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.pixels_to_vec(),
        fr::PixelType::U8x4,
    )
    .map_err(|_| {
        AppError::invalid_argument("rgba frame pixels length does not match dimensions")
    })?;

    let mut dst = fr::images::Image::new(dst_width, dst_height, fr::PixelType::U8x4);
    let mut resizer = fr::Resizer::new();
    let options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(DISPLAY_RESIZE_FILTER));

    resizer
        .resize(&src, &mut dst, &options)
        .map_err(|_| AppError::invalid_argument("failed to resize frame"))?;

    Ok(RgbaFrame {
        width: dst_width,
        height: dst_height,
        pixels: dst.into_vec().into(),
    })
}
