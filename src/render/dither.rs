//! # Bilevel Conversion
//!
//! Thermal printers print black dots or nothing. This module reduces an
//! 8-bit grayscale raster to exactly two levels (0 = black, 255 = white) and
//! packs rows into the MSB-first bit layout the printer expects.
//!
//! ## Methods
//!
//! | Method | Used for | Behaviour |
//! |--------|----------|-----------|
//! | [`threshold`] | text mode, all bitmap input | `luma >= level` → white |
//! | [`floyd_steinberg`] | photo mode, vector input | error diffusion at a fixed midpoint |
//!
//! ## Floyd-Steinberg Error Diffusion
//!
//! Each pixel is snapped to black or white and the quantisation error is
//! pushed to unvisited neighbours:
//!
//! ```text
//!            X    7/16
//!   3/16   5/16   1/16
//! ```
//!
//! ## Usage Example
//!
//! ```
//! use image::{GrayImage, Luma};
//! use niimbridge::render::dither;
//!
//! let mut img = GrayImage::from_pixel(8, 8, Luma([200]));
//! dither::threshold(&mut img, 153);
//! assert!(dither::is_bilevel(&img));
//! ```

use image::{GrayImage, Luma};

/// Luma value of a printed dot.
pub const BLACK: u8 = 0;

/// Luma value of blank paper.
pub const WHITE: u8 = 255;

/// Midpoint used for photo rendering.
pub const MIDPOINT: u8 = 128;

/// Hard threshold: pixels at or above `level` become white, the rest black.
pub fn threshold(img: &mut GrayImage, level: u8) {
    for pixel in img.pixels_mut() {
        pixel.0[0] = if pixel.0[0] >= level { WHITE } else { BLACK };
    }
}

/// Floyd-Steinberg dithering to two colours around `level`.
pub fn floyd_steinberg(img: &mut GrayImage, level: u8) {
    let width = img.width() as usize;
    let height = img.height() as usize;
    if width == 0 || height == 0 {
        return;
    }

    // Two rolling error rows: current and next
    let mut current = vec![0f32; width + 2];
    let mut next = vec![0f32; width + 2];

    for y in 0..height {
        for x in 0..width {
            let old = img.get_pixel(x as u32, y as u32).0[0] as f32 + current[x + 1];
            let new = if old >= level as f32 { WHITE } else { BLACK };
            let err = old - new as f32;
            img.put_pixel(x as u32, y as u32, Luma([new]));

            current[x + 2] += err * 7.0 / 16.0;
            next[x] += err * 3.0 / 16.0;
            next[x + 1] += err * 5.0 / 16.0;
            next[x + 2] += err * 1.0 / 16.0;
        }
        std::mem::swap(&mut current, &mut next);
        next.iter_mut().for_each(|e| *e = 0.0);
    }
}

/// True when every pixel is pure black or pure white.
pub fn is_bilevel(img: &GrayImage) -> bool {
    img.pixels().all(|p| p.0[0] == BLACK || p.0[0] == WHITE)
}

/// Pack a row of boolean pixel values into bytes.
///
/// ## Bit Packing
///
/// - Bit 7 (MSB) = leftmost pixel
/// - 1 = black (print dot), 0 = white (no dot)
///
/// If the row length is not a multiple of 8, the last byte is padded
/// with zeros (white) on the right.
///
/// ## Example
///
/// ```
/// use niimbridge::render::dither::pack_row;
///
/// let row = vec![true, true, false, false, true, false, true, false];
/// assert_eq!(pack_row(&row), vec![0b11001010]);
///
/// // 12 pixels pack into 2 bytes (4 bits padding)
/// let row = vec![true; 12];
/// assert_eq!(pack_row(&row), vec![0xFF, 0xF0]);
/// ```
pub fn pack_row(pixels: &[bool]) -> Vec<u8> {
    let num_bytes = pixels.len().div_ceil(8);
    let mut bytes = vec![0u8; num_bytes];

    for (i, &pixel) in pixels.iter().enumerate() {
        if pixel {
            let byte_idx = i / 8;
            let bit_idx = 7 - (i % 8); // MSB first
            bytes[byte_idx] |= 1 << bit_idx;
        }
    }

    bytes
}

// ============================================================================
// TESTS
// ============================================================================
