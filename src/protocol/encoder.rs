//! # Image Encoder
//!
//! Turns a bilevel raster into printhead rows for a given feed direction.
//!
//! The printhead prints one row across the label at a time. For `top` feed
//! the image rows are sent as-is; other directions rotate the image first so
//! that the printed result reads correctly:
//!
//! | Direction | Rotation (clockwise) |
//! |-----------|----------------------|
//! | top | 0° |
//! | left | 90° |
//! | bottom | 180° |
//! | right | 270° |
//!
//! A bitmap row packet has a one-byte length, so a row can be at most
//! [`MAX_COLS`] dots wide; the page-size command caps rows at [`MAX_ROWS`].

use image::GrayImage;
use image::imageops;

use crate::error::BridgeError;
use crate::protocol::commands::BITMAP_ROW_HEADER;
use crate::protocol::packet::MAX_PAYLOAD;
use crate::render::dither::{self, MIDPOINT};
use crate::settings::Direction;

/// Widest row a bitmap row packet can carry.
pub const MAX_COLS: usize = (MAX_PAYLOAD - BITMAP_ROW_HEADER) * 8;

/// Most rows a page can declare.
pub const MAX_ROWS: usize = u16::MAX as usize;

/// A raster ready to stream to the printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Printhead dots per row
    pub cols: u16,
    /// Packed rows, MSB first, 1 = black
    pub rows: Vec<Vec<u8>>,
}

impl EncodedImage {
    /// Check that the geometry fits the wire format.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let cols = self.cols as usize;
        if cols > MAX_COLS {
            return Err(BridgeError::Print(format!(
                "label is {} dots across the printhead, at most {} are supported",
                cols, MAX_COLS
            )));
        }
        if self.rows.len() > MAX_ROWS {
            return Err(BridgeError::Print(format!(
                "label is {} rows long, at most {} are supported",
                self.rows.len(),
                MAX_ROWS
            )));
        }
        if let Some(row) = self.rows.iter().find(|r| r.len() != cols.div_ceil(8)) {
            return Err(BridgeError::Print(format!(
                "row holds {} bytes, expected {} for {} dots",
                row.len(),
                cols.div_ceil(8),
                cols
            )));
        }
        Ok(())
    }

    pub fn row_count(&self) -> u16 {
        self.rows.len() as u16
    }

    /// Consecutive identical rows as `(first_row, repeat, bits)`, with
    /// `repeat` capped at 255.
    pub fn runs(&self) -> Vec<(u16, u8, &[u8])> {
        let mut runs: Vec<(u16, u8, &[u8])> = Vec::new();
        for (y, row) in self.rows.iter().enumerate() {
            match runs.last_mut() {
                Some((_, repeat, bits)) if *bits == row.as_slice() && *repeat < u8::MAX => {
                    *repeat += 1;
                }
                _ => runs.push((y as u16, 1, row.as_slice())),
            }
        }
        runs
    }
}

/// Rotate for `direction` and pack into printhead rows.
///
/// ## Errors
///
/// [`BridgeError::Print`] when the oriented raster is wider than
/// [`MAX_COLS`] or longer than [`MAX_ROWS`].
pub fn encode_image(img: &GrayImage, direction: Direction) -> Result<EncodedImage, BridgeError> {
    let oriented = match direction {
        Direction::Top => img.clone(),
        Direction::Left => imageops::rotate90(img),
        Direction::Bottom => imageops::rotate180(img),
        Direction::Right => imageops::rotate270(img),
    };
    let cols = oriented.width() as usize;
    let rows = oriented.height() as usize;
    if cols > MAX_COLS || rows > MAX_ROWS {
        return Err(BridgeError::Print(format!(
            "{}x{} raster fed {} needs {} dots per row and {} rows (limits {} and {})",
            img.width(),
            img.height(),
            direction,
            cols,
            rows,
            MAX_COLS,
            MAX_ROWS
        )));
    }

    let rows = oriented
        .rows()
        .map(|row| {
            let pixels: Vec<bool> = row.map(|p| p.0[0] < MIDPOINT).collect();
            dither::pack_row(&pixels)
        })
        .collect();

    Ok(EncodedImage {
        cols: cols as u16,
        rows,
    })
}

/// True when a packed row prints nothing.
pub fn is_blank(bits: &[u8]) -> bool {
    bits.iter().all(|&b| b == 0)
}

// ============================================================================
// TESTS
// ============================================================================
