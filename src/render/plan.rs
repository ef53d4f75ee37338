//! # Raster Planner
//!
//! Converts a physical label size into the pixel geometry the printhead can
//! address, and picks the image-processing parameters for the render mode.
//!
//! ## Geometry
//!
//! ```text
//! px       = round(mm × 8)            (8 dots/mm ≈ 203 DPI)
//! width_px = max(8, px - px mod 8)    printhead rows are whole bytes
//! height   = max(16, px)              not quantised
//! ```
//!
//! ## Processing Parameters
//!
//! | Mode | Input | Threshold | Dither | Unsharp |
//! |------|-------|-----------|--------|---------|
//! | text | bitmap | configured | no | no |
//! | text | vector | configured | no | yes |
//! | photo | bitmap | 128 | no | no |
//! | photo | vector | 128 | Floyd-Steinberg | no |

use std::path::Path;

use crate::ipp::PhysicalSize;
use crate::render::dither::MIDPOINT;
use crate::settings::{RenderMode, Settings};

/// Dots per millimetre of the printhead.
pub const DOTS_PER_MM: f32 = 8.0;

/// Smallest planned width in pixels.
pub const MIN_WIDTH_PX: u32 = 8;

/// Smallest planned height in pixels.
pub const MIN_HEIGHT_PX: u32 = 16;

/// Threshold used when the configured value does not parse (60%).
pub const DEFAULT_THRESHOLD: u8 = 153;

/// Extensions decoded in-process.
pub const BITMAP_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "tif", "tiff"];

/// Extensions decoded through libheif when the `heif` feature is enabled.
pub const HEIF_EXTENSIONS: &[&str] = &["heic", "heif"];

/// How the source fills the target rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    /// Preserve aspect ratio, centre, pad the remainder with white
    ContainWhite,
}

/// Broad class of the job file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Decoded directly (PNG, JPEG, ...)
    Bitmap,
    /// Needs the external rasteriser first (PDF, PostScript, SVG, ...)
    Vector,
}

impl SourceKind {
    /// Classify by extension, falling back to the front-end's content type.
    pub fn detect(path: &Path, content_type: &str) -> Self {
        let by_ext = mime_guess::from_path(path).first();
        if let Some(mime) = by_ext {
            return if is_bitmap_mime(mime.essence_str()) {
                Self::Bitmap
            } else {
                Self::Vector
            };
        }

        let has_bitmap_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| BITMAP_EXTENSIONS.contains(&e.as_str()) || is_heif_ext(&e));
        if has_bitmap_ext {
            return Self::Bitmap;
        }

        let content_type = content_type.split(';').next().unwrap_or("").trim();
        if is_bitmap_mime(&content_type.to_ascii_lowercase()) {
            Self::Bitmap
        } else {
            Self::Vector
        }
    }
}

fn is_heif_ext(ext: &str) -> bool {
    cfg!(feature = "heif") && HEIF_EXTENSIONS.contains(&ext)
}

fn is_bitmap_mime(mime: &str) -> bool {
    match mime {
        "image/png" | "image/jpeg" | "image/webp" | "image/gif" | "image/tiff" => true,
        "image/heic" | "image/heif" => cfg!(feature = "heif"),
        _ => false,
    }
}

/// Pixel geometry and processing parameters for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterPlan {
    pub width_px: u32,
    pub height_px: u32,
    pub fit: FitMode,
    /// Luma level separating black from white
    pub threshold: u8,
    /// Error diffusion instead of a hard threshold
    pub dither: bool,
    /// Sharpen before thresholding
    pub unsharp: bool,
    pub kind: SourceKind,
}

impl RasterPlan {
    pub fn new(size: PhysicalSize, settings: &Settings, kind: SourceKind) -> Self {
        let (width_px, height_px) = dimensions(size);
        let (threshold, dither, unsharp) = match settings.render {
            RenderMode::Photo => (MIDPOINT, kind == SourceKind::Vector, false),
            RenderMode::Text => (
                parse_threshold(&settings.threshold),
                false,
                kind == SourceKind::Vector,
            ),
        };
        Self {
            width_px,
            height_px,
            fit: FitMode::ContainWhite,
            threshold,
            dither,
            unsharp,
            kind,
        }
    }
}

/// Millimetres to printhead dots.
#[inline]
pub fn mm_to_px(mm: f32) -> u32 {
    (mm * DOTS_PER_MM).round().max(0.0) as u32
}

/// Planned `(width, height)` in pixels for a label size.
pub fn dimensions(size: PhysicalSize) -> (u32, u32) {
    let raw_width = mm_to_px(size.width_mm);
    let width = (raw_width - raw_width % 8).max(MIN_WIDTH_PX);
    let height = mm_to_px(size.height_mm).max(MIN_HEIGHT_PX);
    (width, height)
}

/// Parse the configured threshold into a luma level.
///
/// - `"60%"` → `round(60 × 255 / 100)` = 153
/// - `"150"` → 150 (clamped to 0-255)
/// - anything else → [`DEFAULT_THRESHOLD`]
///
/// Bitmap and vector input share this level. A percentage is always scaled
/// to the full 0-255 range, never read as a bare level: `"60%"` is 153 for
/// a PNG too, so luma 60-152 prints black rather than white.
pub fn parse_threshold(s: &str) -> u8 {
    let s = s.trim();
    if let Some(percent) = s.strip_suffix('%') {
        return match percent.trim().parse::<f32>() {
            Ok(p) if p.is_finite() => (p.clamp(0.0, 100.0) * 255.0 / 100.0).round() as u8,
            _ => DEFAULT_THRESHOLD,
        };
    }
    match s.parse::<i64>() {
        Ok(n) => n.clamp(0, 255) as u8,
        Err(_) => DEFAULT_THRESHOLD,
    }
}

// ============================================================================
// TESTS
// ============================================================================
