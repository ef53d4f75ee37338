//! # Rasterizer
//!
//! Produces the single-channel bilevel PNG that the print task consumes, at
//! exactly the planned width and height.
//!
//! ## Pipelines
//!
//! ```text
//! bitmap:  decode → flatten on white → grayscale → fit (nearest) → pad → threshold
//! vector:  convert @406ppi → decode → grayscale → fit (triangle) → pad
//!          → [text] unsharp → threshold
//!          → [photo] Floyd-Steinberg
//! ```
//!
//! Vector and document input (PDF, PostScript, SVG, ...) goes through
//! ImageMagick's `convert` first, which flattens it onto a white background
//! at four times the printhead resolution.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};

use crate::error::BridgeError;
use crate::job::Job;
use crate::render::dither::{self, WHITE};
use crate::render::plan::{FitMode, RasterPlan, SourceKind};

/// External rasteriser for vector and document input.
pub const DEFAULT_RASTERIZER: &str = "convert";

/// Input resolution for the external rasteriser (pixels per inch).
pub const VECTOR_DENSITY_PPI: u32 = 406;

/// Unsharp mask sigma for text-mode vector input.
const UNSHARP_SIGMA: f32 = 1.0;

/// Unsharp mask threshold (2% of full scale).
const UNSHARP_THRESHOLD: i32 = 5;

/// Turns job files into printable rasters.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    program: OsString,
    density_ppi: u32,
    show_output: bool,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new(DEFAULT_RASTERIZER)
    }
}

impl Rasterizer {
    /// Use `program` as the external vector rasteriser.
    pub fn new<S: Into<OsString>>(program: S) -> Self {
        Self {
            program: program.into(),
            density_ppi: VECTOR_DENSITY_PPI,
            show_output: false,
        }
    }

    /// Let the external rasteriser write to this process's stdout/stderr.
    pub fn show_output(mut self, show: bool) -> Self {
        self.show_output = show;
        self
    }

    /// Rasterise `job.source` according to `plan` and write `job.raster_path`.
    ///
    /// ## Errors
    ///
    /// [`BridgeError::Raster`] or [`BridgeError::Image`] on decode failure or
    /// when the external rasteriser cannot run or exits non-zero. No output
    /// file is left behind on failure.
    pub fn rasterize(&self, job: &Job, plan: &RasterPlan) -> Result<GrayImage, BridgeError> {
        let gray = match plan.kind {
            SourceKind::Bitmap => flatten_to_gray(decode_bitmap(&job.source)?),
            SourceKind::Vector => {
                let intermediate = job.work_dir().join("source.png");
                self.run_external(&job.source, &intermediate)?;
                flatten_to_gray(image::open(&intermediate)?)
            }
        };

        let filter = match plan.kind {
            SourceKind::Bitmap => FilterType::Nearest,
            SourceKind::Vector => FilterType::Triangle,
        };
        let fitted = match plan.fit {
            FitMode::ContainWhite => contain(&gray, plan.width_px, plan.height_px, filter),
        };

        let mut out = if plan.unsharp {
            imageops::unsharpen(&fitted, UNSHARP_SIGMA, UNSHARP_THRESHOLD)
        } else {
            fitted
        };
        if plan.dither {
            dither::floyd_steinberg(&mut out, plan.threshold);
        } else {
            dither::threshold(&mut out, plan.threshold);
        }

        if let Err(e) = out.save(&job.raster_path) {
            let _ = fs::remove_file(&job.raster_path);
            return Err(e.into());
        }
        Ok(out)
    }

    fn run_external(&self, input: &Path, output: &Path) -> Result<(), BridgeError> {
        let (stdout, stderr) = if self.show_output {
            (Stdio::inherit(), Stdio::inherit())
        } else {
            (Stdio::null(), Stdio::null())
        };

        let status = Command::new(&self.program)
            .args(["-units", "PixelsPerInch", "-density"])
            .arg(self.density_ppi.to_string())
            .arg(input)
            .args(["-colorspace", "Gray", "-alpha", "remove", "-background", "white", "-flatten"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|e| {
                BridgeError::Raster(format!(
                    "failed to run {}: {}",
                    self.program.to_string_lossy(),
                    e
                ))
            })?;

        if !status.success() {
            let _ = fs::remove_file(output);
            return Err(BridgeError::Raster(format!(
                "{} failed ({})",
                self.program.to_string_lossy(),
                status
            )));
        }
        Ok(())
    }
}

/// Decode a bitmap job file.
fn decode_bitmap(path: &Path) -> Result<DynamicImage, BridgeError> {
    #[cfg(feature = "heif")]
    {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if matches!(ext.as_deref(), Some("heic" | "heif")) {
            return heif::decode(path);
        }
    }
    Ok(image::open(path)?)
}

/// Composite any transparency onto white and drop to 8-bit luma.
pub fn flatten_to_gray(img: DynamicImage) -> GrayImage {
    let rgba: RgbaImage = img.to_rgba8();
    let mut flat = RgbaImage::from_pixel(rgba.width(), rgba.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut flat, &rgba, 0, 0);
    DynamicImage::ImageRgba8(flat).to_luma8()
}

/// Scale to fit inside `width`×`height` keeping aspect, centre on white.
pub fn contain(src: &GrayImage, width: u32, height: u32, filter: FilterType) -> GrayImage {
    let mut canvas = GrayImage::from_pixel(width, height, Luma([WHITE]));
    if src.width() == 0 || src.height() == 0 {
        return canvas;
    }

    let scale = f64::min(
        width as f64 / src.width() as f64,
        height as f64 / src.height() as f64,
    );
    let fit_w = ((src.width() as f64 * scale).round() as u32).clamp(1, width);
    let fit_h = ((src.height() as f64 * scale).round() as u32).clamp(1, height);

    let resized = imageops::resize(src, fit_w, fit_h, filter);
    let x = (width - fit_w) / 2;
    let y = (height - fit_h) / 2;
    imageops::overlay(&mut canvas, &resized, x as i64, y as i64);
    canvas
}

/// Copy the final raster under `spool_dir` as `job-<millis>.png`.
///
/// Best effort: failures are logged and never propagate.
pub fn save_debug_copy(raster: &Path, spool_dir: &Path) -> Option<PathBuf> {
    let target = spool_dir.join(format!(
        "job-{}.png",
        chrono::Utc::now().timestamp_millis()
    ));
    let result = fs::create_dir_all(spool_dir).and_then(|_| fs::copy(raster, &target));
    match result {
        Ok(_) => {
            log::info!("Saved debug copy to {}", target.display());
            Some(target)
        }
        Err(e) => {
            log::warn!("could not save debug copy to {}: {}", target.display(), e);
            None
        }
    }
}

#[cfg(feature = "heif")]
mod heif {
    use image::{DynamicImage, RgbImage};
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};
    use std::path::Path;

    use crate::error::BridgeError;

    /// Decode a HEIC/HEIF file using libheif.
    pub fn decode(path: &Path) -> Result<DynamicImage, BridgeError> {
        let data = std::fs::read(path)?;
        let lib_heif = LibHeif::new();
        let ctx = HeifContext::read_from_bytes(&data)
            .map_err(|e| BridgeError::Raster(format!("Failed to read HEIC: {}", e)))?;
        let handle = ctx
            .primary_image_handle()
            .map_err(|e| BridgeError::Raster(format!("Failed to get primary image: {}", e)))?;
        let image = lib_heif
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
            .map_err(|e| BridgeError::Raster(format!("Failed to decode HEIC image: {}", e)))?;

        let planes = image.planes();
        let interleaved = planes
            .interleaved
            .ok_or_else(|| BridgeError::Raster("No interleaved RGB data in HEIC".into()))?;

        let width = image.width();
        let height = image.height();
        let stride = interleaved.stride;
        let data = interleaved.data;

        let mut rgb_image = RgbImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let offset = (y as usize * stride) + (x as usize * 3);
                if offset + 2 < data.len() {
                    let rgb = [data[offset], data[offset + 1], data[offset + 2]];
                    rgb_image.put_pixel(x, y, image::Rgb(rgb));
                }
            }
        }
        Ok(DynamicImage::ImageRgb8(rgb_image))
    }
}

// ============================================================================
// TESTS
// ============================================================================
