//! # Protocol-Attribute Interpreter
//!
//! The print front-end hands job attributes over as environment variables.
//! This module turns them into a physical label size and a thermal density,
//! and writes the completion attributes back on the diagnostic stream.
//!
//! ## Size Resolution
//!
//! 1. `IPP_MEDIA_COL`: `x-dimension=` / `y-dimension=` in hundredths of a
//!    millimetre, rounded to whole millimetres, floored at 6mm
//! 2. `IPP_MEDIA`: a keyword containing `<WW>x<HHH>mm`, e.g. `om_12x40mm`
//! 3. 12×40mm
//!
//! ## Density Resolution
//!
//! `IPP_PRINT_DARKNESS` (0-100) maps to `round(d / 20)` clamped to 1-5.
//! Without a darkness value, `IPP_PRINT_QUALITY` decides:
//!
//! | Quality | Density |
//! |---------|---------|
//! | draft | 2 |
//! | normal / unset / other | 3 |
//! | high | 5 |

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::LazyLock;

use regex::Regex;

pub const ENV_MEDIA_COL: &str = "IPP_MEDIA_COL";
pub const ENV_MEDIA: &str = "IPP_MEDIA";
pub const ENV_PRINT_QUALITY: &str = "IPP_PRINT_QUALITY";
pub const ENV_PRINT_DARKNESS: &str = "IPP_PRINT_DARKNESS";
pub const ENV_CONTENT_TYPE: &str = "CONTENT_TYPE";

/// Smallest label edge accepted from a media collection.
pub const MIN_EDGE_MM: f32 = 6.0;

/// Label size used when the front-end supplies none.
pub const DEFAULT_SIZE: PhysicalSize = PhysicalSize {
    width_mm: 12.0,
    height_mm: 40.0,
};

static X_DIMENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)x-dimension\s*=\s*([0-9]+)").expect("valid regex"));
static Y_DIMENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)y-dimension\s*=\s*([0-9]+)").expect("valid regex"));
static MEDIA_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]{2})x([0-9]{2,3})mm").expect("valid regex"));

// ============================================================================
// TYPES
// ============================================================================

/// Print quality keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Draft,
    Normal,
    High,
}

impl Quality {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Label size in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalSize {
    pub width_mm: f32,
    pub height_mm: f32,
}

/// Thermal intensity, always within 1-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Density(u8);

impl Density {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Clamp any value into the valid range.
    pub fn new(value: i64) -> Self {
        Self(value.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    /// Map a 0-100 darkness percentage.
    pub fn from_darkness(darkness: i64) -> Self {
        let d = darkness.clamp(0, 100);
        // round(d / 20), half away from zero
        Self::new((d + 10) / 20)
    }

    pub fn from_quality(quality: Option<Quality>) -> Self {
        match quality {
            Some(Quality::Draft) => Self(2),
            Some(Quality::High) => Self(5),
            _ => Self(3),
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Raw job attributes from the print front-end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolHints {
    pub media_col: String,
    pub media: String,
    pub quality: Option<Quality>,
    /// Darkness as supplied; non-numeric values are ignored
    pub darkness: Option<i64>,
    pub content_type: String,
}

impl ProtocolHints {
    /// Read the attributes from the process environment.
    pub fn from_env() -> Self {
        Self::from_map(&crate::settings::env_map())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        let get = |key: &str| vars.get(key).cloned().unwrap_or_default();
        Self {
            media_col: get(ENV_MEDIA_COL),
            media: get(ENV_MEDIA),
            quality: Quality::parse(&get(ENV_PRINT_QUALITY)),
            darkness: get(ENV_PRINT_DARKNESS).trim().parse().ok(),
            content_type: get(ENV_CONTENT_TYPE),
        }
    }

    /// Physical label size from media-col, then media keyword, then default.
    pub fn physical_size(&self) -> PhysicalSize {
        parse_media_col(&self.media_col)
            .or_else(|| parse_media_keyword(&self.media))
            .unwrap_or(DEFAULT_SIZE)
    }

    pub fn density(&self) -> Density {
        match self.darkness {
            Some(d) => Density::from_darkness(d),
            None => Density::from_quality(self.quality),
        }
    }
}

// ============================================================================
// PARSERS
// ============================================================================

fn capture_u64(re: &Regex, s: &str) -> Option<u64> {
    re.captures(s)?.get(1)?.as_str().parse().ok()
}

/// Parse a media-col descriptor (dimensions in hundredths of a millimetre).
///
/// Both dimensions must be present. Each is rounded to whole millimetres and
/// floored at [`MIN_EDGE_MM`].
pub fn parse_media_col(media_col: &str) -> Option<PhysicalSize> {
    let x = capture_u64(&X_DIMENSION, media_col)?;
    let y = capture_u64(&Y_DIMENSION, media_col)?;
    let to_mm = |hundredths: u64| (((hundredths + 50) / 100) as f32).max(MIN_EDGE_MM);
    Some(PhysicalSize {
        width_mm: to_mm(x),
        height_mm: to_mm(y),
    })
}

/// Parse a media keyword such as `om_20x50mm`. No minimum is applied.
pub fn parse_media_keyword(media: &str) -> Option<PhysicalSize> {
    let caps = MEDIA_KEYWORD.captures(media)?;
    let width: u32 = caps.get(1)?.as_str().parse().ok()?;
    let height: u32 = caps.get(2)?.as_str().parse().ok()?;
    Some(PhysicalSize {
        width_mm: width as f32,
        height_mm: height as f32,
    })
}

// ============================================================================
// COMPLETION SIGNALING
// ============================================================================

/// Tell the front-end the job finished so it clears it from the queue.
pub fn report_completion<W: Write>(out: &mut W, impressions: u32) -> io::Result<()> {
    writeln!(
        out,
        "ATTR: job-impressions={impressions} job-impressions-completed={impressions}"
    )?;
    writeln!(out, "INFO: Print complete")?;
    out.flush()
}

// ============================================================================
// TESTS
// ============================================================================
