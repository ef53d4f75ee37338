//! # Printer Models and Quirks
//!
//! Hardware facts about NIIMBOT label printers and the rule table for
//! devices whose self-reported metadata is known to be wrong.
//!
//! ## Model Families
//!
//! | Family | Example | Default direction |
//! |--------|---------|-------------------|
//! | D-series (narrow, side-fed) | D11, D110, D110_M | left |
//! | B-series (wide) | B1, B21, B203 | top |
//!
//! The printer reports a numeric model id ([`MODEL_IDS`]); the advertised
//! Bluetooth name is used when the id is unknown.
//!
//! ## Quirks
//!
//! The D100_M / D110_M report `left` but print correctly only with `top`.

use std::sync::LazyLock;

use regex::Regex;

use crate::settings::Direction;

/// Model identifiers returned by the `PrinterModelId` info query.
pub const MODEL_IDS: &[(u64, &str)] = &[
    (256, "B3S"),
    (257, "B3S"),
    (258, "B3S"),
    (512, "D11"),
    (514, "D11"),
    (528, "D11_H"),
    (768, "B21"),
    (769, "B21"),
    (770, "B21"),
    (771, "B21"),
    (1792, "B18"),
    (2304, "D110"),
    (2305, "D110"),
    (2320, "D110_M"),
    (2560, "D101"),
    (4096, "B1"),
    (4097, "B1"),
];

/// Default direction when a model is unknown or reports nothing.
pub const FALLBACK_DIRECTION: Direction = Direction::Top;

/// What the device tells us about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMetadata {
    /// Model identifier, e.g. `D110_M`
    pub model: String,
    /// Direction the device reports as its default
    pub print_direction: Direction,
}

impl ModelMetadata {
    /// Metadata derived from an advertised device name such as `D110_M-H12345`.
    ///
    /// Returns `None` for names that carry no recognisable model.
    pub fn from_device_name(name: &str) -> Option<Self> {
        let model = name.split('-').next()?.trim();
        if model.is_empty() {
            return None;
        }
        Self::from_model(model)
    }

    /// Metadata for a numeric model id reported by the printer.
    pub fn from_model_id(id: u64) -> Option<Self> {
        let (_, model) = MODEL_IDS.iter().find(|(known, _)| *known == id)?;
        Self::from_model(model)
    }

    fn from_model(model: &str) -> Option<Self> {
        let print_direction = family_direction(model)?;
        Some(Self {
            model: model.to_string(),
            print_direction,
        })
    }
}

/// Default direction for a model family.
pub fn family_direction(model: &str) -> Option<Direction> {
    let mut chars = model.chars();
    let series = chars.next()?.to_ascii_uppercase();
    if !chars.next()?.is_ascii_digit() {
        return None;
    }
    match series {
        'D' => Some(Direction::Left),
        'B' => Some(Direction::Top),
        _ => None,
    }
}

/// One known-bad metadata report and its correction.
#[derive(Debug)]
pub struct DirectionQuirk {
    /// Matches the model identifier
    pub model: Regex,
    /// Direction the device wrongly reports
    pub reported: Direction,
    /// Direction that actually works
    pub forced: Direction,
}

impl DirectionQuirk {
    pub fn applies(&self, metadata: &ModelMetadata) -> bool {
        metadata.print_direction == self.reported && self.model.is_match(&metadata.model)
    }
}

/// Shipped quirk rules.
pub static DIRECTION_QUIRKS: LazyLock<Vec<DirectionQuirk>> = LazyLock::new(|| {
    vec![DirectionQuirk {
        model: Regex::new(r"(?i)D1(00|10)_?M").expect("valid regex"),
        reported: Direction::Left,
        forced: Direction::Top,
    }]
});

/// Apply the first matching quirk to device metadata.
pub fn corrected_direction(metadata: &ModelMetadata, quirks: &[DirectionQuirk]) -> Option<Direction> {
    quirks.iter().find(|q| q.applies(metadata)).map(|q| q.forced)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_from_name() {
        let meta = ModelMetadata::from_device_name("D110_M-H123456789").unwrap();
        assert_eq!(meta.model, "D110_M");
        assert_eq!(meta.print_direction, Direction::Left);

        let meta = ModelMetadata::from_device_name("B1-G220").unwrap();
        assert_eq!(meta.print_direction, Direction::Top);

        assert!(ModelMetadata::from_device_name("/dev/rfcomm0").is_none());
        assert!(ModelMetadata::from_device_name("Kitchen").is_none());
    }

    #[test]
    fn test_metadata_from_model_id() {
        let meta = ModelMetadata::from_model_id(2320).unwrap();
        assert_eq!(meta.model, "D110_M");
        assert_eq!(meta.print_direction, Direction::Left);
        assert_eq!(corrected_direction(&meta, &DIRECTION_QUIRKS), Some(Direction::Top));

        assert_eq!(ModelMetadata::from_model_id(4096).unwrap().print_direction, Direction::Top);
        assert!(ModelMetadata::from_model_id(0).is_none());
    }

    #[test]
    fn test_d110m_quirk() {
        let meta = ModelMetadata {
            model: "D110_M".into(),
            print_direction: Direction::Left,
        };
        assert_eq!(corrected_direction(&meta, &DIRECTION_QUIRKS), Some(Direction::Top));

        let meta = ModelMetadata {
            model: "d100m".into(),
            print_direction: Direction::Left,
        };
        assert_eq!(corrected_direction(&meta, &DIRECTION_QUIRKS), Some(Direction::Top));
    }

    #[test]
    fn test_quirk_needs_left_report() {
        let meta = ModelMetadata {
            model: "D110_M".into(),
            print_direction: Direction::Top,
        };
        assert_eq!(corrected_direction(&meta, &DIRECTION_QUIRKS), None);
    }

    #[test]
    fn test_plain_d110_untouched() {
        let meta = ModelMetadata {
            model: "D110".into(),
            print_direction: Direction::Left,
        };
        assert_eq!(corrected_direction(&meta, &DIRECTION_QUIRKS), None);
    }
}
