//! # Print Orchestrator
//!
//! Connects to the printer, settles the feed direction, encodes the raster
//! and transmits it.
//!
//! ## Session States
//!
//! ```text
//! Disconnected → Connected → Encoding → Transmitting → Completed
//!                    │           │            │
//!                    └───────────┴────────────┴──→ Failed
//!                                                    │
//!                          (always) ─────────────────┴──→ Disconnected
//! ```
//!
//! The link is owned by a [`LinkSession`] guard that disconnects exactly
//! once when it goes out of scope, whatever happened before.
//!
//! ## Direction Resolution
//!
//! 1. explicit override from settings
//! 2. quirk table correction of the device-reported direction
//! 3. device-reported direction
//! 4. `top`

use image::GrayImage;
use image::imageops;

use crate::error::BridgeError;
use crate::ipp::Density;
use crate::printer::config::{self, DirectionQuirk, FALLBACK_DIRECTION, ModelMetadata};
use crate::printer::link::{PrintOptions, PrinterLink};
use crate::protocol::encoder;
use crate::settings::{Direction, Settings};

/// Where a print session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Encoding,
    Transmitting,
    Completed,
    Failed,
}

/// Everything needed to transmit one job.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintDirective {
    pub direction: Direction,
    pub density: Density,
    pub label_type: u32,
    pub quantity: u32,
    /// Pre-rotate the raster 90° before encoding
    pub rotate: bool,
}

/// Settle the feed direction for a job.
pub fn resolve_direction(
    override_direction: Option<Direction>,
    metadata: Option<&ModelMetadata>,
    quirks: &[DirectionQuirk],
) -> Direction {
    if let Some(direction) = override_direction {
        return direction;
    }
    let Some(metadata) = metadata else {
        return FALLBACK_DIRECTION;
    };
    if let Some(forced) = config::corrected_direction(metadata, quirks) {
        log::info!(
            "overriding printDirection {}→{} for model {}",
            metadata.print_direction,
            forced,
            metadata.model
        );
        return forced;
    }
    metadata.print_direction
}

impl PrintDirective {
    pub fn new(settings: &Settings, density: Density, direction: Direction) -> Self {
        Self {
            direction,
            density,
            label_type: settings.label_type,
            quantity: settings.quantity,
            rotate: direction == Direction::Left && settings.rotate_for_left,
        }
    }

    pub fn options(&self) -> PrintOptions {
        PrintOptions {
            density: self.density,
            label_type: self.label_type,
            quantity: self.quantity,
        }
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Owns a connected link and guarantees a single disconnect.
pub struct LinkSession<L: PrinterLink> {
    link: L,
    state: SessionState,
}

impl<L: PrinterLink> LinkSession<L> {
    /// Connect `link`. On failure the link is still disconnected once.
    pub fn connect(link: L) -> Result<Self, BridgeError> {
        let mut session = Self {
            link,
            state: SessionState::Disconnected,
        };
        match session.link.connect() {
            Ok(()) => {
                session.state = SessionState::Connected;
                Ok(session)
            }
            Err(e) => {
                session.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn metadata(&self) -> Option<ModelMetadata> {
        self.link.metadata()
    }

    /// Encode and transmit `raster` per `directive`.
    pub fn print(&mut self, raster: &GrayImage, directive: &PrintDirective) -> Result<(), BridgeError> {
        self.state = SessionState::Encoding;
        let rotated;
        let source = if directive.rotate {
            log::info!("rotated raster +90° for left-direction compatibility");
            rotated = imageops::rotate90(raster);
            &rotated
        } else {
            raster
        };
        let encoded = match encoder::encode_image(source, directive.direction) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e);
            }
        };

        self.state = SessionState::Transmitting;
        match self.link.print(&encoded, &directive.options()) {
            Ok(()) => {
                self.state = SessionState::Completed;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }
}

impl<L: PrinterLink> Drop for LinkSession<L> {
    fn drop(&mut self) {
        if let Err(e) = self.link.disconnect() {
            log::warn!("disconnect failed: {}", e.diagnostic());
        }
        self.state = SessionState::Disconnected;
    }
}

/// Connect, resolve direction, transmit, disconnect.
///
/// Returns the directive that was used.
pub fn print_raster<L: PrinterLink>(
    link: L,
    raster: &GrayImage,
    settings: &Settings,
    density: Density,
) -> Result<PrintDirective, BridgeError> {
    let mut session = LinkSession::connect(link)?;
    let metadata = session.metadata();
    let direction = resolve_direction(settings.direction, metadata.as_ref(), &config::DIRECTION_QUIRKS);
    let directive = PrintDirective::new(settings, density, direction);
    session.print(raster, &directive)?;
    Ok(directive)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encoder::EncodedImage;
    use crate::settings::SettingsSources;
    use image::Luma;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Recorder {
        metadata: Option<ModelMetadata>,
        fail_connect: bool,
        fail_print: bool,
        fail_disconnect: bool,
        connects: usize,
        disconnects: usize,
        printed: Vec<(EncodedImage, PrintOptions)>,
    }

    impl PrinterLink for Recorder {
        fn connect(&mut self) -> Result<(), BridgeError> {
            self.connects += 1;
            if self.fail_connect {
                return Err(BridgeError::Transport("Failed to open /dev/rfcomm0".into()));
            }
            Ok(())
        }

        fn metadata(&self) -> Option<ModelMetadata> {
            self.metadata.clone()
        }

        fn print(&mut self, image: &EncodedImage, options: &PrintOptions) -> Result<(), BridgeError> {
            if self.fail_print {
                return Err(BridgeError::Print("printer rejected SetLabelType".into()));
            }
            self.printed.push((image.clone(), *options));
            Ok(())
        }

        fn disconnect(&mut self) -> Result<(), BridgeError> {
            self.disconnects += 1;
            if self.fail_disconnect {
                return Err(BridgeError::Transport("already gone".into()));
            }
            Ok(())
        }
    }

    fn settings(env: &[(&str, &str)]) -> Settings {
        let mut file = HashMap::new();
        file.insert("NIIMBLUE_NAME".to_string(), "D110_M-TEST".to_string());
        let env = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::resolve(&SettingsSources { file, env }).unwrap()
    }

    fn meta(model: &str, direction: Direction) -> ModelMetadata {
        ModelMetadata {
            model: model.into(),
            print_direction: direction,
        }
    }

    /// Blank 96x320 label with one black dot in the top-left corner.
    fn raster() -> GrayImage {
        let mut img = GrayImage::from_pixel(96, 320, Luma([255]));
        img.put_pixel(0, 0, Luma([0]));
        img
    }

    #[test]
    fn test_override_wins() {
        let m = meta("D110_M", Direction::Left);
        let d = resolve_direction(Some(Direction::Left), Some(&m), &config::DIRECTION_QUIRKS);
        assert_eq!(d, Direction::Left);
        let d = resolve_direction(Some(Direction::Bottom), None, &config::DIRECTION_QUIRKS);
        assert_eq!(d, Direction::Bottom);
    }

    #[test]
    fn test_quirk_forces_top() {
        let m = meta("D110_M", Direction::Left);
        assert_eq!(resolve_direction(None, Some(&m), &config::DIRECTION_QUIRKS), Direction::Top);
    }

    #[test]
    fn test_device_default_and_fallback() {
        let m = meta("D110", Direction::Left);
        assert_eq!(resolve_direction(None, Some(&m), &config::DIRECTION_QUIRKS), Direction::Left);
        assert_eq!(resolve_direction(None, None, &config::DIRECTION_QUIRKS), Direction::Top);
        // Empty rule table: device report is trusted
        let m = meta("D110_M", Direction::Left);
        assert_eq!(resolve_direction(None, Some(&m), &[]), Direction::Left);
    }

    #[test]
    fn test_print_success_disconnects_once() {
        let mut link = Recorder {
            metadata: Some(meta("B1", Direction::Top)),
            ..Default::default()
        };
        let s = settings(&[("QUANTITY", "2"), ("LABEL_TYPE", "3")]);
        let directive = print_raster(&mut link, &raster(), &s, Density::new(4)).unwrap();

        assert_eq!(directive.direction, Direction::Top);
        assert_eq!(link.connects, 1);
        assert_eq!(link.disconnects, 1);
        let (image, options) = &link.printed[0];
        assert_eq!(image.cols, 96);
        assert_eq!(image.row_count(), 320);
        assert_eq!(
            *options,
            PrintOptions {
                density: Density::new(4),
                label_type: 3,
                quantity: 2
            }
        );
    }

    #[test]
    fn test_rotate_for_left() {
        let mut link = Recorder::default();
        let s = settings(&[("DIRECTION", "left"), ("ROTATE_FOR_LEFT", "1")]);
        let directive = print_raster(&mut link, &raster(), &s, Density::new(3)).unwrap();
        assert!(directive.rotate);
        // Pre-rotation plus the left-feed rotation is a half turn: the
        // geometry is back to 96 across, the top-left dot ends bottom-right
        let (image, _) = &link.printed[0];
        assert_eq!(image.cols, 96);
        assert_eq!(image.row_count(), 320);
        assert_eq!(image.rows[319][11], 0x01);
        assert!(image.rows[0].iter().all(|&b| b == 0));

        let mut link = Recorder::default();
        let s = settings(&[("DIRECTION", "left")]);
        let directive = print_raster(&mut link, &raster(), &s, Density::new(3)).unwrap();
        assert!(!directive.rotate);
        assert_eq!(link.printed[0].0.cols, 320);
    }

    #[test]
    fn test_print_failure_still_disconnects_once() {
        let mut link = Recorder {
            fail_print: true,
            ..Default::default()
        };
        let err = print_raster(&mut link, &raster(), &settings(&[]), Density::new(3)).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(link.disconnects, 1);
    }

    #[test]
    fn test_connect_failure_still_disconnects_once() {
        let mut link = Recorder {
            fail_connect: true,
            ..Default::default()
        };
        let err = print_raster(&mut link, &raster(), &settings(&[]), Density::new(3)).unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
        assert_eq!(link.disconnects, 1);
        assert!(link.printed.is_empty());
    }

    #[test]
    fn test_unencodable_raster_fails_before_transmit() {
        let mut link = Recorder::default();
        let s = settings(&[("DIRECTION", "left")]);
        let long = GrayImage::from_pixel(96, 2000, Luma([255]));
        let err = print_raster(&mut link, &long, &s, Density::new(3)).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(link.printed.is_empty());
        assert_eq!(link.disconnects, 1);
    }

    #[test]
    fn test_disconnect_failure_does_not_mask_result() {
        let mut link = Recorder {
            fail_disconnect: true,
            ..Default::default()
        };
        assert!(print_raster(&mut link, &raster(), &settings(&[]), Density::new(3)).is_ok());

        let mut link = Recorder {
            fail_print: true,
            fail_disconnect: true,
            ..Default::default()
        };
        let err = print_raster(&mut link, &raster(), &settings(&[]), Density::new(3)).unwrap_err();
        assert!(matches!(err, BridgeError::Print(_)));
        assert_eq!(link.disconnects, 1);
    }

    #[test]
    fn test_session_states() {
        let mut link = Recorder::default();
        let mut session = LinkSession::connect(&mut link).unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        let directive = PrintDirective::new(&settings(&[]), Density::new(3), Direction::Top);
        session.print(&raster(), &directive).unwrap();
        assert_eq!(session.state(), SessionState::Completed);
    }
}
