//! # Printer Link
//!
//! The seam between print orchestration and a concrete device. The
//! orchestrator only ever talks to a [`PrinterLink`]; the NIIMBOT serial
//! implementation lives in [`super::niimbot`], and tests substitute their own.

use crate::error::BridgeError;
use crate::ipp::Density;
use crate::printer::config::ModelMetadata;
use crate::protocol::encoder::EncodedImage;

/// Per-job print parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintOptions {
    pub density: Density,
    pub label_type: u32,
    pub quantity: u32,
}

/// A connection to one printer.
pub trait PrinterLink {
    /// Establish the connection.
    fn connect(&mut self) -> Result<(), BridgeError>;

    /// Device-reported model metadata, when available.
    fn metadata(&self) -> Option<ModelMetadata>;

    /// Transmit an encoded image and wait for the printer to finish.
    fn print(&mut self, image: &EncodedImage, options: &PrintOptions) -> Result<(), BridgeError>;

    /// Close the connection.
    fn disconnect(&mut self) -> Result<(), BridgeError>;
}

impl<L: PrinterLink + ?Sized> PrinterLink for &mut L {
    fn connect(&mut self) -> Result<(), BridgeError> {
        (**self).connect()
    }

    fn metadata(&self) -> Option<ModelMetadata> {
        (**self).metadata()
    }

    fn print(&mut self, image: &EncodedImage, options: &PrintOptions) -> Result<(), BridgeError> {
        (**self).print(image, options)
    }

    fn disconnect(&mut self) -> Result<(), BridgeError> {
        (**self).disconnect()
    }
}
