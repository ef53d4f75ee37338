//! # Printer Module
//!
//! This module provides printer models, the link abstraction, and the
//! NIIMBOT client.
//!
//! ## Modules
//!
//! - [`config`]: Model families and direction quirks
//! - [`link`]: The [`PrinterLink`] trait used by the orchestrator
//! - [`niimbot`]: NIIMBOT print task over Bluetooth

pub mod config;
pub mod link;
pub mod niimbot;

pub use config::ModelMetadata;
pub use link::{PrintOptions, PrinterLink};
pub use niimbot::NiimbotLink;
