//! # niimbridge - Print Jobs on NIIMBOT Label Printers
//!
//! niimbridge sits between a print front-end (an IPP server handing over job
//! files and attributes) and a NIIMBOT thermal label printer on Bluetooth.
//! It provides:
//!
//! - **Settings**: defaults, config file and environment merged once
//! - **Attribute interpretation**: label size and density from IPP hints
//! - **Raster planning**: printhead-aligned pixel geometry
//! - **Rasterisation**: bilevel PNG from bitmap or vector input
//! - **Printing**: direction quirks, encoding, the NIIMBOT print task
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use niimbridge::{
//!     ipp::ProtocolHints,
//!     pipeline::Pipeline,
//!     printer::NiimbotLink,
//!     settings::{Settings, SettingsSources},
//! };
//!
//! let settings = Settings::resolve(&SettingsSources::load_from_dir(Path::new(".")))?;
//! let link = NiimbotLink::new(&settings.name);
//! let pipeline = Pipeline::new(settings, ProtocolHints::from_env(), Path::new("."));
//!
//! pipeline.run(Some(Path::new("label.png")), link, &mut std::io::stderr())?;
//! # Ok::<(), niimbridge::BridgeError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`settings`] | Layered settings resolution |
//! | [`ipp`] | Protocol attribute interpretation and completion signaling |
//! | [`render`] | Raster planning, rasterisation, bilevel conversion |
//! | [`orchestrator`] | Direction resolution and print session |
//! | [`pipeline`] | One job end to end |
//! | [`printer`] | Printer link trait, models, NIIMBOT client |
//! | [`protocol`] | NIIMBOT packet framing, commands, image encoding |
//! | [`transport`] | Bluetooth RFCOMM backend |
//! | [`error`] | Error types and exit statuses |
//!
//! ## Supported Printers
//!
//! NIIMBOT printers reachable over Bluetooth serial (B1, B21, D11, D110,
//! D110_M, ...) at 8 dots/mm.

pub mod error;
pub mod ipp;
pub mod job;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod settings;
pub mod transport;

// Re-exports for convenience
pub use error::BridgeError;
pub use settings::Settings;
pub use transport::BluetoothTransport;
