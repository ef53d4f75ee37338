//! # NIIMBOT Protocol Implementation
//!
//! This module provides low-level packet builders for the NIIMBOT label
//! printer protocol.
//!
//! ## Module Structure
//!
//! - [`packet`]: Framing, checksums, stream reassembly
//! - [`commands`]: Request builders and response decoding
//! - [`encoder`]: Raster to printhead rows
//!
//! ## Usage Example
//!
//! ```
//! use niimbridge::protocol::commands;
//!
//! let mut data = Vec::new();
//! data.extend(commands::set_label_density(3).to_bytes()?);
//! data.extend(commands::set_page_size(320, 96).to_bytes()?);
//!
//! // Send `data` to printer via transport...
//! # Ok::<(), niimbridge::BridgeError>(())
//! ```

pub mod commands;
pub mod encoder;
pub mod packet;
