//! # Printer Transport Layer
//!
//! This module provides communication backends for sending packets to printers.
//!
//! ## Available Transports
//!
//! - [`bluetooth`]: Bluetooth RFCOMM serial link (Linux)

pub mod bluetooth;

pub use bluetooth::BluetoothTransport;
