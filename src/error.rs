//! # Error Types
//!
//! This module defines the error type shared by every pipeline stage and the
//! mapping from error class to process exit status.
//!
//! | Class | Variants | Exit status |
//! |-------|----------|-------------|
//! | Configuration / usage | `Config`, `Usage` | 2 |
//! | Rasterisation | `Raster`, `Image` | 3 |
//! | Print / link | `Transport`, `Protocol`, `Print`, `Io` | 1 |

use std::error::Error as _;

use thiserror::Error;

/// Exit status for a successful job.
pub const EXIT_OK: u8 = 0;

/// Exit status for print and transmission failures.
pub const EXIT_PRINT: u8 = 1;

/// Exit status for usage and configuration errors.
pub const EXIT_USAGE: u8 = 2;

/// Exit status for rasterisation failures.
pub const EXIT_RASTER: u8 = 3;

/// Main error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required setting is missing or invalid
    #[error("{0}")]
    Config(String),

    /// Missing or invalid job file argument
    #[error("{0}")]
    Usage(String),

    /// Rasterisation failed (external rasterizer, unsupported input)
    #[error("Rasterisation failed: {0}")]
    Raster(String),

    /// Image decode/encode failure
    #[error("Rasterisation failed: {0}")]
    Image(#[from] image::ImageError),

    /// Transport-level errors (device lookup, connection, I/O)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected response from the printer
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The printer rejected or failed the print task
    #[error("Print failed: {0}")]
    Print(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Process exit status for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Usage(_) => EXIT_USAGE,
            Self::Raster(_) | Self::Image(_) => EXIT_RASTER,
            Self::Transport(_) | Self::Protocol(_) | Self::Print(_) | Self::Io(_) => EXIT_PRINT,
        }
    }

    /// Full diagnostic text including every underlying cause.
    pub fn diagnostic(&self) -> String {
        let mut text = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            if !text.contains(&cause_text) {
                text.push_str(": caused by: ");
                text.push_str(&cause_text);
            }
            source = cause.source();
        }
        text
    }
}
