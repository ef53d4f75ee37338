//! # Print Job
//!
//! A job owns a private temporary directory for its working raster. The
//! directory is removed when the job is dropped, on every exit path.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::BridgeError;

/// Prefix of the per-job temporary directory.
pub const WORK_DIR_PREFIX: &str = "niimbot-ipp-";

/// One print request, from job file to working raster.
#[derive(Debug)]
pub struct Job {
    /// File handed over by the print front-end
    pub source: PathBuf,
    /// Bilevel PNG written by the rasterizer
    pub raster_path: PathBuf,
    work_dir: TempDir,
}

impl Job {
    /// Validate the job file and create the working directory.
    ///
    /// ## Errors
    ///
    /// [`BridgeError::Usage`] if `source` does not exist; nothing is created
    /// in that case. [`BridgeError::Io`] if the temporary directory cannot be
    /// created.
    pub fn new(source: &Path) -> Result<Self, BridgeError> {
        if !source.exists() {
            return Err(BridgeError::Usage(format!(
                "No job file path provided (not found: {})",
                source.display()
            )));
        }

        let work_dir = tempfile::Builder::new().prefix(WORK_DIR_PREFIX).tempdir()?;
        let raster_path = work_dir.path().join("job.png");
        Ok(Self {
            source: source.to_path_buf(),
            raster_path,
            work_dir,
        })
    }

    /// Interpret the positional job argument; `-` or absent means no file.
    pub fn from_arg(arg: Option<&Path>) -> Result<Self, BridgeError> {
        match arg {
            Some(path) if path != Path::new("-") => Self::new(path),
            _ => Err(BridgeError::Usage("No job file path provided".into())),
        }
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Remove the working directory now, reporting failures.
    ///
    /// Dropping the job does the same silently.
    pub fn cleanup(self) -> std::io::Result<()> {
        self.work_dir.close()
    }
}
