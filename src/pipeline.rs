//! # Job Pipeline
//!
//! Runs one job start to finish:
//!
//! ```text
//! job file ─→ Job ─→ RasterPlan ─→ Rasterizer ─→ LinkSession ─→ completion
//!              │                        │              │
//!         temp dir               debug copy      disconnect
//! ```
//!
//! Each stage starts only after the previous one has produced its output.
//! Errors come back as [`BridgeError`]; the caller maps them to an exit
//! status. The job's temporary directory is removed on every path.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::BridgeError;
use crate::ipp::{self, Density, PhysicalSize, ProtocolHints};
use crate::job::Job;
use crate::orchestrator::{self, PrintDirective};
use crate::printer::link::PrinterLink;
use crate::render::plan::{RasterPlan, SourceKind};
use crate::render::rasterize::{self, Rasterizer};
use crate::settings::Settings;

/// Debug raster copies, relative to the working directory.
pub const SPOOL_DIR: &str = ".spool";

/// What a finished job did.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintReport {
    pub size: PhysicalSize,
    pub plan: RasterPlan,
    pub directive: PrintDirective,
    pub debug_copy: Option<PathBuf>,
}

/// One configured pipeline instance.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub settings: Settings,
    pub hints: ProtocolHints,
    pub rasterizer: Rasterizer,
    pub spool_dir: PathBuf,
}

impl Pipeline {
    /// A pipeline whose debug copies go under `root/.spool`.
    pub fn new(settings: Settings, hints: ProtocolHints, root: &Path) -> Self {
        let rasterizer = Rasterizer::default().show_output(settings.debug);
        Self {
            settings,
            hints,
            rasterizer,
            spool_dir: root.join(SPOOL_DIR),
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Rasterizer) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// Process the job named by `job_arg` and print it through `link`.
    ///
    /// Completion attributes are written to `diagnostics` on success.
    pub fn run<L: PrinterLink, W: Write>(
        &self,
        job_arg: Option<&Path>,
        link: L,
        diagnostics: &mut W,
    ) -> Result<PrintReport, BridgeError> {
        let size = self.hints.physical_size();
        let density = self.hints.density();

        let job = Job::from_arg(job_arg)?;
        let kind = SourceKind::detect(&job.source, &self.hints.content_type);
        let plan = RasterPlan::new(size, &self.settings, kind);

        log::info!(
            "Converting {} -> {}",
            job.source.display(),
            job.raster_path.display()
        );
        let raster = self.rasterizer.rasterize(&job, &plan)?;

        let debug_copy = if self.settings.debug {
            rasterize::save_debug_copy(&job.raster_path, &self.spool_dir)
        } else {
            None
        };

        self.log_job(size, density, &plan);

        let directive = orchestrator::print_raster(link, &raster, &self.settings, density)?;
        log::info!(
            "Printed {}x{}mm, density {}, direction {}, qty {}",
            size.width_mm,
            size.height_mm,
            density.value(),
            directive.direction,
            directive.quantity
        );

        ipp::report_completion(diagnostics, directive.quantity)?;

        if let Err(e) = job.cleanup() {
            log::warn!("could not remove temporary directory: {}", e);
        }

        Ok(PrintReport {
            size,
            plan,
            directive,
            debug_copy,
        })
    }

    fn log_job(&self, size: PhysicalSize, density: Density, plan: &RasterPlan) {
        log::info!("IPP_MEDIA={}", self.hints.media);
        log::info!("IPP_MEDIA_COL={}", self.hints.media_col);
        log::info!("chosen mm = {}×{}", size.width_mm, size.height_mm);
        log::info!(
            "quality={:?} darkness={:?} density={}",
            self.hints.quality,
            self.hints.darkness,
            density.value()
        );
        log::info!(
            "render={:?} threshold={} plan={}x{}px",
            self.settings.render,
            self.settings.threshold,
            plan.width_px,
            plan.height_px
        );
    }
}
