//! # niimbridge CLI
//!
//! Print-front-end backend for NIIMBOT label printers.
//!
//! ## Usage
//!
//! ```bash
//! # Print a job file with settings from config/bridge.config.json
//! niimbridge /var/spool/job-0001.png
//!
//! # Override settings through the environment
//! NIIMBLUE_NAME=D110_M-H1234 NIIMBOT_RENDER=photo niimbridge label.pdf
//! ```
//!
//! ## Exit Status
//!
//! | Status | Meaning |
//! |--------|---------|
//! | 0 | printed |
//! | 1 | print / link failure |
//! | 2 | usage or configuration error |
//! | 3 | rasterisation failure |

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use niimbridge::{
    BridgeError,
    error::EXIT_OK,
    ipp::ProtocolHints,
    logging,
    pipeline::Pipeline,
    printer::NiimbotLink,
    settings::{self, Settings, SettingsSources},
};

/// niimbridge - print jobs on a NIIMBOT label printer
#[derive(Parser, Debug)]
#[command(name = "niimbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Job file to print (`-` or omitted means none)
    #[arg(value_name = "JOB_FILE")]
    job: Option<PathBuf>,

    /// Configuration file
    #[arg(long, value_name = "FILE", default_value = settings::CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::resolve(&SettingsSources::load(&cli.config)) {
        Ok(settings) => settings,
        Err(e) => return fail(e, false),
    };
    logging::init(settings.debug);
    if let Ok(json) = serde_json::to_string(&settings) {
        log::info!("settings: {}", json);
    }

    let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let pipeline = Pipeline::new(settings.clone(), ProtocolHints::from_env(), &root);
    let link = NiimbotLink::new(&settings.name);

    match pipeline.run(cli.job.as_deref(), link, &mut std::io::stderr()) {
        Ok(_) => ExitCode::from(EXIT_OK),
        Err(e) => fail(e, settings.debug),
    }
}

fn fail(err: BridgeError, debug: bool) -> ExitCode {
    logging::init(debug);
    log::error!("{}", err.diagnostic());
    ExitCode::from(err.exit_code())
}
