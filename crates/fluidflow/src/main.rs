use std::path::Path;
use std::process::ExitCode;

use fluidflow::{FlowResult, SimConfig};

fn load_config() -> FlowResult<SimConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            log::info!("loading config from {path}");
            SimConfig::load_json(Path::new(&path))
        }
        None => Ok(SimConfig::default()),
    }
}

fn main() -> ExitCode {
    env_logger::init();

    match load_config().and_then(fluidflow::run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("fluidflow failed: {error}");
            eprintln!("fluidflow: {error}");
            ExitCode::FAILURE
        }
    }
}
