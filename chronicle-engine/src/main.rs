//! `chronicle` command line.
//!
//! Usage: chronicle plan <volumes.json> <chapter>
//!        chronicle assemble <candidates.json> <chapter>

use chronicle_core::ChronicleConfig;
use chronicle_engine::cli::{self, USAGE};
use chronicle_engine::{init_tracing, TelemetryConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let command = match cli::parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!();
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_tracing(&TelemetryConfig::default()) {
        eprintln!("warning: {}", e);
    }

    let config = match ChronicleConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli::run(&command, &config) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
