use clap::Parser;
use std::process::ExitCode;

use spritefe::{cli, logger};

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Initialize session log (overwrites previous session log)
    logger::init();
    logger::set_echo(args.verbose);

    spritefe::log_info!("SpriteFE {} starting", env!("CARGO_PKG_VERSION"));
    let code = cli::run(args);
    spritefe::log_info!("Session finished");
    code
}
