use std::{env, io, process};

use anyhow::{Context, Result};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

fn init_logging(verbose: u8) -> Result<()> {
    let config = ConfigBuilder::new().set_time_level(log::LevelFilter::Off).build();
    TermLogger::init(
        kernrun::log_level(verbose),
        config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .context("failed to set up logging")
}

fn main() {
    let (cli, settings) =
        match kernrun::start(env::args_os(), |var| env::var(var).ok(), &mut io::stderr()) {
            Ok(resolved) => resolved,
            Err(code) => process::exit(code),
        };
    if let Err(err) = init_logging(settings.verbose) {
        eprintln!("{err:#}");
    }
    process::exit(kernrun::dispatch(cli.mode, &settings));
}
