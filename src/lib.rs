#![cfg_attr(doc, warn(missing_docs))]
#![doc = include_str!("../README.md")]

use std::{ffi::OsString, io::Write};

use log::{debug, LevelFilter};

use crate::{
    config::Settings,
    launch::{execute, DryRunLauncher, Launcher, SystemLauncher},
    mode::{Cli, Mode},
    plan::Plan,
};

pub mod config;
pub mod launch;
pub mod mode;
pub mod plan;

/// Log level for a given verbosity.
pub fn log_level(verbose: u8) -> LevelFilter {
    #[cfg(debug_assertions)]
    let base = 1;
    #[cfg(not(debug_assertions))]
    let base = 0;
    match verbose.saturating_add(base) {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Resolves the command line and the `KERNRUN_*` settings.
///
/// On a bad command line the usage line goes to `stderr`; on a bad setting,
/// the error does. Either way the `Err` holds the exit status and nothing
/// has been launched.
pub fn start<I, T, F, W>(args: I, lookup: F, stderr: &mut W) -> Result<(Cli, Settings), i32>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
    F: Fn(&str) -> Option<String>,
    W: Write,
{
    let cli = Cli::resolve(args).map_err(|err| {
        let _ = writeln!(stderr, "{err}");
        1
    })?;
    let settings = Settings::from_lookup(lookup).map_err(|err| {
        let _ = writeln!(stderr, "{err}");
        1
    })?;
    Ok((cli, settings))
}

/// Runs `mode` with `launcher` and returns the exit status.
pub fn dispatch_with<L: Launcher + ?Sized>(mode: Mode, settings: &Settings, launcher: &mut L) -> i32 {
    let plan = Plan::for_mode(mode, &settings.runner);
    debug!("{mode}: {:?}", plan.steps);
    execute(&plan, launcher).exit_code()
}

/// Runs `mode` for real, or prints it on a dry run, and returns the exit status.
pub fn dispatch(mode: Mode, settings: &Settings) -> i32 {
    if settings.dry_run {
        dispatch_with(mode, settings, &mut DryRunLauncher::new(std::io::stdout().lock()))
    } else {
        dispatch_with(mode, settings, &mut SystemLauncher)
    }
}
