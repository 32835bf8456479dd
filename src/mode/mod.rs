//! Command line parsing: picks the [Mode].
//!
//! The command line is exactly `<program> <mode>`. Anything else, flags
//! included, is a usage error.

use std::{ffi::OsString, fmt, str::FromStr};

use clap::{error::ErrorKind, Parser};
use thiserror::Error;

/// The usage line shown for anything that isn't exactly one valid mode.
pub const USAGE_MODES: &str = "[compile|qemu|qemu-gdb]";

/// Name used in the usage line if the argument vector is empty.
const FALLBACK_PROGRAM: &str = "kernrun";

/// Anything wrong with the command line. Displays as the one-line usage string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{program} {}", USAGE_MODES)]
pub struct UsageError {
    /// `argv[0]`, as given.
    pub program: String,
    /// What was wrong.
    pub kind: ErrorKind,
}

/// A token that isn't one of the [Mode]s.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown mode `{0}`")]
pub struct UnknownMode(pub String);

/// The operation to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Configure and build the kernel in the build directory.
    Compile,
    /// Boot the kernel image in the emulator.
    Qemu,
    /// Boot the kernel image, halted until a debugger attaches.
    QemuGdb,
}

impl Mode {
    /// Every mode, in usage-line order.
    pub const ALL: [Mode; 3] = [Mode::Compile, Mode::Qemu, Mode::QemuGdb];

    /// The command line token selecting this mode.
    pub fn token(self) -> &'static str {
        match self {
            Mode::Compile => "compile",
            Mode::Qemu => "qemu",
            Mode::QemuGdb => "qemu-gdb",
        }
    }
}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, UnknownMode> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.token() == s)
            .ok_or_else(|| UnknownMode(s.to_owned()))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Parsed command line.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = FALLBACK_PROGRAM,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Cli {
    /// One of `compile`, `qemu` or `qemu-gdb`
    pub mode: Mode,
}

impl Cli {
    /// Parses a full argument vector, program name first.
    ///
    /// # Errors
    ///
    /// Returns a [UsageError] unless the vector is exactly the program name
    /// and one valid mode token. Help and version flags are not special.
    pub fn resolve<I, T>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let program = args
            .first()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_PROGRAM.to_owned());
        match args.len() {
            0 | 1 => {
                return Err(UsageError {
                    program,
                    kind: ErrorKind::MissingRequiredArgument,
                })
            }
            2 => {}
            _ => {
                return Err(UsageError {
                    program,
                    kind: ErrorKind::UnknownArgument,
                })
            }
        }
        Self::try_parse_from(args).map_err(|err| UsageError {
            program,
            kind: err.kind(),
        })
    }
}
