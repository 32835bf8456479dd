//! Tool names, emulator settings and paths used when building commands.
//!
//! The defaults mirror the layout of the kernel tree: the build tree lives in
//! `build/` and the linked kernel ends up at `build/kern/kernel`. The command
//! line only ever carries the mode, so overrides come from `KERNRUN_*`
//! environment variables (see [Settings::from_lookup]).

use std::path::PathBuf;

use thiserror::Error;

/// Emulator executable.
pub const QEMU: &str = "qemu-system-arm";
/// Build configuration tool, run inside the build directory.
pub const CMAKE: &str = "cmake";
/// Build tool, run inside the build directory.
pub const MAKE: &str = "make";
/// Build directory, relative to where the tool is invoked.
pub const BUILD_DIR: &str = "build";
/// Kernel image, relative to the build directory.
pub const KERNEL_IMAGE: &str = "kern/kernel";

/// Emulated board.
pub const MACHINE: &str = "versatilepb";
/// Emulated CPU model.
pub const CPU: &str = "cortex-a8";
/// Guest memory in MiB.
pub const MEMORY_MIB: u32 = 256;
/// Serial console multiplexed with the QEMU monitor on the controlling terminal.
pub const SERIAL: &str = "mon:stdio";
/// Local port of the emulator's gdb server.
pub const GDB_PORT: u16 = 1234;

/// Overrides [QEMU].
pub const ENV_QEMU: &str = "KERNRUN_QEMU";
/// Overrides [CMAKE].
pub const ENV_CMAKE: &str = "KERNRUN_CMAKE";
/// Overrides [MAKE].
pub const ENV_MAKE: &str = "KERNRUN_MAKE";
/// Overrides [BUILD_DIR].
pub const ENV_BUILD_DIR: &str = "KERNRUN_BUILD_DIR";
/// Overrides [GDB_PORT].
pub const ENV_GDB_PORT: &str = "KERNRUN_GDB_PORT";
/// Whitespace-separated arguments for the build configuration tool.
pub const ENV_CONFIGURE_ARGS: &str = "KERNRUN_CONFIGURE_ARGS";
/// `1`/`true`/`yes` prints the commands instead of running them.
pub const ENV_DRY_RUN: &str = "KERNRUN_DRY_RUN";
/// Number of extra log levels.
pub const ENV_VERBOSE: &str = "KERNRUN_VERBOSE";

/// A `KERNRUN_*` variable that couldn't be understood.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid value `{value}` for {var}: expected {expected}")]
pub struct ConfigError {
    /// Variable name.
    pub var: &'static str,
    /// Its value.
    pub value: String,
    /// What would have been accepted.
    pub expected: &'static str,
}

/// Everything needed to turn a [`Mode`](crate::mode::Mode) into commands.
///
/// [`RunnerConfig::default`] gives the stock setup; tests build their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Emulator executable.
    pub qemu: String,
    /// Build configuration tool.
    pub cmake: String,
    /// Build tool.
    pub make: String,
    /// Build directory, created on `compile` if missing.
    pub build_dir: PathBuf,
    /// Port for the emulator's gdb server.
    pub gdb_port: u16,
    /// Arguments for the build configuration tool. Empty by default.
    pub configure_args: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            qemu: QEMU.to_owned(),
            cmake: CMAKE.to_owned(),
            make: MAKE.to_owned(),
            build_dir: PathBuf::from(BUILD_DIR),
            gdb_port: GDB_PORT,
            configure_args: Vec::new(),
        }
    }
}

impl RunnerConfig {
    /// Where the build is expected to leave the kernel image.
    pub fn kernel_image(&self) -> PathBuf {
        self.build_dir.join(KERNEL_IMAGE)
    }

    /// The `-gdb` device string, e.g. `tcp::1234`.
    pub fn gdb_server(&self) -> String {
        format!("tcp::{}", self.gdb_port)
    }
}

/// The [RunnerConfig] plus how to run it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Tools, paths and emulator settings.
    pub runner: RunnerConfig,
    /// Print the commands instead of running them.
    pub dry_run: bool,
    /// Extra log levels above the default.
    pub verbose: u8,
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        "" | "0" | "false" | "no" => Ok(false),
        "1" | "true" | "yes" => Ok(true),
        _ => Err(ConfigError {
            var,
            value: value.to_owned(),
            expected: "one of 1, true, yes, 0, false, no",
        }),
    }
}

impl Settings {
    /// Builds settings from `lookup`, which maps a variable name to its value.
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// If the port, verbosity or dry-run variable doesn't parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        let runner = &mut settings.runner;
        if let Some(qemu) = lookup(ENV_QEMU) {
            runner.qemu = qemu;
        }
        if let Some(cmake) = lookup(ENV_CMAKE) {
            runner.cmake = cmake;
        }
        if let Some(make) = lookup(ENV_MAKE) {
            runner.make = make;
        }
        if let Some(dir) = lookup(ENV_BUILD_DIR) {
            runner.build_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup(ENV_GDB_PORT) {
            runner.gdb_port = port.trim().parse().map_err(|_| ConfigError {
                var: ENV_GDB_PORT,
                value: port.clone(),
                expected: "a port number",
            })?;
        }
        if let Some(args) = lookup(ENV_CONFIGURE_ARGS) {
            runner.configure_args = args.split_whitespace().map(str::to_owned).collect();
        }
        if let Some(flag) = lookup(ENV_DRY_RUN) {
            settings.dry_run = parse_flag(ENV_DRY_RUN, &flag)?;
        }
        if let Some(level) = lookup(ENV_VERBOSE) {
            settings.verbose = level.trim().parse().map_err(|_| ConfigError {
                var: ENV_VERBOSE,
                value: level.clone(),
                expected: "a number from 0 to 255",
            })?;
        }
        Ok(settings)
    }
}
