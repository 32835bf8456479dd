//! Turns a [Mode] into the ordered steps and exact argument vectors to run.
//!
//! Nothing here touches the filesystem or spawns anything; see
//! [`launch`](crate::launch) for that.

use std::{fmt, path::PathBuf};

use crate::{
    config::{RunnerConfig, CPU, MACHINE, MEMORY_MIB, SERIAL},
    launch::build_dir::DirPolicy,
    mode::Mode,
};

/// Flag that makes the emulator wait for a debugger before starting the CPU.
pub const HALT_AT_START: &str = "-S";

/// One external process: executable, arguments and working directory.
///
/// `cwd` of `None` means "wherever the tool was started".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable name or path.
    pub program: String,
    /// Arguments after the program name.
    pub args: Vec<String>,
    /// Working directory for the process.
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    /// An invocation run from the current directory.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    /// Runs the process from `dir` instead.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

fn write_word(f: &mut fmt::Formatter<'_>, word: &str) -> fmt::Result {
    if word.is_empty() || word.contains(|c: char| c.is_whitespace() || c == '\'') {
        write!(f, "'{}'", word.replace('\'', r"'\''"))
    } else {
        f.write_str(word)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dir) = &self.cwd {
            f.write_str("cd ")?;
            write_word(f, &dir.display().to_string())?;
            f.write_str(" && ")?;
        }
        write_word(f, &self.program)?;
        for arg in &self.args {
            f.write_str(" ")?;
            write_word(f, arg)?;
        }
        Ok(())
    }
}

/// One thing a [Plan] does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Make sure a directory exists before later steps use it.
    EnsureDir {
        /// Directory to create.
        path: PathBuf,
        /// What to do if creating it fails.
        policy: DirPolicy,
    },
    /// Run a process to completion.
    Launch(Invocation),
}

/// Everything a mode does, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// The mode this plan was built for.
    pub mode: Mode,
    /// Steps, run in order.
    pub steps: Vec<Step>,
}

impl Plan {
    /// The steps `mode` takes under `config`.
    pub fn for_mode(mode: Mode, config: &RunnerConfig) -> Self {
        let steps = match mode {
            Mode::Compile => {
                let dir = &config.build_dir;
                vec![
                    Step::EnsureDir {
                        path: dir.clone(),
                        policy: DirPolicy::BestEffort,
                    },
                    Step::Launch(
                        Invocation::new(&config.cmake, &config.configure_args).in_dir(dir),
                    ),
                    Step::Launch(Invocation::new(&config.make, Vec::<String>::new()).in_dir(dir)),
                ]
            }
            Mode::Qemu => vec![Step::Launch(Invocation::new(
                &config.qemu,
                qemu_base_args(config),
            ))],
            Mode::QemuGdb => {
                let mut args = qemu_base_args(config);
                args.push(HALT_AT_START.to_owned());
                vec![Step::Launch(Invocation::new(&config.qemu, args))]
            }
        };
        Self { mode, steps }
    }

    /// Just the process launches, in order.
    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        self.steps.iter().filter_map(|step| match step {
            Step::Launch(inv) => Some(inv),
            Step::EnsureDir { .. } => None,
        })
    }
}

/// Emulator arguments shared by `qemu` and `qemu-gdb`.
pub fn qemu_base_args(config: &RunnerConfig) -> Vec<String> {
    vec![
        "-machine".to_owned(),
        MACHINE.to_owned(),
        "-cpu".to_owned(),
        CPU.to_owned(),
        "-m".to_owned(),
        MEMORY_MIB.to_string(),
        "-serial".to_owned(),
        SERIAL.to_owned(),
        "-no-reboot".to_owned(),
        "-gdb".to_owned(),
        config.gdb_server(),
        "-kernel".to_owned(),
        config.kernel_image().display().to_string(),
    ]
}
