//! Running a [Plan]: directory setup and blocking process launches.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use log::{error, info, warn};
use thiserror::Error;

use crate::plan::{Invocation, Plan, Step};

use self::build_dir::{ensure_dir, DirPolicy, DirStatus};

pub mod build_dir;

/// An error while setting up or launching an external process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The executable couldn't be started.
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        /// Executable that failed.
        program: String,
        #[source]
        source: io::Error,
    },
    /// A directory couldn't be created under [DirPolicy::Strict].
    #[error("failed to create {}: {source}", .path.display())]
    CreateDir {
        /// Directory that failed.
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Dry-run output couldn't be written.
    #[error("failed to write plan: {0}")]
    Output(#[from] io::Error),
}

/// Type alias for Result<T, [LaunchError]>.
pub type LResult<T> = Result<T, LaunchError>;

/// How a launched process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// `None` if the process was killed by a signal.
    pub code: Option<i32>,
}

impl Outcome {
    /// A clean exit.
    pub const SUCCESS: Outcome = Outcome { code: Some(0) };

    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Something that can run an [Invocation] to completion.
pub trait Launcher {
    /// Runs `inv` and waits for it, however long that takes.
    ///
    /// # Errors
    ///
    /// If the process could not be started at all.
    fn launch(&mut self, inv: &Invocation) -> LResult<Outcome>;

    /// Prepares a directory for later steps.
    fn prepare_dir(&mut self, path: &Path, policy: DirPolicy) -> LResult<DirStatus> {
        ensure_dir(path, policy)
    }
}

/// Spawns real processes that share this terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&mut self, inv: &Invocation) -> LResult<Outcome> {
        info!("running: {inv}");
        let mut cmd = Command::new(&inv.program);
        cmd.args(&inv.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &inv.cwd {
            cmd.current_dir(dir);
        }
        let status = cmd.status().map_err(|source| LaunchError::Spawn {
            program: inv.program.clone(),
            source,
        })?;
        if status.success() {
            info!("`{}` finished", inv.program);
        } else {
            warn!("`{}` exited with {status}", inv.program);
        }
        Ok(Outcome {
            code: status.code(),
        })
    }
}

/// Writes each step as a shell command instead of doing it.
pub struct DryRunLauncher<W: Write> {
    out: W,
}

impl<W: Write> DryRunLauncher<W> {
    /// Writes to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Gives back the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Launcher for DryRunLauncher<W> {
    fn launch(&mut self, inv: &Invocation) -> LResult<Outcome> {
        writeln!(self.out, "{inv}")?;
        Ok(Outcome::SUCCESS)
    }

    fn prepare_dir(&mut self, path: &Path, _policy: DirPolicy) -> LResult<DirStatus> {
        writeln!(self.out, "mkdir {}", path.display())?;
        Ok(DirStatus::Planned)
    }
}

/// The result of one [Step].
#[derive(Debug)]
pub enum StepResult {
    /// From [Step::EnsureDir].
    Dir(LResult<DirStatus>),
    /// From [Step::Launch].
    Launch(LResult<Outcome>),
}

/// What happened to each step that was attempted, in order.
#[derive(Debug, Default)]
pub struct Report {
    /// One entry per attempted step.
    pub results: Vec<StepResult>,
}

impl Report {
    /// Exit status for the tool itself.
    ///
    /// The last launched process's exit code is passed through (1 if it died
    /// to a signal or couldn't be started). A plan that stopped on a
    /// directory error gives 1; one that launched nothing gives 0.
    pub fn exit_code(&self) -> i32 {
        match self.results.last() {
            Some(StepResult::Dir(Err(_))) => 1,
            _ => self
                .results
                .iter()
                .rev()
                .find_map(|result| match result {
                    StepResult::Launch(Ok(outcome)) => Some(outcome.code.unwrap_or(1)),
                    StepResult::Launch(Err(_)) => Some(1),
                    StepResult::Dir(_) => None,
                })
                .unwrap_or(0),
        }
    }

    /// Number of processes that were actually started.
    pub fn launched(&self) -> usize {
        self.results
            .iter()
            .filter(|result| matches!(result, StepResult::Launch(Ok(_))))
            .count()
    }
}

/// Runs every step of `plan` in order.
///
/// A launch that fails, or a process that exits non-zero, does not stop the
/// steps after it. Only a directory error (possible under
/// [DirPolicy::Strict]) ends the plan early.
pub fn execute<L: Launcher + ?Sized>(plan: &Plan, launcher: &mut L) -> Report {
    let mut report = Report::default();
    for step in &plan.steps {
        match step {
            Step::EnsureDir { path, policy } => {
                let result = launcher.prepare_dir(path, *policy);
                let failed = result.is_err();
                if let Err(err) = &result {
                    error!("{err}");
                }
                report.results.push(StepResult::Dir(result));
                if failed {
                    break;
                }
            }
            Step::Launch(inv) => {
                let result = launcher.launch(inv);
                if let Err(err) = &result {
                    error!("{err}");
                }
                report.results.push(StepResult::Launch(result));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        fs,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;
    use crate::{config::RunnerConfig, mode::Mode};

    fn temp_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        path.push(format!("kernrun-launch-{name}-{nanos}"));
        path
    }

    /// Records invocations instead of spawning them.
    #[derive(Default)]
    struct FakeLauncher {
        calls: Vec<Invocation>,
        /// Programs that "aren't installed".
        missing: Vec<String>,
        exit_codes: HashMap<String, Option<i32>>,
    }

    impl Launcher for FakeLauncher {
        fn launch(&mut self, inv: &Invocation) -> LResult<Outcome> {
            self.calls.push(inv.clone());
            if self.missing.contains(&inv.program) {
                return Err(LaunchError::Spawn {
                    program: inv.program.clone(),
                    source: io::Error::from(io::ErrorKind::NotFound),
                });
            }
            let code = self.exit_codes.get(&inv.program).copied().unwrap_or(Some(0));
            Ok(Outcome { code })
        }
    }

    fn config_in(dir: &Path) -> RunnerConfig {
        RunnerConfig {
            build_dir: dir.join("build"),
            ..Default::default()
        }
    }

    #[test]
    fn test_compile_runs_configure_then_build_in_build_dir() {
        let root = temp_path("compile");
        fs::create_dir_all(&root).unwrap();
        let config = config_in(&root);
        let mut launcher = FakeLauncher::default();

        let report = execute(&Plan::for_mode(Mode::Compile, &config), &mut launcher);

        assert!(config.build_dir.is_dir());
        let programs: Vec<_> = launcher.calls.iter().map(|c| c.program.as_str()).collect();
        assert_eq!(programs, ["cmake", "make"]);
        for call in &launcher.calls {
            assert!(call.args.is_empty());
            assert_eq!(call.cwd.as_deref(), Some(config.build_dir.as_path()));
        }
        assert!(matches!(report.results[0], StepResult::Dir(Ok(DirStatus::Created))));
        assert_eq!(report.launched(), 2);
        assert_eq!(report.exit_code(), 0);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_compile_twice_reuses_build_dir() {
        let root = temp_path("twice");
        fs::create_dir_all(&root).unwrap();
        let config = config_in(&root);
        let plan = Plan::for_mode(Mode::Compile, &config);

        let mut first = FakeLauncher::default();
        execute(&plan, &mut first);
        let mut second = FakeLauncher::default();
        let report = execute(&plan, &mut second);

        assert!(matches!(report.results[0], StepResult::Dir(Ok(DirStatus::Existed))));
        assert_eq!(first.calls, second.calls);
        assert_eq!(report.exit_code(), 0);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_compile_builds_even_if_configure_fails() {
        let root = temp_path("cfgfail");
        fs::create_dir_all(&root).unwrap();
        let config = config_in(&root);
        let plan = Plan::for_mode(Mode::Compile, &config);

        let mut launcher = FakeLauncher::default();
        launcher.exit_codes.insert("cmake".to_owned(), Some(1));
        let report = execute(&plan, &mut launcher);
        assert_eq!(launcher.calls.len(), 2);
        assert_eq!(report.exit_code(), 0);

        let mut launcher = FakeLauncher {
            missing: vec!["cmake".to_owned()],
            ..Default::default()
        };
        let report = execute(&plan, &mut launcher);
        assert_eq!(launcher.calls.len(), 2);
        assert_eq!(launcher.calls[1].program, "make");
        assert!(matches!(report.results[1], StepResult::Launch(Err(LaunchError::Spawn { .. }))));
        assert_eq!(report.launched(), 1);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_compile_continues_when_build_dir_cannot_be_created() {
        let root = temp_path("nodir");
        // `root` itself is never created, so creating `root/build` fails.
        let config = config_in(&root);
        let mut launcher = FakeLauncher::default();

        let report = execute(&Plan::for_mode(Mode::Compile, &config), &mut launcher);

        assert!(matches!(
            report.results[0],
            StepResult::Dir(Ok(DirStatus::Ignored(io::ErrorKind::NotFound)))
        ));
        assert_eq!(launcher.calls.len(), 2);
    }

    #[test]
    fn test_strict_dir_failure_stops_plan() {
        let root = temp_path("strict");
        let plan = Plan {
            mode: Mode::Compile,
            steps: vec![
                Step::EnsureDir {
                    path: root.join("build"),
                    policy: DirPolicy::Strict,
                },
                Step::Launch(Invocation::new("make", Vec::<String>::new())),
            ],
        };
        let mut launcher = FakeLauncher::default();
        let report = execute(&plan, &mut launcher);
        assert!(launcher.calls.is_empty());
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_run_modes_launch_emulator_once() {
        let config = RunnerConfig::default();
        for (mode, halts) in [(Mode::Qemu, false), (Mode::QemuGdb, true)] {
            let mut launcher = FakeLauncher::default();
            let report = execute(&Plan::for_mode(mode, &config), &mut launcher);
            assert_eq!(launcher.calls.len(), 1);
            let call = &launcher.calls[0];
            assert_eq!(call.program, "qemu-system-arm");
            assert_eq!(call.cwd, None);
            assert_eq!(call.args.last().map(String::as_str) == Some("-S"), halts);
            assert_eq!(report.exit_code(), 0);
        }
    }

    #[test]
    fn test_exit_code_passthrough() {
        let plan = Plan::for_mode(Mode::Qemu, &RunnerConfig::default());

        let mut launcher = FakeLauncher::default();
        launcher.exit_codes.insert("qemu-system-arm".to_owned(), Some(3));
        assert_eq!(execute(&plan, &mut launcher).exit_code(), 3);

        let mut launcher = FakeLauncher::default();
        launcher.exit_codes.insert("qemu-system-arm".to_owned(), None);
        assert_eq!(execute(&plan, &mut launcher).exit_code(), 1);

        let mut launcher = FakeLauncher {
            missing: vec!["qemu-system-arm".to_owned()],
            ..Default::default()
        };
        let report = execute(&plan, &mut launcher);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.launched(), 0);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let root = temp_path("dry");
        let config = config_in(&root);
        let mut launcher = DryRunLauncher::new(Vec::new());

        let report = execute(&Plan::for_mode(Mode::Compile, &config), &mut launcher);

        assert!(!root.exists());
        assert_eq!(report.exit_code(), 0);
        let out = String::from_utf8(launcher.into_inner()).unwrap();
        let build = config.build_dir.display();
        assert_eq!(
            out,
            format!("mkdir {build}\ncd {build} && cmake\ncd {build} && make\n")
        );
    }

    #[test]
    fn test_dry_run_qemu_gdb() {
        let mut launcher = DryRunLauncher::new(Vec::new());
        execute(
            &Plan::for_mode(Mode::QemuGdb, &RunnerConfig::default()),
            &mut launcher,
        );
        let out = String::from_utf8(launcher.into_inner()).unwrap();
        assert_eq!(
            out,
            "qemu-system-arm -machine versatilepb -cpu cortex-a8 -m 256 -serial mon:stdio \
             -no-reboot -gdb tcp::1234 -kernel build/kern/kernel -S\n"
        );
    }

    #[test]
    fn test_system_launcher_missing_program() {
        let inv = Invocation::new("kernrun-no-such-tool-3f9c", Vec::<String>::new());
        let err = SystemLauncher.launch(&inv).unwrap_err();
        match err {
            LaunchError::Spawn { program, source } => {
                assert_eq!(program, "kernrun-no-such-tool-3f9c");
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_system_launcher_status_and_cwd() {
        let dir = temp_path("cwd");
        fs::create_dir_all(&dir).unwrap();
        let dir = dir.canonicalize().unwrap();

        let inv = Invocation::new("sh", ["-c", "exit 7"]);
        assert_eq!(SystemLauncher.launch(&inv).unwrap().code, Some(7));

        let inv = Invocation::new("sh", ["-c", "pwd -P > where"]).in_dir(&dir);
        assert!(SystemLauncher.launch(&inv).unwrap().success());
        let recorded = fs::read_to_string(dir.join("where")).unwrap();
        assert_eq!(PathBuf::from(recorded.trim()), dir);
        let _ = fs::remove_dir_all(dir);
    }
}
