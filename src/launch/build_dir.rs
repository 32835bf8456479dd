//! Creating the build directory.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};

use super::{LResult, LaunchError};

/// How much a failed directory creation matters.
///
/// An existing directory is never a failure under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirPolicy {
    /// Warn about any other failure and carry on; later steps will report
    /// their own problems.
    #[default]
    BestEffort,
    /// Any other failure is an error.
    Strict,
}

/// What [ensure_dir] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirStatus {
    /// The directory was made.
    Created,
    /// It was already there.
    Existed,
    /// Creation failed and [DirPolicy::BestEffort] let it slide.
    Ignored(io::ErrorKind),
    /// Nothing was touched (dry run).
    Planned,
}

/// Creates `path` (not its parents) unless it already exists.
///
/// # Errors
///
/// Only under [DirPolicy::Strict], for failures other than "already exists".
pub fn ensure_dir(path: &Path, policy: DirPolicy) -> LResult<DirStatus> {
    match fs::create_dir(path) {
        Ok(()) => {
            debug!("created {}", path.display());
            Ok(DirStatus::Created)
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            debug!("reusing {}", path.display());
            Ok(DirStatus::Existed)
        }
        Err(err) => match policy {
            DirPolicy::BestEffort => {
                warn!("could not create {}: {err}", path.display());
                Ok(DirStatus::Ignored(err.kind()))
            }
            DirPolicy::Strict => Err(LaunchError::CreateDir {
                path: PathBuf::from(path),
                source: err,
            }),
        },
    }
}
