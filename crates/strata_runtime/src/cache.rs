//! Cache validation over the work-folder attempt chain.

use crate::context::Environment;
use crate::error::{TaskError, TaskResult};
use crate::outputs::{BoundOutput, OutputResolver};
use crate::run::TaskRun;
use crate::template::TaskTemplate;
use std::fmt;
use strata_core::CacheKey;
use strata_storage::{ExitMarker, FolderAllocator, MarkerState, WorkFolder};

/// Why a folder was not accepted as a cache entry.
///
/// A miss is an ordinary outcome, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheMiss {
    /// No folder exists for the key
    FolderAbsent,
    /// Folder exists but no exit marker was written
    MarkerAbsent,
    /// Marker content is not a decimal exit code
    MarkerCorrupt(String),
    /// Marker could not be read
    Unreadable(String),
    /// Recorded exit code is not accepted
    ExitRejected(i32),
    /// A required output did not resolve
    OutputMissing(String),
}

impl fmt::Display for CacheMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FolderAbsent => write!(f, "no work folder"),
            Self::MarkerAbsent => write!(f, "no exit marker"),
            Self::MarkerCorrupt(text) => write!(f, "corrupt exit marker `{}`", text),
            Self::Unreadable(reason) => write!(f, "unreadable exit marker: {}", reason),
            Self::ExitRejected(code) => write!(f, "recorded exit status {} not accepted", code),
            Self::OutputMissing(name) => write!(f, "output `{}` missing", name),
        }
    }
}

/// Result of a cache lookup
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// A complete previous run was found
    Hit {
        /// Folder holding the cached run
        folder: WorkFolder,
        /// Recorded exit status
        exit_code: i32,
        /// Outputs resolved from that folder
        outputs: Vec<BoundOutput>,
    },
    /// Nothing reusable; the last reason seen
    Miss(CacheMiss),
}

/// Decides whether a previous run can stand in for a new one
pub struct CacheValidator;

impl CacheValidator {
    /// Look up `key` along its attempt chain.
    ///
    /// The first folder with an accepted marker and fully resolving outputs
    /// is a hit.
    ///
    /// # Errors
    ///
    /// Returns error only for failures unrelated to the folder's validity,
    /// such as an output expression that cannot be rendered
    pub fn lookup(
        allocator: &FolderAllocator,
        key: &CacheKey,
        template: &TaskTemplate,
        run: &TaskRun,
        env: &Environment,
    ) -> TaskResult<CacheLookup> {
        let mut miss = CacheMiss::FolderAbsent;

        for folder in allocator.existing(key) {
            match Self::check(&folder, template, run, env)? {
                Ok((exit_code, outputs)) => {
                    return Ok(CacheLookup::Hit {
                        folder,
                        exit_code,
                        outputs,
                    });
                }
                Err(reason) => {
                    tracing::debug!(
                        task = run.name(),
                        key = %key.short(),
                        attempt = folder.attempt,
                        %reason,
                        "cache entry rejected"
                    );
                    miss = reason;
                }
            }
        }
        Ok(CacheLookup::Miss(miss))
    }

    fn check(
        folder: &WorkFolder,
        template: &TaskTemplate,
        run: &TaskRun,
        env: &Environment,
    ) -> TaskResult<Result<(i32, Vec<BoundOutput>), CacheMiss>> {
        let exit_code = match ExitMarker::read(folder.path()) {
            Ok(MarkerState::Recorded(code)) => code,
            Ok(MarkerState::Absent) => return Ok(Err(CacheMiss::MarkerAbsent)),
            Ok(MarkerState::Corrupt(text)) => return Ok(Err(CacheMiss::MarkerCorrupt(text))),
            Err(e) => return Ok(Err(CacheMiss::Unreadable(e.to_string()))),
        };
        if !template.accepts(exit_code) {
            return Ok(Err(CacheMiss::ExitRejected(exit_code)));
        }

        match OutputResolver::resolve(template, run, env, folder.path()) {
            Ok(outputs) => Ok(Ok((exit_code, outputs))),
            Err(TaskError::MissingOutput { output, .. }) => Ok(Err(CacheMiss::OutputMissing(output))),
            Err(TaskError::Storage(e)) => Ok(Err(CacheMiss::Unreadable(e.to_string()))),
            Err(e) => Err(e),
        }
    }
}
