//! STRATA Storage
//!
//! Hash-addressed work folders, durable exit markers and output
//! pattern matching. Nothing here overwrites a folder once created.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod folder;
pub mod marker;
pub mod pattern;

pub use error::{StorageError, StorageResult};
pub use folder::{FolderAllocator, KeyGuard, KeyLocks, WorkFolder, MAX_ATTEMPTS};
pub use marker::{ExitMarker, MarkerState, EXIT_MARKER};
pub use pattern::GlobPattern;
