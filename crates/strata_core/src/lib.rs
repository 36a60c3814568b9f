//! STRATA Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! Values hash through a stable, cross-platform encoding.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hash;
pub mod id;
pub mod key;
pub mod value;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use hash::{Hash, Hasher};
pub use id::{SessionId, TaskRunId};
pub use key::CacheKey;
pub use value::Value;
