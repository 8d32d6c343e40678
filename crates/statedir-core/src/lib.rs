//! statedir Core - error and logging facilities
//!
//! This crate provides the ambient pieces shared by every statedir crate:
//! - `StageError`, one variant per failure site of a staging operation
//! - `ExError` / `ExErrorKind`, the structured error with stable codes
//! - The logging facility (`init`, `log_op_*` macros, test capture)

pub mod errors;
pub mod logging_facility;

// Macros expand to paths under this re-export so callers need not depend on it directly
#[doc(hidden)]
pub use statedir_core_types;

pub use errors::{ExError, ExErrorKind, Result, StageError};
