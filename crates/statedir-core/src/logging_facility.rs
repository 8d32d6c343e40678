//! Structured logging for staging operations
//!
//! - [`init`] installs the process subscriber for a [`Profile`]
//! - `log_op_*` macros emit the operation boundaries (`start`, `end`,
//!   `end_error`, `abort`) with the canonical fields from
//!   `statedir_core_types::schema`
//! - [`test_capture`] records events in memory for assertions
//!
//! ```rust
//! use statedir_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
