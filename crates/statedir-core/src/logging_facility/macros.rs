//! Operation boundary macros
//!
//! Every public staging operation emits `start`, then exactly one of `end`,
//! `end_error` or `abort`. Extra `key = value` fields are passed through to
//! `tracing` unchanged, so `%` and `?` sigils work as usual.

#[doc(hidden)]
#[macro_export]
macro_rules! __log_op_boundary {
    ($level:ident, $op:expr, $event:ident $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = module_path!(),
            op = $op,
            event = $crate::statedir_core_types::schema::$event
            $(, $($field)*)?
        )
    };
}

/// Log the start of an operation
///
/// ```
/// # use statedir_core::log_op_start;
/// log_op_start!("stage_dir");
/// log_op_start!("stage_dir", target_path = "/srv/state/repo");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)*)?) => {
        $crate::__log_op_boundary!(info, $op, EVENT_START $(, $($field)*)?)
    };
}

/// Log the successful end of an operation
///
/// ```
/// # use statedir_core::log_op_end;
/// log_op_end!("stage_dir", duration_ms = 42);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        $crate::__log_op_boundary!(
            info, $op, EVENT_END, duration_ms = $duration $(, $($field)*)?
        )
    };
}

/// Log a failed operation
///
/// `$err` is anything convertible into `ExError` (including `&StageError`),
/// which supplies the `err.kind` and `err.code` fields.
///
/// ```
/// # use statedir_core::{log_op_error, ExError, ExErrorKind};
/// let err = ExError::new(ExErrorKind::CommitFailed);
/// log_op_error!("stage_dir", err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        $crate::__log_op_boundary!(
            error,
            $op,
            EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?ex_err.kind(),
            err.code = ex_err.code(),
            err.message = ex_err.message()
            $(, $($field)*)?
        );
    }};
}

/// Log that population failed and the staged content was discarded
///
/// The caller's error type is opaque here, so only the boundary is recorded.
///
/// ```
/// # use statedir_core::log_op_abort;
/// log_op_abort!("stage_file", duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_abort {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        $crate::__log_op_boundary!(
            warn, $op, EVENT_ABORT, duration_ms = $duration $(, $($field)*)?
        )
    };
}
