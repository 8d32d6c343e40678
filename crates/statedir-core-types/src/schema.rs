//! Field keys and event names shared by every log line a staging operation emits
//!
//! Log processors and the test capture layer match on these strings, so they
//! are part of the observable interface.

/// Module path of the emitting code
pub const FIELD_COMPONENT: &str = "component";
/// Operation name, e.g. `stage_dir`, `purge`, `fetch_scratch_file`
pub const FIELD_OP: &str = "op";
/// One of the `EVENT_*` boundaries below
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
/// [`OperationId`](crate::OperationId) of the staging operation
pub const FIELD_OP_ID: &str = "op_id";
/// Live path of the target
pub const FIELD_TARGET_PATH: &str = "target_path";
pub const FIELD_ERR_KIND: &str = "err.kind";
/// Stable `ERR_*` code
pub const FIELD_ERR_CODE: &str = "err.code";

pub const EVENT_START: &str = "start";
/// Committed, or finished without needing to
pub const EVENT_END: &str = "end";
/// Failed inside the operation; the staged content did not become live
pub const EVENT_END_ERROR: &str = "end_error";
/// Population failed and staging was discarded; the caller's error is returned as-is
pub const EVENT_ABORT: &str = "abort";

/// Events that close an operation started with [`EVENT_START`]
pub const TERMINAL_EVENTS: [&str; 3] = [EVENT_END, EVENT_END_ERROR, EVENT_ABORT];
