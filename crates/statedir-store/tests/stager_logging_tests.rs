// Operation boundary logging for the stagers

mod common;

use common::{setup_target, FetchError};
use statedir_core::logging_facility::test_capture::init_test_capture;
use statedir_core::StageError;
use statedir_core_types::schema::{
    EVENT_ABORT, EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_ERR_CODE, FIELD_OP_ID,
};
use statedir_store::{purge, stage_dir, stage_file, FileOptions, RecoveryPolicy, StageOptions};
use std::fs;

#[test]
fn test_successful_stage_dir_logs_start_and_end() {
    let capture = init_test_capture();
    let (_dir, target) = setup_target("repo");

    stage_dir(&target, StageOptions::default(), |_| Ok::<_, StageError>(())).unwrap();

    assert_eq!(capture.lifecycle("stage_dir", &target), vec![EVENT_START, EVENT_END]);
    let end = capture.find("stage_dir", &target, EVENT_END).unwrap();
    assert!(end.field(FIELD_OP_ID).is_some());
}

#[test]
fn test_failed_population_logs_abort() {
    let capture = init_test_capture();
    let (_dir, target) = setup_target("index.json");

    let _: Result<(), FetchError> = stage_file(&target, FileOptions::text(), |_| {
        Err(FetchError::Upstream("boom"))
    });

    assert_eq!(capture.lifecycle("stage_file", &target), vec![EVENT_START, EVENT_ABORT]);
    let abort = capture.find("stage_file", &target, EVENT_ABORT).unwrap();
    assert_eq!(abort.level, tracing::Level::WARN);
    assert!(capture.is_closed("stage_file", &target));
}

#[test]
fn test_precondition_failure_logs_error_code() {
    let capture = init_test_capture();
    let (_dir, base) = setup_target("missing");
    let target = base.join("repo");

    let _: Result<(), StageError> = stage_dir(&target, StageOptions::default(), |_| Ok(()));

    let error = capture
        .find("stage_dir", &target, EVENT_END_ERROR)
        .expect("Should have an error event");
    assert_eq!(error.field(FIELD_ERR_CODE), Some("ERR_PRECONDITION"));
}

#[test]
fn test_purge_logs_removed_slot_count() {
    let capture = init_test_capture();
    let (dir, target) = setup_target("repo");
    fs::create_dir(dir.path().join("repo.new")).unwrap();

    purge(&target, RecoveryPolicy::Discard).unwrap();

    let end = capture
        .find("purge", &target, EVENT_END)
        .expect("Should have an end event");
    assert_eq!(end.field("removed"), Some("1"));
    assert_eq!(end.field("restored_backup"), Some("false"));
}
