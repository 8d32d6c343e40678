// End-to-end publication scenarios for both stagers:
// absent -> "a" committed -> "b" fails mid-population -> "c" committed

mod common;

use common::{read_tree, setup_target, sibling_names, write_tree, FetchError};
use statedir_store::{purge, stage_dir, stage_file, FileOptions, RecoveryPolicy, StageOptions};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn publish_dir(target: &Path, content: &'static str, fail: bool) -> Result<(), FetchError> {
    stage_dir(target, StageOptions::default(), |staging| {
        write_tree(staging, &[("content", content)]);
        if fail {
            return Err(FetchError::Upstream("interrupted"));
        }
        write_tree(staging, &[("complete", "yes")]);
        Ok(())
    })
}

fn publish_file(target: &Path, content: &'static str, fail: bool) -> Result<(), FetchError> {
    stage_file(target, FileOptions::text(), |file| {
        file.write_text(content)?;
        if fail {
            return Err(FetchError::Upstream("interrupted"));
        }
        Ok(())
    })
}

#[test]
fn test_directory_publication_scenario() {
    let (dir, target) = setup_target("state");

    // Stage "a" into an absent target and commit
    publish_dir(&target, "a", false).unwrap();
    assert_eq!(fs::read_to_string(target.join("content")).unwrap(), "a");

    // Stage "b" and fail mid-population: "a" stays
    assert!(publish_dir(&target, "b", true).is_err());
    assert_eq!(
        read_tree(&target),
        vec![
            ("complete".to_string(), "yes".to_string()),
            ("content".to_string(), "a".to_string())
        ]
    );

    // Stage "c" and commit
    publish_dir(&target, "c", false).unwrap();
    assert_eq!(fs::read_to_string(target.join("content")).unwrap(), "c");
    assert_eq!(sibling_names(dir.path()), vec!["state".to_string()]);
}

#[test]
fn test_file_publication_scenario() {
    let (dir, target) = setup_target("state.txt");

    publish_file(&target, "a", false).unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "a");

    assert!(publish_file(&target, "b", true).is_err());
    assert_eq!(fs::read_to_string(&target).unwrap(), "a");

    publish_file(&target, "c", false).unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "c");
    assert_eq!(sibling_names(dir.path()), vec!["state.txt".to_string()]);
}

#[test]
fn test_crash_debris_is_cleaned_and_operation_proceeds() {
    // Given: Debris from a process killed during population
    let (dir, target) = setup_target("state");
    write_tree(&target, &[("content", "a")]);
    write_tree(&dir.path().join("state.new"), &[("content", "half")]);

    // When: The next operation runs
    publish_dir(&target, "b", false).unwrap();

    // Then: It published normally and left no debris
    assert_eq!(fs::read_to_string(target.join("content")).unwrap(), "b");
    assert_eq!(sibling_names(dir.path()), vec!["state".to_string()]);
}

#[test]
fn test_crash_between_renames_recovers_previous_tree() {
    // Given: The layout a kill between the two commit renames leaves behind
    let (dir, target) = setup_target("state");
    write_tree(&dir.path().join("state.old"), &[("content", "a")]);
    write_tree(&dir.path().join("state.new"), &[("content", "b")]);

    // When: Only the debris purge runs, with the default policy
    let outcome = purge(&target, RecoveryPolicy::RestoreBackup).unwrap();

    // Then: The previous tree is live again and readers never see an absent target
    assert!(outcome.restored_backup);
    assert_eq!(fs::read_to_string(target.join("content")).unwrap(), "a");
    assert_eq!(sibling_names(dir.path()), vec!["state".to_string()]);
}

#[test]
fn test_purge_on_clean_target_is_noop() {
    let (dir, target) = setup_target("state");
    write_tree(&target, &[("content", "a")]);

    let first = purge(&target, RecoveryPolicy::RestoreBackup).unwrap();
    let second = purge(&target, RecoveryPolicy::Discard).unwrap();

    assert!(first.is_noop());
    assert!(second.is_noop());
    assert_eq!(fs::read_to_string(target.join("content")).unwrap(), "a");
    assert_eq!(sibling_names(dir.path()), vec!["state".to_string()]);
}

#[test]
fn test_independent_targets_stage_concurrently() {
    let (dir, _) = setup_target("unused");
    let root = dir.path().to_path_buf();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let target = root.join(format!("repo-{}", i));
            std::thread::spawn(move || {
                for round in 0..5 {
                    let content = if round % 2 == 0 { "even" } else { "odd" };
                    publish_dir(&target, content, false).unwrap();
                }
                target
            })
        })
        .collect();

    for handle in handles {
        let target = handle.join().unwrap();
        assert_eq!(fs::read_to_string(target.join("content")).unwrap(), "even");
    }
    assert_eq!(sibling_names(&root).len(), 8);
}

const PAYLOAD_LEN: usize = 64 * 1024;

fn payload(round: usize) -> String {
    let fill = if round % 2 == 0 { "a" } else { "b" };
    fill.repeat(PAYLOAD_LEN)
}

/// A payload is whole when it has full length and a single fill byte
fn assert_whole(bytes: &[u8]) {
    assert_eq!(bytes.len(), PAYLOAD_LEN, "reader saw a truncated artifact");
    assert!(
        bytes.iter().all(|b| *b == bytes[0]),
        "reader saw a mix of two artifacts"
    );
}

/// Read `path` on a separate thread until `stop` is set; returns whole reads
fn spawn_reader(path: PathBuf, stop: Arc<AtomicBool>) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let mut whole = 0;
        loop {
            match fs::read(&path) {
                Ok(bytes) => {
                    assert_whole(&bytes);
                    whole += 1;
                }
                // Directory commits leave live absent between the two renames
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => panic!("unexpected read error: {}", e),
            }
            if stop.load(Ordering::Relaxed) {
                return whole;
            }
        }
    })
}

#[test]
fn test_file_reader_sees_only_whole_artifacts() {
    let (dir, target) = setup_target("state.txt");
    stage_file(&target, FileOptions::text(), |file| file.write_text(&payload(0))).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let reader = spawn_reader(target.clone(), Arc::clone(&stop));

    for round in 1..40 {
        let content = payload(round);
        stage_file(&target, FileOptions::text(), |file| file.write_text(&content)).unwrap();
    }
    stop.store(true, Ordering::Relaxed);

    assert!(reader.join().unwrap() > 0);
    assert_whole(&fs::read(&target).unwrap());
    assert_eq!(sibling_names(dir.path()), vec!["state.txt".to_string()]);
}

#[test]
fn test_directory_reader_sees_only_whole_artifacts() {
    let (dir, target) = setup_target("state");
    let publish = |round: usize| {
        let content = payload(round);
        stage_dir(&target, StageOptions::default(), |staging| {
            write_tree(staging, &[("content", content.as_str())]);
            Ok::<_, FetchError>(())
        })
        .unwrap();
    };
    publish(0);

    let stop = Arc::new(AtomicBool::new(false));
    let reader = spawn_reader(target.join("content"), Arc::clone(&stop));

    for round in 1..40 {
        publish(round);
    }
    stop.store(true, Ordering::Relaxed);

    reader.join().unwrap();
    assert_whole(&fs::read(target.join("content")).unwrap());
    assert_eq!(sibling_names(dir.path()), vec!["state".to_string()]);
}

#[test]
fn test_repeated_abort_and_purge_are_harmless() {
    let (dir, target) = setup_target("state");
    publish_dir(&target, "a", false).unwrap();

    // Two failed populations in a row, then cleanup twice over
    assert!(publish_dir(&target, "b", true).is_err());
    assert!(publish_dir(&target, "c", true).is_err());
    let first = purge(&target, RecoveryPolicy::RestoreBackup).unwrap();
    let second = purge(&target, RecoveryPolicy::RestoreBackup).unwrap();

    assert!(first.is_noop());
    assert!(second.is_noop());
    assert_eq!(fs::read_to_string(target.join("content")).unwrap(), "a");
    assert_eq!(sibling_names(dir.path()), vec!["state".to_string()]);
}
