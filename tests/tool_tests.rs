//! Stay-open tool tests against the POSIX sh stand-in in `common`.
#![cfg(unix)]

use imgload::tool::{
    CommandRequest, CommunicationMethod, ProcessState, ToolConfig, ToolError, ToolManager,
    ToolProcess,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

mod common;

use common::{exchanges, fake_config, kill_9, media};

#[test]
fn test_start_reports_version_and_stop_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let process = ToolProcess::new(fake_config(dir.path())).unwrap();
    assert_eq!(process.state(), ProcessState::Stopped);

    process.start().unwrap();
    assert_eq!(process.state(), ProcessState::Ready);
    assert_eq!(process.version().as_deref(), Some("12.40"));
    assert!(process.pid().is_some());
    assert!(matches!(
        process.start(),
        Err(ToolError::InvalidState {
            actual: ProcessState::Ready,
            ..
        })
    ));

    process.stop();
    assert_eq!(process.state(), ProcessState::Stopped);
    assert_eq!(process.pid(), None);
    assert_eq!(process.restarts(), 0);
    assert!(matches!(
        process.send(&CommandRequest::new("-ver")),
        Err(ToolError::NotRunning)
    ));
}

#[test]
fn test_success_and_failure_responses() {
    let dir = tempfile::tempdir().unwrap();
    let file = media(dir.path(), "a.jpg", "IFD0\tMake\tRECONYX");
    let process = ToolProcess::new(fake_config(dir.path())).unwrap();
    process.start().unwrap();

    let ok = process.send(&CommandRequest::for_file(&file)).unwrap();
    assert!(ok.success);
    assert_eq!(ok.payload, "IFD0\tMake\tRECONYX");

    let missing = dir.path().join("missing.jpg");
    let err = process.send(&CommandRequest::for_file(&missing)).unwrap();
    assert!(!err.success);
    assert!(err.payload.contains("File not found"));

    // The session is still usable after a failed command.
    assert!(process.send(&CommandRequest::for_file(&file)).unwrap().success);
    process.stop();
}

#[test]
fn test_via_file_handles_names_with_spaces() {
    let dir = tempfile::tempdir().unwrap();
    let file = media(dir.path(), "site 1 é.jpg", "IFD0\tModel\tHC600");
    let process = ToolProcess::new(ToolConfig {
        method: CommunicationMethod::ViaFile,
        ..fake_config(dir.path())
    })
    .unwrap();
    process.start().unwrap();
    let meta = process.fetch_metadata(&file, None).unwrap();
    assert_eq!(meta.get("Model").map(String::as_str), Some("HC600"));
    process.stop();
}

#[test]
fn test_fetch_metadata_filters_requested_tags() {
    let dir = tempfile::tempdir().unwrap();
    let file = media(dir.path(), "x.jpg", "G\tA\t1\nG\tB\t2\nG\tC\t3");
    let manager = ToolManager::new(fake_config(dir.path())).unwrap();
    let tags = vec!["A".to_string(), "C".to_string()];

    // The tool itself is asked for just those tags.
    let listing = manager
        .start_if_needed()
        .unwrap()
        .send(&CommandRequest::for_file(&file).tags(&tags))
        .unwrap();
    assert_eq!(listing.payload, "G\tA\t1\nG\tC\t3");

    let meta = manager.fetch_metadata(&file, Some(&tags)).unwrap();
    assert_eq!(meta.len(), 2);
    assert_eq!(meta["A"], "1");
    assert_eq!(meta["C"], "3");

    assert_eq!(manager.fetch_metadata(&file, None).unwrap().len(), 3);
    assert!(
        manager
            .fetch_metadata(&dir.path().join("nope.jpg"), Some(&tags))
            .unwrap()
            .is_empty()
    );
    manager.stop().wait();
    assert!(!manager.is_started());
}

#[test]
fn test_concurrent_callers_get_their_own_responses() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<PathBuf> = (0..24)
        .map(|i| media(dir.path(), &format!("{i:02}.jpg"), &format!("G\tName\tfile-{i:02}")))
        .collect();
    let manager = Arc::new(ToolManager::new(fake_config(dir.path())).unwrap());
    manager.start_if_needed().unwrap();
    let pid = manager.process().pid();

    let handles: Vec<_> = (0..6)
        .map(|t| {
            let manager = Arc::clone(&manager);
            let files = files.clone();
            thread::spawn(move || {
                for (i, f) in files.iter().enumerate().filter(|(i, _)| i % 6 == t) {
                    let meta = manager.fetch_metadata(f, None).unwrap();
                    assert_eq!(meta["Name"], format!("file-{i:02}"));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    // Same session served everyone.
    assert_eq!(manager.process().pid(), pid);
    manager.stop().wait();
}

#[test]
fn test_killed_process_is_resurrected_transparently() {
    let dir = tempfile::tempdir().unwrap();
    let file = media(dir.path(), "r.jpg", "G\tMake\tRECONYX");
    let manager = ToolManager::new(fake_config(dir.path())).unwrap();
    let process = manager.start_if_needed().unwrap();
    let first_pid = process.pid().unwrap();

    kill_9(first_pid);

    let meta = manager.fetch_metadata(&file, None).unwrap();
    assert_eq!(meta["Make"], "RECONYX");
    assert_eq!(process.restarts(), 1);
    assert_eq!(process.state(), ProcessState::Ready);
    assert_ne!(process.pid(), Some(first_pid));
    manager.stop().wait();
}

#[test]
fn test_no_resurrection_when_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let file = media(dir.path(), "n.jpg", "G\tMake\tX");
    let process = ToolProcess::new(ToolConfig {
        resurrect: false,
        ..fake_config(dir.path())
    })
    .unwrap();
    process.start().unwrap();
    let pid = process.pid().unwrap();
    kill_9(pid);

    assert!(process.send(&CommandRequest::for_file(&file)).is_err());
    assert_eq!(process.restarts(), 0);
    assert_eq!(process.state(), ProcessState::Stopped);
}

#[test]
fn test_missing_executable_fails_fast() {
    let err = ToolManager::new(ToolConfig::with_exe("/definitely/not/here/exiftool"))
        .err()
        .unwrap();
    assert!(matches!(err, ToolError::NotFound { .. }));
}

#[test]
fn test_auto_retries_rejected_direct_command_via_argument_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = media(dir.path(), "d.jpg", "IFD0\tMake\tBUSHNELL");
    std::fs::write(dir.path().join("direct-fails"), "").unwrap();
    let process = ToolProcess::new(fake_config(dir.path())).unwrap();
    process.start().unwrap();

    let response = process.send(&CommandRequest::for_file(&file)).unwrap();
    assert!(response.success);
    assert_eq!(response.payload, "IFD0\tMake\tBUSHNELL");
    assert_eq!(exchanges(dir.path()), vec!["direct", "via-file"]);
    assert_eq!(process.restarts(), 0);
    process.stop();
}

#[test]
fn test_direct_method_does_not_retry() {
    let dir = tempfile::tempdir().unwrap();
    let file = media(dir.path(), "d.jpg", "IFD0\tMake\tBUSHNELL");
    std::fs::write(dir.path().join("direct-fails"), "").unwrap();
    let process = ToolProcess::new(ToolConfig {
        method: CommunicationMethod::Direct,
        ..fake_config(dir.path())
    })
    .unwrap();
    process.start().unwrap();

    let response = process.send(&CommandRequest::for_file(&file)).unwrap();
    assert!(!response.success);
    assert!(response.payload.contains("File not found"));
    assert_eq!(exchanges(dir.path()), vec!["direct"]);
    process.stop();
}

#[test]
fn test_silent_command_is_no_response_and_drops_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let file = media(dir.path(), "no-reply.jpg", "G\tMake\tX");
    let process = ToolProcess::new(ToolConfig {
        resurrect: false,
        response_timeout: Duration::from_secs(1),
        ..fake_config(dir.path())
    })
    .unwrap();
    process.start().unwrap();

    let err = process.send(&CommandRequest::for_file(&file)).unwrap_err();
    assert!(matches!(err, ToolError::NoResponse { tag: 1, .. }));
    assert!(err.is_session_lost());
    assert_eq!(process.state(), ProcessState::Stopped);
    assert_eq!(process.pid(), None);
}

#[test]
fn test_silent_command_is_retried_on_a_fresh_session() {
    let dir = tempfile::tempdir().unwrap();
    let file = media(dir.path(), "no-reply.jpg", "G\tMake\tX");
    let process = ToolProcess::new(ToolConfig {
        response_timeout: Duration::from_secs(1),
        ..fake_config(dir.path())
    })
    .unwrap();
    process.start().unwrap();
    let first_pid = process.pid().unwrap();

    let response = process.send(&CommandRequest::for_file(&file)).unwrap();
    assert!(response.success);
    assert_eq!(response.payload, "G\tMake\tX");
    assert_eq!(process.restarts(), 1);
    assert_ne!(process.pid(), Some(first_pid));
    process.stop();
}

#[test]
fn test_output_without_sentinel_never_leaks_into_next_command() {
    let dir = tempfile::tempdir().unwrap();
    let half = media(dir.path(), "half-reply.jpg", "G\tMake\tHALF");
    let next = media(dir.path(), "next.jpg", "G\tMake\tNEXT");
    let process = ToolProcess::new(ToolConfig {
        response_timeout: Duration::from_secs(1),
        ..fake_config(dir.path())
    })
    .unwrap();
    process.start().unwrap();
    let first_pid = process.pid().unwrap();

    // The unterminated answer is dropped with its session; the retry answers in full.
    let response = process.send(&CommandRequest::for_file(&half)).unwrap();
    assert_eq!(response.payload, "G\tMake\tHALF");
    assert_eq!(process.restarts(), 1);
    assert_ne!(process.pid(), Some(first_pid));

    let response = process.send(&CommandRequest::for_file(&next)).unwrap();
    assert_eq!(response.payload, "G\tMake\tNEXT");
    process.stop();
}
