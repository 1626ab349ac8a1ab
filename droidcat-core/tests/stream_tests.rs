//! Logcat stream engine lifecycle against a scripted bridge

#![cfg(unix)]

mod common;

use common::{events_until_closed, next_event, process_gone, read_pid, FakeAdb};
use droidcat_core::{AdbExecutor, BridgeError, LogLevel, LogcatEvent, LogcatStream};
use std::path::Path;
use std::time::Duration;

/// Emits one line split across two writes, a garbage line and a dangling
/// partial line, then exits.
const SHORT_SESSION: &str = r#"echo "$*" >> "$(dirname "$0")/calls"
case "$*" in
  *"logcat -c"*) exit 0 ;;
  *logcat*)
    printf '01-10 12:34:56.789  1234  5678 D MyTag   : Hel'
    sleep 0.2
    printf 'lo world\n01-10 12:34:56.790  1234  5678 E Crash: boom\ngarbage\n'
    printf '01-10 12:34:56.791  1234  5678 I Tail: no newline'
    exit 0 ;;
esac
exit 0"#;

/// Records its pid and blocks until killed
const LONG_SESSION: &str = r#"case "$*" in
  *logcat*) echo $$ > "$(dirname "$0")/pid"; exec sleep 30 ;;
esac
exit 0"#;

fn entry_messages(events: &[LogcatEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            LogcatEvent::Entry(entry) => Some(format!("{}/{}", entry.tag, entry.message)),
            _ => None,
        })
        .collect()
}

async fn wait_for_pid(dir: &Path) -> u32 {
    read_pid(&dir.join("pid")).await
}

#[tokio::test]
async fn test_session_runs_to_natural_exit() {
    let adb = FakeAdb::new(SHORT_SESSION);
    let stream = LogcatStream::new(AdbExecutor::with_path(adb.path()), 100);
    let mut subscription = stream.subscribe();

    let session_id = stream.start(None, &[]).await.unwrap();

    match next_event(&mut subscription).await {
        LogcatEvent::Started { session_id: id, serial } => {
            assert_eq!(id, session_id);
            assert_eq!(serial, None);
        }
        other => panic!("expected Started, got {:?}", other),
    }

    let events = events_until_closed(&mut subscription).await;
    assert_eq!(entry_messages(&events), vec!["MyTag/Hello world", "Crash/boom"]);
    assert_eq!(
        events.last(),
        Some(&LogcatEvent::Closed {
            session_id,
            exit_code: Some(0)
        })
    );

    assert!(!stream.is_running().await);
    let buffered = stream.entries().unwrap();
    assert_eq!(buffered.len(), 2);
    assert_eq!(buffered[0].pid, 1234);
    assert_eq!(buffered[1].level, LogLevel::Error);
}

#[tokio::test]
async fn test_filters_apply_to_live_session() {
    let adb = FakeAdb::new(SHORT_SESSION);
    let stream = LogcatStream::new(AdbExecutor::with_path(adb.path()), 100);
    stream.set_min_level(LogLevel::Warning);
    let mut subscription = stream.subscribe();

    stream.start(None, &[]).await.unwrap();
    let events = events_until_closed(&mut subscription).await;

    assert_eq!(entry_messages(&events), vec!["Crash/boom"]);
    assert_eq!(stream.buffer().len(), 1);
}

#[tokio::test]
async fn test_buffer_survives_sessions_until_cleared() {
    let adb = FakeAdb::new(SHORT_SESSION);
    let stream = LogcatStream::new(AdbExecutor::with_path(adb.path()), 3);
    let mut subscription = stream.subscribe();

    stream.start(None, &[]).await.unwrap();
    events_until_closed(&mut subscription).await;
    stream.start(None, &[]).await.unwrap();
    events_until_closed(&mut subscription).await;

    // capacity 3, four accepted entries: the oldest was evicted
    let stats = stream.buffer().stats().unwrap();
    assert_eq!(stats.total_entries, 3);
    assert_eq!(stats.evicted, 1);

    stream.clear().unwrap();
    assert!(stream.buffer().is_empty());
}

#[tokio::test]
async fn test_tags_and_serial_reach_the_bridge() {
    let adb = FakeAdb::new(r#"echo "args: $*" 1>&2; exit 0"#);
    let stream = LogcatStream::new(AdbExecutor::with_path(adb.path()), 10);
    let mut subscription = stream.subscribe();

    stream
        .start(Some("emulator-5554"), &["MyTag".to_string()])
        .await
        .unwrap();

    match next_event(&mut subscription).await {
        LogcatEvent::Started { serial, .. } => assert_eq!(serial.as_deref(), Some("emulator-5554")),
        other => panic!("expected Started, got {:?}", other),
    }
    let events = events_until_closed(&mut subscription).await;
    let errors: Vec<&String> = events
        .iter()
        .filter_map(|event| match event {
            LogcatEvent::Error(message) => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(
        errors,
        vec!["args: -s emulator-5554 logcat -v threadtime MyTag:V *:S"]
    );
}

#[tokio::test]
async fn test_single_session_stop_and_restart() {
    let adb = FakeAdb::new(LONG_SESSION);
    let stream = LogcatStream::new(AdbExecutor::with_path(adb.path()), 10);
    let mut subscription = stream.subscribe();

    let first = stream.start(None, &[]).await.unwrap();
    assert!(stream.is_running().await);
    assert_eq!(stream.session_id().await, Some(first));
    let pid = wait_for_pid(adb.dir()).await;

    let err = stream.start(None, &[]).await.unwrap_err();
    assert_eq!(
        err,
        BridgeError::AlreadyRunning {
            session_id: first.to_string()
        }
    );

    stream.stop().await;
    assert!(!stream.is_running().await);
    assert!(process_gone(pid).await, "logcat process {} survived stop", pid);

    assert!(matches!(next_event(&mut subscription).await, LogcatEvent::Started { .. }));
    assert_eq!(
        next_event(&mut subscription).await,
        LogcatEvent::Closed {
            session_id: first,
            exit_code: None
        }
    );

    // a second stop is a no-op
    stream.stop().await;

    tokio::fs::remove_file(adb.dir().join("pid")).await.unwrap();
    let second = stream.restart(None, &[]).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(stream.session_id().await, Some(second));
    let second_pid = wait_for_pid(adb.dir()).await;

    let third = stream.restart(None, &[]).await.unwrap();
    assert_ne!(second, third);
    assert!(process_gone(second_pid).await);

    stream.stop().await;
    assert!(stream.session_id().await.is_none());
}

#[tokio::test]
async fn test_clear_device_log_targets_last_serial() {
    let adb = FakeAdb::new(SHORT_SESSION);
    let stream = LogcatStream::new(AdbExecutor::with_path(adb.path()), 10);
    let mut subscription = stream.subscribe();

    stream.start(Some("emulator-5554"), &[]).await.unwrap();
    events_until_closed(&mut subscription).await;

    let result = stream.clear_device_log().await.unwrap();
    assert!(result.success());

    let calls = tokio::fs::read_to_string(adb.dir().join("calls")).await.unwrap();
    assert!(
        calls.lines().any(|line| line == "-s emulator-5554 logcat -c"),
        "calls: {}",
        calls
    );
}

#[tokio::test]
async fn test_subscription_as_stream() {
    use futures::StreamExt;

    let adb = FakeAdb::new(SHORT_SESSION);
    let stream = LogcatStream::new(AdbExecutor::with_path(adb.path()), 10);
    let events = stream.subscribe().into_stream();

    stream.start(None, &[]).await.unwrap();
    let collected: Vec<LogcatEvent> = tokio::time::timeout(
        Duration::from_secs(10),
        events
            .take_while(|event| {
                let open = !matches!(event, LogcatEvent::Closed { .. });
                async move { open }
            })
            .collect(),
    )
    .await
    .unwrap();

    assert_eq!(entry_messages(&collected).len(), 2);
}
