// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::uninlined_format_args)]
#![allow(missing_docs)]

//! Session controller unit tests.
//!
//! Exercises spawn/send/expect/close lifecycle and the timing semantics
//! that distinguish a hung child from an exited one.

use std::collections::BTreeMap;
use std::io::Read;
use std::time::{Duration, Instant};

use scriptbox::matcher::Pattern;
use scriptbox::session::{Session, SessionState, SpawnConfig};
use scriptbox::Error;

fn config(command: &str, args: &[&str]) -> SpawnConfig {
    let mut config = SpawnConfig::new(command);
    config.args = args.iter().map(|arg| (*arg).to_string()).collect();
    config.env = base_env();
    config
}

fn base_env() -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for key in ["PATH", "HOME", "TMPDIR"] {
        if let Ok(value) = std::env::var(key) {
            env.insert(key.to_string(), value);
        }
    }
    env
}

fn pattern(text: &str) -> Pattern {
    Pattern::parse(text).unwrap()
}

// =============================================================================
// Spawn
// =============================================================================

#[test]
fn spawn_success() {
    let session = Session::spawn(config("/bin/echo", &["hello"]));
    assert!(session.is_ok(), "failed to spawn: {:?}", session.err());
}

#[test]
fn spawn_missing_binary_fails() {
    let result = Session::spawn(config("/nonexistent/command", &[]));
    match result {
        Ok(_) => panic!("spawning a nonexistent command should fail"),
        Err(err) => assert!(matches!(err, Error::Spawn { .. }), "got {err:?}"),
    }
}

#[test]
fn spawn_starts_in_running_state() {
    let session = Session::spawn(config("/bin/cat", &[])).unwrap();
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.is_running());
}

// =============================================================================
// Send + Expect
// =============================================================================

#[test]
fn send_then_expect_provoked_output() {
    let mut session = Session::spawn(config(
        "/bin/sh",
        &["-c", "while read line; do echo \"got:$line\"; done"],
    ))
    .unwrap();

    session.send("ping", true).unwrap();
    let start = Instant::now();
    let matched = session
        .expect(&pattern("got:ping"), Duration::from_secs(5))
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(matched.text, "got:ping");

    session.close().unwrap();
}

#[test]
fn expect_consumes_output_monotonically() {
    // Echo disabled so "marker" appears exactly once in the output.
    let mut session = Session::spawn(config("/bin/sh", &["-c", "stty -echo; cat"])).unwrap();

    session.send("one marker line", true).unwrap();
    session
        .expect(&pattern("marker"), Duration::from_secs(5))
        .unwrap();

    // The only occurrence is consumed; the same pattern must now time out.
    let err = session
        .expect(&pattern("marker"), Duration::from_millis(300))
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "got {err:?}");

    session.close().unwrap();
}

#[test]
fn expect_sees_output_produced_before_the_call() {
    let mut session = Session::spawn(config("/bin/sh", &["-c", "echo early-bird; cat"])).unwrap();

    // Give the child time to write before the first expect is issued.
    std::thread::sleep(Duration::from_millis(200));
    let matched = session
        .expect(&pattern("early-bird"), Duration::from_secs(5))
        .unwrap();
    assert_eq!(matched.text, "early-bird");

    session.close().unwrap();
}

#[test]
fn expect_regex_pattern() {
    let mut session = Session::spawn(config("/bin/sh", &["-c", "echo version 1.42; cat"])).unwrap();

    let matched = session
        .expect(&pattern(r"version \d+\.\d+"), Duration::from_secs(5))
        .unwrap();
    assert_eq!(matched.text, "version 1.42");

    session.close().unwrap();
}

#[test]
fn expect_reports_stream_closed_on_early_exit() {
    let mut session = Session::spawn(config("/bin/echo", &["short lived"])).unwrap();

    let start = Instant::now();
    let err = session
        .expect(&pattern("never printed"), Duration::from_secs(30))
        .unwrap_err();
    // The child exits immediately, so this must not wait out the deadline.
    assert!(start.elapsed() < Duration::from_secs(5));
    match err {
        Error::StreamClosed { pattern, tail } => {
            assert_eq!(pattern, "never printed");
            assert!(tail.contains("short lived"), "tail was {tail:?}");
        }
        other => panic!("expected StreamClosed, got {other:?}"),
    }

    // The session is no longer usable after the stream closed.
    let err = session.send("more", true).unwrap_err();
    assert!(matches!(err, Error::NoActiveSession { .. }), "got {err:?}");

    session.close().unwrap();
}

#[test]
fn expect_times_out_at_deadline_not_earlier() {
    let mut session = Session::spawn(config("/bin/cat", &[])).unwrap();

    let timeout = Duration::from_millis(500);
    let start = Instant::now();
    let err = session.expect(&pattern("absent"), timeout).unwrap_err();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(450), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "overshot far: {elapsed:?}");
    match err {
        Error::Timeout { pattern, waited, .. } => {
            assert_eq!(pattern, "absent");
            assert_eq!(waited, timeout);
        }
        other => panic!("expected Timeout, got {other:?}"),
    }

    session.close().unwrap();
}

#[test]
fn timeout_message_carries_unmatched_tail() {
    let mut session =
        Session::spawn(config("/bin/sh", &["-c", "echo some context here; cat"])).unwrap();

    // Let the output arrive, then look for something that is not there.
    session
        .expect(&pattern("context"), Duration::from_secs(5))
        .unwrap();
    let err = session
        .expect(&pattern("absent"), Duration::from_millis(200))
        .unwrap_err();
    match err {
        Error::Timeout { tail, .. } => {
            assert!(tail.contains("here"), "tail was {tail:?}");
        }
        other => panic!("expected Timeout, got {other:?}"),
    }

    session.close().unwrap();
}

// =============================================================================
// Close
// =============================================================================

#[test]
fn operations_after_close_fail_with_no_active_session() {
    let mut session = Session::spawn(config("/bin/cat", &[])).unwrap();
    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    let err = session.send("x", true).unwrap_err();
    assert!(matches!(err, Error::NoActiveSession { .. }), "got {err:?}");

    let err = session
        .expect(&pattern("x"), Duration::from_millis(50))
        .unwrap_err();
    assert!(matches!(err, Error::NoActiveSession { .. }), "got {err:?}");
}

#[test]
fn close_is_idempotent() {
    let mut session = Session::spawn(config("/bin/sleep", &["10"])).unwrap();
    session.close().unwrap();
    assert!(session.close().is_ok(), "second close should be a no-op");
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn close_terminates_a_long_running_child() {
    let mut session = Session::spawn(config("/bin/sleep", &["60"])).unwrap();
    let pid = session.process_id().unwrap();

    let start = Instant::now();
    session.close().unwrap();
    assert!(start.elapsed() < Duration::from_secs(5), "close should not wait for sleep");
    assert!(!pid_alive(pid), "child {pid} survived close");
}

#[test]
fn drop_cleans_up_the_child() {
    let pid = {
        let session = Session::spawn(config("/bin/sleep", &["60"])).unwrap();
        session.process_id().unwrap()
    };
    // Drop ran; give the signal a moment to land.
    std::thread::sleep(Duration::from_millis(200));
    assert!(!pid_alive(pid), "child {pid} survived drop");
}

// =============================================================================
// Interact
// =============================================================================

/// Reader that sleeps, then reports end-of-stream. Stands in for a user
/// who never types during the hand-off.
struct SilentUser(Duration);

impl Read for SilentUser {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        std::thread::sleep(self.0);
        Ok(0)
    }
}

#[test]
fn interact_returns_on_escape_without_closing_the_session() {
    let mut session = Session::spawn(config("/bin/cat", &[])).unwrap();

    // Escape byte (Ctrl-]) straight away; nothing is forwarded.
    let input = std::io::Cursor::new(vec![0x1d, b'x']);
    let mut output = Vec::new();
    session.interact(input, &mut output, 0x1d).unwrap();

    assert!(session.is_running(), "escape must hand control back, not close");
    session.close().unwrap();
}

#[test]
fn interact_forwards_input_before_escape() {
    let mut session = Session::spawn(config(
        "/bin/sh",
        &["-c", "while read line; do echo \"seen:$line\"; done"],
    ))
    .unwrap();

    let mut typed = b"hello\n".to_vec();
    typed.push(0x1d);
    let input = std::io::Cursor::new(typed);
    let mut output = Vec::new();
    session.interact(input, &mut output, 0x1d).unwrap();

    // The forwarded line reaches the child; its response lands either in
    // the interact drain or in buffered output for the next expect.
    match session.expect(&pattern("seen:hello"), Duration::from_secs(5)) {
        Ok(matched) => assert_eq!(matched.text, "seen:hello"),
        Err(_) => assert!(
            String::from_utf8_lossy(&output).contains("seen:hello"),
            "response missing from interact output: {output:?}"
        ),
    }

    session.close().unwrap();
}

#[test]
fn interact_returns_when_the_child_exits() {
    let mut session = Session::spawn(config("/bin/echo", &["goodbye"])).unwrap();

    let start = Instant::now();
    let mut output = Vec::new();
    session
        .interact(SilentUser(Duration::from_secs(10)), &mut output, 0x1d)
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(
        String::from_utf8_lossy(&output).contains("goodbye"),
        "child output should have been relayed: {output:?}"
    );

    session.close().unwrap();
}

fn pid_alive(pid: u32) -> bool {
    std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(format!("kill -0 {pid} 2>/dev/null"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
