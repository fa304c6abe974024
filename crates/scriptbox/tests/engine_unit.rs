// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(missing_docs)]

//! Engine seam tests: registry bookkeeping, platform conditions, and
//! execution-context behavior that is not covered by the command tests.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use scriptbox::engine::{platform_conditions, CmdRegistry, ExecContext, RESERVED_COMMANDS};

#[test]
fn reserved_commands_cover_the_engine_builtins() {
    for name in ["exec", "env", "cd", "stdout", "stderr", "grep", "exists"] {
        assert!(RESERVED_COMMANDS.contains(&name), "'{name}' should be reserved");
    }
}

#[test]
fn registry_names_are_sorted() {
    let mut registry = CmdRegistry::new();
    scriptbox::commands::register_all(&mut registry).unwrap();
    let names: Vec<&str> = registry.names().collect();
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);
}

#[test]
fn exactly_one_platform_family_condition_holds() {
    let conditions = platform_conditions();
    let by_name = |name: &str| {
        conditions
            .iter()
            .find(|condition| condition.name == name)
            .unwrap()
    };
    let unix = (by_name("unix").eval)();
    let windows = (by_name("windows").eval)();
    assert_ne!(unix, windows, "a host is either unix or windows");

    #[cfg(target_os = "linux")]
    {
        assert!((by_name("linux").eval)());
        assert!(!(by_name("macos").eval)());
    }
}

#[test]
fn context_env_is_caller_controlled() {
    let mut env = BTreeMap::new();
    env.insert("ONLY".to_string(), "this".to_string());
    let mut ctx = ExecContext::new("/tmp", env);

    assert_eq!(ctx.getenv("ONLY"), Some("this"));
    assert_eq!(ctx.getenv("PATH"), None, "nothing is inherited implicitly");

    ctx.setenv("ADDED", "later");
    assert_eq!(ctx.getenv("ADDED"), Some("later"));
}

#[test]
fn update_flag_comes_from_the_environment() {
    let mut env = BTreeMap::new();
    env.insert("UPDATE_SNAPSHOTS".to_string(), "1".to_string());
    let ctx = ExecContext::new("/tmp", env);
    assert!(ctx.update_snapshots());

    let ctx = ExecContext::new("/tmp", BTreeMap::new());
    assert!(!ctx.update_snapshots());
}

#[test]
fn clamp_timeout_without_a_deadline_is_identity() {
    let ctx = ExecContext::new("/tmp", BTreeMap::new());
    assert_eq!(
        ctx.clamp_timeout(Duration::from_secs(30)),
        Duration::from_secs(30)
    );
}

#[test]
fn clamp_timeout_honors_the_sooner_deadline() {
    let mut ctx = ExecContext::new("/tmp", BTreeMap::new());
    ctx.set_deadline(Instant::now() + Duration::from_millis(100));
    let clamped = ctx.clamp_timeout(Duration::from_secs(30));
    assert!(clamped <= Duration::from_millis(100));

    // A timeout already shorter than the deadline is untouched.
    ctx.set_deadline(Instant::now() + Duration::from_secs(60));
    let clamped = ctx.clamp_timeout(Duration::from_millis(10));
    assert_eq!(clamped, Duration::from_millis(10));
}

#[test]
fn default_snapshot_dir_sits_under_testdata() {
    let ctx = ExecContext::new("/work/run-1", BTreeMap::new());
    assert_eq!(
        ctx.snapshot_dir(),
        std::path::Path::new("/work/run-1/testdata/__snapshots__")
    );
}
