// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(missing_docs)]

//! Shell completion generation tests.

use std::process::Command;

fn scriptbox() -> Command {
    Command::new(env!("CARGO_BIN_EXE_scriptbox"))
}

#[test]
fn bash_completions_mention_the_binary() {
    let output = scriptbox().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("scriptbox"));
}

#[test]
fn zsh_and_fish_completions_generate() {
    for shell in ["zsh", "fish"] {
        let output = scriptbox().args(["completions", shell]).output().unwrap();
        assert!(output.status.success(), "completions {shell} failed");
        assert!(!output.stdout.is_empty());
    }
}

#[test]
fn unknown_shell_is_rejected() {
    let output = scriptbox()
        .args(["completions", "powershell9000"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
