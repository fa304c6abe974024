//! Script commands for driving interactive programs.
//!
//! These adapt the session controller onto the engine's string-argument
//! calling convention. The DSL surface addresses "the current session"
//! implicitly; internally every call resolves the handle stored in the
//! execution context's registry, so no ambient state leaks across runs.
//!
//! ```text
//! expect:spawn python
//! expect:expect ">>>" 5
//! expect:send "print(40 + 2)"
//! expect:expect "42"
//! expect:close
//! ```

use std::time::Duration;

use nix::sys::termios::{self, SetArg, Termios};

use crate::engine::{CmdOutput, CmdUsage, ExecContext, ScriptCmd};
use crate::error::{Error, Result};
use crate::matcher::Pattern;
use crate::session::{Session, SessionHandle, SpawnConfig, DEFAULT_ESCAPE, DEFAULT_EXPECT_TIMEOUT};

/// `expect:spawn PROGRAM [ARGS...]` — start a new interactive process.
pub struct SpawnCmd;

impl ScriptCmd for SpawnCmd {
    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Start a new process to interact with",
            args: "program [args...]",
            detail: &[
                "expect:spawn starts a new interactive process that can be controlled with \
                 subsequent expect commands. The process remains running until explicitly \
                 closed or until the script ends. Spawning while a session is already \
                 active closes the previous session's process first.",
            ],
        }
    }

    fn run(&self, ctx: &mut ExecContext, args: &[String]) -> Result<CmdOutput> {
        let Some(program) = args.first() else {
            return Err(usage_error(
                "expect:spawn",
                self.usage(),
                "a program name is required",
            ));
        };
        let mut config = SpawnConfig::new(program);
        config.args = args.get(1..).unwrap_or_default().to_vec();
        config.cwd = Some(ctx.work_dir().to_path_buf());
        config.env = ctx.env().clone();
        let session = Session::spawn(config)?;
        ctx.sessions_mut().insert(session);
        Ok(CmdOutput::default())
    }
}

/// `expect:send TEXT [no_newline]` — write input to the current session.
pub struct SendCmd;

impl ScriptCmd for SendCmd {
    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Send input to the spawned process",
            args: "input [no_newline]",
            detail: &[
                "expect:send writes the given text to the current session's input. A \
                 trailing newline is appended unless 'no_newline' is passed as the \
                 second argument.",
            ],
        }
    }

    fn run(&self, ctx: &mut ExecContext, args: &[String]) -> Result<CmdOutput> {
        let Some(text) = args.first() else {
            return Err(usage_error(
                "expect:send",
                self.usage(),
                "input text is required",
            ));
        };
        let newline = match args.get(1).map(String::as_str) {
            None => true,
            Some("no_newline") => false,
            Some(other) => {
                return Err(usage_error(
                    "expect:send",
                    self.usage(),
                    format!("unexpected argument '{other}'"),
                ));
            }
        };
        let session = active_session(ctx, "send")?;
        session.send(text, newline)?;
        Ok(CmdOutput::default())
    }
}

/// `expect:expect PATTERN [TIMEOUT_SECONDS]` — wait for output.
pub struct ExpectCmd;

impl ScriptCmd for ExpectCmd {
    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Wait for a pattern in the output",
            args: "pattern [timeout_seconds]",
            detail: &[
                "expect:expect blocks until the pattern (a literal substring, or a \
                 regular expression when it contains regex metacharacters) appears in \
                 output produced since the last successful expect. It fails when the \
                 timeout elapses (default 30 seconds) or when the process exits before \
                 the pattern is seen; the two failures are reported distinctly.",
            ],
        }
    }

    fn run(&self, ctx: &mut ExecContext, args: &[String]) -> Result<CmdOutput> {
        let Some(raw_pattern) = args.first() else {
            return Err(usage_error(
                "expect:expect",
                self.usage(),
                "a pattern is required",
            ));
        };
        let timeout = match args.get(1) {
            None => DEFAULT_EXPECT_TIMEOUT,
            Some(text) => {
                let seconds: u64 = text.parse().map_err(|_| {
                    usage_error(
                        "expect:expect",
                        self.usage(),
                        format!("timeout '{text}' is not a whole number of seconds"),
                    )
                })?;
                Duration::from_secs(seconds)
            }
        };
        let pattern = Pattern::parse(raw_pattern)?;
        // The host framework's deadline pre-empts the per-expect timeout.
        let timeout = ctx.clamp_timeout(timeout);
        let session = active_session(ctx, "expect")?;
        let matched = session.expect(&pattern, timeout)?;
        Ok(CmdOutput::stdout(matched.text))
    }
}

/// `expect:interact [ESCAPE_CHAR]` — hand terminal control to the user.
pub struct InteractCmd;

impl ScriptCmd for InteractCmd {
    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Start interactive mode with the spawned process",
            args: "[escape_character]",
            detail: &[
                "expect:interact passes input and output directly between the invoking \
                 terminal and the current session until the escape character is typed \
                 (default Ctrl-], written '^]'). The session keeps running after \
                 control returns to the script.",
            ],
        }
    }

    fn run(&self, ctx: &mut ExecContext, args: &[String]) -> Result<CmdOutput> {
        let escape = match args.first() {
            None => DEFAULT_ESCAPE,
            Some(text) => parse_escape(text)
                .ok_or_else(|| {
                    usage_error(
                        "expect:interact",
                        self.usage(),
                        format!("'{text}' is not a single character or ^X control sequence"),
                    )
                })?,
        };
        let session = active_session(ctx, "interact")?;
        let _raw = RawModeGuard::enable();
        session.interact(std::io::stdin(), std::io::stdout(), escape)?;
        Ok(CmdOutput::default())
    }
}

/// `expect:close` — terminate the current session.
pub struct CloseCmd;

impl ScriptCmd for CloseCmd {
    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Close the spawned process",
            args: "",
            detail: &[
                "expect:close terminates the current session's process if it is still \
                 running. Closing when no session is active is a no-op, so cleanup \
                 steps can call it unconditionally.",
            ],
        }
    }

    fn run(&self, ctx: &mut ExecContext, _args: &[String]) -> Result<CmdOutput> {
        if let Some(handle) = ctx.sessions().active_handle() {
            ctx.sessions_mut().close(handle)?;
        }
        Ok(CmdOutput::default())
    }
}

fn active_session<'ctx>(
    ctx: &'ctx mut ExecContext,
    operation: &str,
) -> Result<&'ctx mut Session> {
    let no_session = || Error::NoActiveSession {
        operation: operation.to_string(),
    };
    let handle: SessionHandle = ctx.sessions().active_handle().ok_or_else(no_session)?;
    ctx.sessions_mut().get_mut(handle).ok_or_else(no_session)
}

/// Parse an escape argument: a single character, or `^X` for a control
/// character (`^]` is Ctrl-]).
fn parse_escape(text: &str) -> Option<u8> {
    let mut chars = text.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some('^'), Some(ctrl), None) => {
            let upper = ctrl.to_ascii_uppercase();
            u8::try_from(upper).ok().map(|byte| byte ^ 0x40)
        }
        (Some(single), None, _) => u8::try_from(single).ok(),
        _ => None,
    }
}

fn usage_error(command: &str, usage: CmdUsage, reason: impl Into<String>) -> Error {
    Error::Usage {
        command: command.to_string(),
        usage: usage.args.to_string(),
        reason: reason.into(),
    }
}

/// Puts the controlling terminal into raw mode for the duration of an
/// interact hand-off; restores the saved attributes on drop. A non-tty
/// stdin (tests, CI) is left untouched.
struct RawModeGuard {
    saved: Option<Termios>,
}

impl RawModeGuard {
    fn enable() -> Self {
        let stdin = std::io::stdin();
        let Ok(saved) = termios::tcgetattr(&stdin) else {
            return Self { saved: None };
        };
        let mut raw = saved.clone();
        termios::cfmakeraw(&mut raw);
        if termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw).is_err() {
            return Self { saved: None };
        }
        Self { saved: Some(saved) }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            let _ = termios::tcsetattr(&std::io::stdin(), SetArg::TCSANOW, &saved);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::parse_escape;

    #[test]
    fn escape_notation() {
        assert_eq!(parse_escape("^]"), Some(0x1d));
        assert_eq!(parse_escape("^C"), Some(0x03));
        assert_eq!(parse_escape("q"), Some(b'q'));
        assert_eq!(parse_escape(""), None);
        assert_eq!(parse_escape("^]x"), None);
    }
}
