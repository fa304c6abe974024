//! Fixture: exits with the given code without producing output.
//!
//! Usage: `scriptbox-exit-quiet [CODE]` (default 0).

// Test fixtures require special allowances - they are not production code
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]
#![allow(clippy::exit)]

fn main() {
    let code: i32 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(0);
    std::process::exit(code);
}
