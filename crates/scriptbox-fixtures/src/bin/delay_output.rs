//! Fixture: prints numbered lines with a delay between them.
//!
//! Usage: `scriptbox-delay-output [COUNT] [DELAY_MS]` (defaults 3, 100).

// Test fixtures require special allowances - they are not production code
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

fn main() -> io::Result<()> {
    let mut args = std::env::args().skip(1);
    let count: u32 = args
        .next()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(3);
    let delay_ms: u64 = args
        .next()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(100);

    let mut stdout = io::stdout();
    for index in 1..=count {
        thread::sleep(Duration::from_millis(delay_ms));
        println!("line {index}");
        stdout.flush()?;
    }
    Ok(())
}
