//! Fixture: line-oriented adder REPL.
//!
//! Prints `ready`, then sums every integer found in each input line and
//! prints the result, so `print(40 + 2)` answers `42`. Exits on `quit`
//! or end of input.

// Test fixtures require special allowances - they are not production code
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

use std::io::{self, BufRead, Write};

fn main() -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("ready");
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim() == "quit" {
            break;
        }
        let sum: i64 = line
            .split(|c: char| !c.is_ascii_digit() && c != '-')
            .filter(|token| !token.is_empty())
            .filter_map(|token| token.parse::<i64>().ok())
            .sum();
        println!("{sum}");
        stdout.flush()?;
    }

    Ok(())
}
