//! Toy privilege-elevation utility: prompt for a password, run a command if
//! it matches. The password check compiles to the call/compare/branch
//! sequence the locator scans for, which is the whole point of this victim.

use std::io::{self, BufRead, Write};
use std::process::Command;

use anyhow::{Context, bail};
use clap::Parser;

#[derive(Debug, Parser)]
struct CliArgs {
    /// Command to run once the password is accepted.
    command: String,
    /// Override the expected password.
    #[arg(long, default_value = "letmein")]
    password: String,
}

// Kept out of line so the callsite is a real `bl` followed by the compare
// of the returned flag.
#[inline(never)]
fn check_password(expected: &str, entered: &str) -> bool {
    std::hint::black_box(expected == entered)
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    println!("mysudo pid: {}", std::process::id());

    let user = std::env::var("USER").unwrap_or_else(|_| "root".to_string());
    print!("Enter password for {user}: ");
    io::stdout().flush()?;

    let mut entered = String::new();
    io::stdin()
        .lock()
        .read_line(&mut entered)
        .context("reading password")?;

    if !check_password(&args.password, entered.trim_end_matches('\n')) {
        bail!("Authentication failed");
    }

    println!("Password accepted. Executing command: {}", args.command);
    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(&args.command)
        .status()
        .context("spawning command")?;
    std::process::exit(status.code().unwrap_or(1));
}
