//! # faultline-locate
//!
//! Read-only scanner that points the fault injector at something worth
//! attacking: given a traced process, walk its memory map to the first
//! executable region and scan fixed-width instruction words for the
//! three-instruction idiom of a boolean privilege check — a call-like
//! branch, a compare against an immediate, and the conditional branch that
//! consumes the comparison.
//!
//! The caller owns attach/stop/detach; everything here assumes the target
//! is already stopped under trace. Instruction reads go word-at-a-time
//! through the tracing interface, never a shared mapping, because the
//! locator does not share an address space with its target.

mod insn;
mod maps;
mod symbols;
mod trace;

use std::path::Path;

use log::{debug, warn};
use nix::unistd::Pid;
use thiserror::Error;

pub use insn::{
    IdiomMatch, InsnSource, SliceSource, is_branch_link, is_compare_immediate,
    is_conditional_branch, scan,
};
pub use maps::{MapRegion, parse_maps_line, read_process_maps};
pub use symbols::resolve_symbol;
pub use trace::PtraceSource;

#[derive(Debug, Error)]
pub enum LocateError {
    /// The scan exhausted the executable range without a three-instruction
    /// match.
    #[error("no call/compare/branch sequence in the scan range")]
    NotFound,
    #[error("process has no executable mapped region")]
    NoExecutableRegion,
    /// An instruction word could not be read from the target. Reported to
    /// the caller, never retried.
    #[error("failed to read instruction word at {0:#x}")]
    Read(u64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Narrow the scan start to a named symbol of the on-disk binary backing
/// the executable region.
#[derive(Debug, Clone, Copy)]
pub struct EntryHint<'a> {
    pub binary: &'a Path,
    pub symbol: &'a str,
}

/// Find a privilege-check callsite in a traced, stopped process.
///
/// The scan covers the first executable region of the process's memory map.
/// With an [`EntryHint`], the named symbol's value is resolved from the
/// binary's symbol table and added to the region base as the scan start; if
/// the symbol cannot be resolved the scan falls back to the region start.
pub fn locate_check(pid: Pid, hint: Option<EntryHint<'_>>) -> Result<IdiomMatch, LocateError> {
    let regions = read_process_maps(pid.as_raw() as u32)?;
    let region = regions
        .iter()
        .find(|r| r.executable())
        .ok_or(LocateError::NoExecutableRegion)?;
    debug!(
        "locate: scanning {:#x}-{:#x} {}",
        region.start,
        region.end,
        region.path.display()
    );

    let mut start = region.start;
    if let Some(hint) = hint {
        match resolve_symbol(hint.binary, hint.symbol) {
            Ok(Some(value)) => match hinted_start(region, value) {
                Some(hinted) => {
                    start = hinted;
                    debug!(
                        "locate: symbol {} at {:#x}, scan starts at {:#x}",
                        hint.symbol, value, start
                    );
                }
                None => {
                    warn!(
                        "locate: symbol {} value {:#x} falls outside the region, scanning from region start",
                        hint.symbol, value
                    );
                }
            },
            Ok(None) => {
                debug!(
                    "locate: symbol {} not in {}, scanning from region start",
                    hint.symbol,
                    hint.binary.display()
                );
            }
            Err(e) => {
                warn!(
                    "locate: cannot read {}: {}, scanning from region start",
                    hint.binary.display(),
                    e
                );
            }
        }
    }

    let mut source = PtraceSource::new(pid);
    scan(&mut source, start, region.end)
}

/// Scan start for a resolved symbol value: the region base plus the value,
/// but only when the sum stays inside the region. Symbol values come from a
/// caller-supplied file, so the addition is checked rather than trusted.
fn hinted_start(region: &MapRegion, value: u64) -> Option<u64> {
    region
        .start
        .checked_add(value)
        .filter(|start| *start < region.end)
}
