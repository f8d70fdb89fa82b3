//! Instruction-class predicates and the idiom scanner.
//!
//! A deliberately narrow pattern matcher over fixed-width AArch64 words,
//! not a decoder: three tagged encoding classes are all the locator ever
//! needs to recognize, and keeping the set closed is what keeps this from
//! growing into a disassembler.

use log::info;
use serde::Serialize;

use crate::LocateError;

pub const INSN_BYTES: u64 = 4;

/// `bl` — branch with link, the call-style transfer opening the idiom.
pub const fn is_branch_link(word: u32) -> bool {
    word & 0xFC00_0000 == 0x9400_0000
}

/// `cmp` — compare against an immediate (`subs` with the zero register as
/// destination, 32-bit form).
pub const fn is_compare_immediate(word: u32) -> bool {
    word & 0xFF00_0000 == 0x7100_0000
}

/// `b.cond` — conditional branch consuming the comparison's flags.
pub const fn is_conditional_branch(word: u32) -> bool {
    word & 0xFF00_0000 == 0x5400_0000
}

/// Addresses of one matched call/compare/branch sequence. Discovered by one
/// scan, consumed once to build a fault request, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdiomMatch {
    pub branch_addr: u64,
    pub compare_addr: u64,
    pub cond_branch_addr: u64,
}

/// Word-at-a-time instruction access to the scan target.
pub trait InsnSource {
    fn peek(&mut self, addr: u64) -> Result<u32, LocateError>;
}

/// Scan `[start, end)` for the first position where three consecutive
/// instruction words match branch-link, compare-immediate, and
/// conditional-branch, in that order.
///
/// A position that fails any predicate just advances the scan by one
/// instruction; zero words (padding) fall out the same way. The scan is
/// bounded by `end` and finishes with `NotFound` rather than running past
/// the executable range.
pub fn scan<S: InsnSource + ?Sized>(
    source: &mut S,
    start: u64,
    end: u64,
) -> Result<IdiomMatch, LocateError> {
    let mut addr = start;
    // checked so a cursor near the top of the address space ends the scan
    // instead of wrapping
    while addr
        .checked_add(3 * INSN_BYTES)
        .is_some_and(|window_end| window_end <= end)
    {
        let word = source.peek(addr)?;
        if is_branch_link(word) {
            let second = source.peek(addr + INSN_BYTES)?;
            if is_compare_immediate(second) {
                let third = source.peek(addr + 2 * INSN_BYTES)?;
                if is_conditional_branch(third) {
                    let found = IdiomMatch {
                        branch_addr: addr,
                        compare_addr: addr + INSN_BYTES,
                        cond_branch_addr: addr + 2 * INSN_BYTES,
                    };
                    info!(
                        "scan: bl at {:#x}, cmp at {:#x}, b.cond at {:#x} ({:#010x} {:#010x} {:#010x})",
                        found.branch_addr,
                        found.compare_addr,
                        found.cond_branch_addr,
                        word,
                        second,
                        third
                    );
                    return Ok(found);
                }
            }
        }
        addr += INSN_BYTES;
    }
    Err(LocateError::NotFound)
}

/// In-memory instruction source for synthetic buffers.
pub struct SliceSource<'a> {
    base: u64,
    words: &'a [u32],
}

impl<'a> SliceSource<'a> {
    pub fn new(base: u64, words: &'a [u32]) -> Self {
        SliceSource { base, words }
    }

    pub fn end(&self) -> u64 {
        self.base + self.words.len() as u64 * INSN_BYTES
    }
}

impl InsnSource for SliceSource<'_> {
    fn peek(&mut self, addr: u64) -> Result<u32, LocateError> {
        addr.checked_sub(self.base)
            .map(|off| (off / INSN_BYTES) as usize)
            .and_then(|idx| self.words.get(idx).copied())
            .ok_or(LocateError::Read(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOP: u32 = 0xD503_201F;
    const BL: u32 = 0x9400_0010;
    const CMP: u32 = 0x7100_001F; // cmp w0, #0
    const B_NE: u32 = 0x5400_0041;

    #[test]
    fn predicate_classes() {
        assert!(is_branch_link(BL));
        assert!(is_branch_link(0x97FF_FFF0)); // backward call
        assert!(!is_branch_link(NOP));
        assert!(is_compare_immediate(CMP));
        assert!(!is_compare_immediate(BL));
        assert!(is_conditional_branch(B_NE));
        assert!(!is_conditional_branch(CMP));
        // none of the classes claims the zero word
        assert!(!is_branch_link(0) && !is_compare_immediate(0) && !is_conditional_branch(0));
    }

    #[test]
    fn consecutive_idiom_matches() {
        let words = [NOP, BL, CMP, B_NE, NOP];
        let mut source = SliceSource::new(0x40_0000, &words);
        let end = source.end();
        let found = scan(&mut source, 0x40_0000, end).unwrap();
        assert_eq!(
            found,
            IdiomMatch {
                branch_addr: 0x40_0004,
                compare_addr: 0x40_0008,
                cond_branch_addr: 0x40_000C,
            }
        );
    }

    #[test]
    fn gap_after_call_is_not_found() {
        let words = [NOP, BL, NOP, CMP, B_NE];
        let mut source = SliceSource::new(0x40_0000, &words);
        let end = source.end();
        assert!(matches!(
            scan(&mut source, 0x40_0000, end),
            Err(LocateError::NotFound)
        ));
    }

    #[test]
    fn zero_padding_is_skipped_not_fatal() {
        let words = [0, 0, 0, BL, CMP, B_NE];
        let mut source = SliceSource::new(0, &words);
        let end = source.end();
        let found = scan(&mut source, 0, end).unwrap();
        assert_eq!(found.branch_addr, 12);
    }

    #[test]
    fn scan_respects_range_end() {
        // idiom present, but the range ends before the third word
        let words = [BL, CMP, B_NE];
        let mut source = SliceSource::new(0, &words);
        assert!(matches!(
            scan(&mut source, 0, 2 * INSN_BYTES),
            Err(LocateError::NotFound)
        ));
    }

    #[test]
    fn scan_at_address_space_top_is_not_found() {
        // the three-word window cannot fit below u64::MAX, and computing
        // that must not wrap
        let mut source = SliceSource::new(u64::MAX - 8, &[]);
        assert!(matches!(
            scan(&mut source, u64::MAX - 8, u64::MAX),
            Err(LocateError::NotFound)
        ));
    }

    #[test]
    fn read_failure_is_reported() {
        let words = [BL, CMP, B_NE];
        let mut source = SliceSource::new(0x1000, &words);
        assert!(matches!(
            scan(&mut source, 0x0, 0x1000 + 3 * INSN_BYTES),
            Err(LocateError::Read(0x0))
        ));
    }
}
