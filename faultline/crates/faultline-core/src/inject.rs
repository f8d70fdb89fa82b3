use log::debug;
use serde::Serialize;

use crate::error::EngineError;
use crate::provider::{AddressSpaceProvider, Result};
use crate::translate::translate;
use crate::util::{PAGE_MASK, WORD_BITS, WORD_BYTES};

/// Bit flipped when a device-boundary request leaves the bit unspecified.
/// The position is a parameter of the fault model, not something the engine
/// derives; callers who care pass an explicit bit instead.
pub const DEFAULT_TARGET_BIT: u32 = 16;

/// One fault to apply. `frame_offset` displaces which physical frame is
/// mutated relative to the frame `vaddr` currently translates to: zero means
/// the address's own frame, nonzero a deliberately wrong neighbor, modeling
/// fault locality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaultRequest {
    pub vaddr: u64,
    pub pid: u32,
    pub target_bit: u32,
    pub frame_offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InjectMode {
    /// Translate, displace the frame by `frame_offset`, XOR the bit in the
    /// word at the base of that frame's raw content.
    Content,
    /// XOR the bit in the word the address currently reads through the
    /// normal user-memory path. `frame_offset` is ignored; the caller wants
    /// to fault a value, not a location.
    DirectValue,
}

/// Flip one bit. XOR makes the operation self-inverse: the same request
/// twice restores the original content, so callers relying on a sticky
/// fault must not call twice. A failed walk or read is reported once and
/// never retried, because after a failed walk the mapping may have changed.
pub fn inject(
    provider: &mut dyn AddressSpaceProvider,
    req: &FaultRequest,
    mode: InjectMode,
) -> Result<()> {
    if req.target_bit >= WORD_BITS {
        return Err(EngineError::OutOfRange);
    }
    let translation = translate(provider, req.pid, req.vaddr)?;
    let (frame, offset) = match mode {
        InjectMode::Content => {
            let frame = translation
                .frame_number
                .displace(req.frame_offset)
                .ok_or(EngineError::NotMapped)?;
            (frame, 0)
        }
        // word-aligned so the operand cannot straddle the page
        InjectMode::DirectValue => (
            translation.frame_number,
            (req.vaddr as usize & PAGE_MASK) & !(WORD_BYTES - 1),
        ),
    };
    let mut word = [0u8; WORD_BYTES];
    provider.read_frame(frame, offset, &mut word)?;
    let old = u64::from_le_bytes(word);
    let new = old ^ (1u64 << req.target_bit);
    provider.write_frame(frame, offset, &new.to_le_bytes())?;
    debug!(
        "inject: pid {} vaddr {:#x} frame {} offset {:#x} bit {}: {:#x} -> {:#x}",
        req.pid, req.vaddr, frame, offset, req.target_bit, old, new
    );
    Ok(())
}
