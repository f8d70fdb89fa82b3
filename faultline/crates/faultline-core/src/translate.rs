use log::trace;
use serde::Serialize;

use crate::provider::{AddressSpaceProvider, FrameNumber, Result};
use crate::util::{PAGE_MASK, page_base};

/// The outcome of one page-table walk. Produced fresh by every call and
/// invalid the moment the owning process's mapping changes; callers must not
/// cache it past a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Translation {
    pub virtual_page_base: u64,
    pub frame_number: FrameNumber,
    pub physical_address: u64,
    pub permission_bits: u64,
    pub present: bool,
}

/// Resolve `vaddr` in process `pid` down to its backing frame. Pure query,
/// no side effect.
pub fn translate(
    provider: &dyn AddressSpaceProvider,
    pid: u32,
    vaddr: u64,
) -> Result<Translation> {
    let entry = provider.walk(pid, vaddr)?;
    let translation = Translation {
        virtual_page_base: page_base(vaddr),
        frame_number: entry.frame,
        physical_address: entry.frame.phys_base() | (vaddr & PAGE_MASK as u64),
        permission_bits: entry.permission_bits(),
        present: entry.present(),
    };
    trace!(
        "translate: pid {} vaddr {:#x} -> frame {} phys {:#x} present {}",
        pid, vaddr, translation.frame_number, translation.physical_address, translation.present
    );
    Ok(translation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::provider::{PTE_PRESENT, PTE_WRITE};
    use crate::sim::SimProvider;
    use crate::util::PAGE_SIZE;

    const PID: u32 = 7;
    const BASE: u64 = 0x5000_0000;

    #[test]
    fn stable_without_intervening_mutation() {
        let mut sim = SimProvider::new();
        sim.add_process(PID);
        sim.map_region(PID, BASE, 4, PTE_WRITE).unwrap();
        for i in 0..4u64 {
            let vaddr = BASE + i * PAGE_SIZE as u64 + 0x123;
            let first = translate(&sim, PID, vaddr).unwrap();
            let second = translate(&sim, PID, vaddr).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn physical_address_carries_page_offset() {
        let mut sim = SimProvider::new();
        sim.add_process(PID);
        let frame = sim.map_page(PID, BASE, PTE_WRITE).unwrap();
        let t = translate(&sim, PID, BASE + 0x7F0).unwrap();
        assert_eq!(t.physical_address, frame.phys_base() | 0x7F0);
        assert_eq!(t.virtual_page_base, BASE);
        assert!(t.present);
        // the present bit never leaks into the permission bits
        assert_eq!(t.permission_bits & PTE_PRESENT, 0);
        assert_eq!(t.permission_bits & PTE_WRITE, PTE_WRITE);
    }

    #[test]
    fn non_present_entry_still_translates() {
        let mut sim = SimProvider::new();
        sim.add_process(PID);
        sim.map_page(PID, BASE, 0).unwrap();
        sim.set_present(PID, BASE, false).unwrap();
        let t = translate(&sim, PID, BASE).unwrap();
        assert!(!t.present);
    }

    #[test]
    fn errors() {
        let mut sim = SimProvider::new();
        assert_eq!(translate(&sim, PID, BASE), Err(EngineError::NoSuchProcess));
        sim.add_process(PID);
        assert_eq!(translate(&sim, PID, BASE), Err(EngineError::NotMapped));
    }
}
