use log::{debug, info};
use serde::Serialize;

use crate::provider::{AddressSpaceProvider, LeafEntry, Result};
use crate::util::pte_index;

/// Make the source page's leaf entry alias the frame currently backing the
/// alias page. Both addresses live in the same address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RedirectionRequest {
    pub pid: u32,
    pub source_vaddr: u64,
    pub alias_vaddr: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Redirection {
    /// The new entry was installed and the source page's translation state
    /// re-synchronized. Carries the alias page's leaf-table index, a
    /// diagnostic return value only.
    Applied { alias_index: u64 },
    /// Precondition not met (source not present, alias not present, or the
    /// two pages already share a frame). Nothing was installed and no
    /// coherence flush was emitted.
    Skipped,
}

/// Re-point the source leaf entry at the alias page's frame, carrying the
/// source's original protection bits over unchanged. After a successful
/// redirection the two virtual pages are synonyms for one physical frame.
///
/// The install and the coherence flush belong together: a new leaf entry
/// without the flush leaves a stale cached translation live, which is
/// exactly the bug class this function exists to avoid.
pub fn redirect(
    provider: &mut dyn AddressSpaceProvider,
    req: &RedirectionRequest,
) -> Result<Redirection> {
    let source = provider.walk(req.pid, req.source_vaddr)?;
    if !source.present() {
        debug!(
            "redirect: pid {} source {:#x} not present, skipping",
            req.pid, req.source_vaddr
        );
        return Ok(Redirection::Skipped);
    }
    let alias = provider.walk(req.pid, req.alias_vaddr)?;
    if !alias.present() || alias.frame == source.frame {
        debug!(
            "redirect: pid {} alias {:#x} unusable (present {} frame {}), skipping",
            req.pid,
            req.alias_vaddr,
            alias.present(),
            alias.frame
        );
        return Ok(Redirection::Skipped);
    }

    info!(
        "redirect: old entry frame {} present {} writable {} user exec {} dirty {} young {}",
        source.frame,
        source.present(),
        source.writable(),
        source.user_exec(),
        source.dirty(),
        source.young()
    );

    let entry = LeafEntry {
        frame: alias.frame,
        flags: source.flags,
    };
    provider.install_leaf_entry(req.pid, req.source_vaddr, entry)?;
    provider.flush(req.pid, req.source_vaddr);

    info!(
        "redirect: pid {} source {:#x} now backed by frame {} (was {})",
        req.pid, req.source_vaddr, alias.frame, source.frame
    );
    Ok(Redirection::Applied {
        alias_index: pte_index(req.alias_vaddr),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::provider::{PTE_DIRTY, PTE_WRITE};
    use crate::sim::SimProvider;
    use crate::translate::translate;

    const PID: u32 = 11;
    const SOURCE: u64 = 0x7000_0000;
    const ALIAS: u64 = SOURCE + 0x20_0000; // one leaf table over

    fn fixture() -> SimProvider {
        let mut sim = SimProvider::new();
        sim.add_process(PID);
        sim.map_page(PID, SOURCE, PTE_WRITE | PTE_DIRTY).unwrap();
        sim.map_page(PID, ALIAS, PTE_WRITE).unwrap();
        sim.write_virt(PID, SOURCE, &[0xAA; 16]).unwrap();
        sim.write_virt(PID, ALIAS, &[0x55; 16]).unwrap();
        sim
    }

    #[test]
    fn source_aliases_alias_frame_and_keeps_permissions() {
        let mut sim = fixture();
        let before = translate(&sim, PID, SOURCE).unwrap();
        let req = RedirectionRequest {
            pid: PID,
            source_vaddr: SOURCE,
            alias_vaddr: ALIAS,
        };
        let outcome = redirect(&mut sim, &req).unwrap();
        assert_eq!(
            outcome,
            Redirection::Applied {
                alias_index: pte_index(ALIAS)
            }
        );

        let mut via_source = [0u8; 16];
        let mut via_alias = [0u8; 16];
        sim.read_virt(PID, SOURCE, &mut via_source).unwrap();
        sim.read_virt(PID, ALIAS, &mut via_alias).unwrap();
        assert_eq!(via_source, via_alias);
        assert_eq!(via_source, [0x55; 16]);

        let after = translate(&sim, PID, SOURCE).unwrap();
        assert_ne!(after.frame_number, before.frame_number);
        assert_eq!(after.permission_bits, before.permission_bits);
        assert!(after.present);

        // writes through the source land in the shared frame
        sim.write_virt(PID, SOURCE, &[0x11; 4]).unwrap();
        sim.read_virt(PID, ALIAS, &mut via_alias).unwrap();
        assert_eq!(&via_alias[..4], &[0x11; 4]);
    }

    #[test]
    fn applied_emits_exactly_one_flush_of_the_source_page() {
        let mut sim = fixture();
        let req = RedirectionRequest {
            pid: PID,
            source_vaddr: SOURCE + 0x10, // not page aligned on purpose
            alias_vaddr: ALIAS,
        };
        redirect(&mut sim, &req).unwrap();
        assert_eq!(sim.flush_log().len(), 1);
        assert_eq!(sim.flush_log()[0].pid, PID);
        assert_eq!(sim.flush_log()[0].virtual_page_base, SOURCE);
    }

    #[test]
    fn non_present_source_is_a_no_op_without_flush() {
        let mut sim = fixture();
        sim.set_present(PID, SOURCE, false).unwrap();
        let req = RedirectionRequest {
            pid: PID,
            source_vaddr: SOURCE,
            alias_vaddr: ALIAS,
        };
        assert_eq!(redirect(&mut sim, &req), Ok(Redirection::Skipped));
        assert!(sim.flush_log().is_empty());
        // entry untouched
        assert!(!translate(&sim, PID, SOURCE).unwrap().present);
    }

    #[test]
    fn alias_must_be_present_and_distinct() {
        let mut sim = fixture();
        sim.set_present(PID, ALIAS, false).unwrap();
        let req = RedirectionRequest {
            pid: PID,
            source_vaddr: SOURCE,
            alias_vaddr: ALIAS,
        };
        assert_eq!(redirect(&mut sim, &req), Ok(Redirection::Skipped));
        sim.set_present(PID, ALIAS, true).unwrap();

        // aliasing a page onto its own frame is a no-op
        let self_req = RedirectionRequest {
            pid: PID,
            source_vaddr: SOURCE,
            alias_vaddr: SOURCE,
        };
        assert_eq!(redirect(&mut sim, &self_req), Ok(Redirection::Skipped));
        assert!(sim.flush_log().is_empty());
    }

    #[test]
    fn absent_alias_entry_is_not_mapped() {
        let mut sim = fixture();
        let req = RedirectionRequest {
            pid: PID,
            source_vaddr: SOURCE,
            alias_vaddr: ALIAS + 0x20_0000,
        };
        assert_eq!(redirect(&mut sim, &req), Err(EngineError::NotMapped));
        assert!(sim.flush_log().is_empty());
    }
}
