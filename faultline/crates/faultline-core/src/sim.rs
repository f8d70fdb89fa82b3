//! Simulated address-space provider.
//!
//! Backs the engine with a two-level in-memory page table per process and a
//! `Vec` frame arena, so every engine property can be exercised without
//! privileged execution. Frames are shared across all simulated processes,
//! which is what lets a displaced content-mode fault land in a neighboring
//! process's frame the way a physical fault would.

use std::collections::{BTreeMap, HashMap};

use log::trace;

use crate::error::EngineError;
use crate::provider::{AddressSpaceProvider, FrameNumber, LeafEntry, PTE_PRESENT, Result};
use crate::util::{PAGE_MASK, PAGE_SIZE, page_base, pte_index, table_key};

/// One recorded coherence flush: the whole dcache/TLB/MMU-cache unit for a
/// single virtual page. Tests assert on this log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRecord {
    pub pid: u32,
    pub virtual_page_base: u64,
}

#[derive(Default)]
struct SimAddressSpace {
    /// Directory level: leaf tables keyed by `table_key`, each holding leaf
    /// entries keyed by `pte_index`. A missing outer key models an absent
    /// directory entry, a missing inner key an absent leaf slot.
    tables: BTreeMap<u64, BTreeMap<u64, LeafEntry>>,
}

pub struct SimProvider {
    spaces: HashMap<u32, SimAddressSpace>,
    frames: Vec<Box<[u8; PAGE_SIZE]>>,
    flushes: Vec<FlushRecord>,
}

impl SimProvider {
    pub fn new() -> Self {
        SimProvider {
            spaces: HashMap::new(),
            frames: Vec::new(),
            flushes: Vec::new(),
        }
    }

    pub fn add_process(&mut self, pid: u32) {
        self.spaces.entry(pid).or_default();
    }

    /// Allocate a zeroed frame and install a present leaf entry for the page
    /// containing `vaddr`. `flags` are OR-ed with the present bit.
    pub fn map_page(&mut self, pid: u32, vaddr: u64, flags: u64) -> Result<FrameNumber> {
        // resolve the address space before touching the arena, so a failed
        // lookup leaves no orphaned frame behind
        let space = self
            .spaces
            .get_mut(&pid)
            .ok_or(EngineError::NoSuchProcess)?;
        let frame = FrameNumber(self.frames.len() as u64);
        self.frames.push(Box::new([0u8; PAGE_SIZE]));
        let table = space.tables.entry(table_key(vaddr)).or_default();
        table.insert(
            pte_index(vaddr),
            LeafEntry {
                frame,
                flags: flags | PTE_PRESENT,
            },
        );
        trace!(
            "sim: pid {} page {:#x} -> frame {}",
            pid,
            page_base(vaddr),
            frame
        );
        Ok(frame)
    }

    /// Map `pages` consecutive pages starting at the page containing `vaddr`.
    pub fn map_region(&mut self, pid: u32, vaddr: u64, pages: usize, flags: u64) -> Result<()> {
        let base = page_base(vaddr);
        for i in 0..pages {
            self.map_page(pid, base + (i * PAGE_SIZE) as u64, flags)?;
        }
        Ok(())
    }

    /// Set or clear the present bit of an existing leaf entry. Used to model
    /// a swapped-out or unlinked page.
    pub fn set_present(&mut self, pid: u32, vaddr: u64, present: bool) -> Result<()> {
        let entry = self.leaf_slot(pid, vaddr)?;
        if present {
            entry.flags |= PTE_PRESENT;
        } else {
            entry.flags &= !PTE_PRESENT;
        }
        Ok(())
    }

    fn leaf_slot(&mut self, pid: u32, vaddr: u64) -> Result<&mut LeafEntry> {
        let space = self
            .spaces
            .get_mut(&pid)
            .ok_or(EngineError::NoSuchProcess)?;
        space
            .tables
            .get_mut(&table_key(vaddr))
            .and_then(|table| table.get_mut(&pte_index(vaddr)))
            .ok_or(EngineError::NotMapped)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Raw bytes of one frame, for diagnostics and tests.
    pub fn frame_bytes(&self, frame: FrameNumber) -> Result<&[u8]> {
        self.frames
            .get(frame.0 as usize)
            .map(|f| &f[..])
            .ok_or(EngineError::NotMapped)
    }

    /// Write through the virtual path, page by page, honoring the current
    /// leaf entries. Fails without partial effect detection; the caller sees
    /// the first missing page.
    pub fn write_virt(&mut self, pid: u32, vaddr: u64, data: &[u8]) -> Result<()> {
        let mut done = 0;
        while done < data.len() {
            let va = vaddr + done as u64;
            let offset = va as usize & PAGE_MASK;
            let chunk = (PAGE_SIZE - offset).min(data.len() - done);
            let entry = self.walk(pid, va)?;
            self.write_frame(entry.frame, offset, &data[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    /// Read through the virtual path, page by page.
    pub fn read_virt(&self, pid: u32, vaddr: u64, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let va = vaddr + done as u64;
            let offset = va as usize & PAGE_MASK;
            let chunk = (PAGE_SIZE - offset).min(buf.len() - done);
            let entry = self.walk(pid, va)?;
            self.read_frame(entry.frame, offset, &mut buf[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    /// Every coherence flush performed so far, oldest first.
    pub fn flush_log(&self) -> &[FlushRecord] {
        &self.flushes
    }
}

impl Default for SimProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpaceProvider for SimProvider {
    fn walk(&self, pid: u32, vaddr: u64) -> Result<LeafEntry> {
        let space = self.spaces.get(&pid).ok_or(EngineError::NoSuchProcess)?;
        let table = space
            .tables
            .get(&table_key(vaddr))
            .ok_or(EngineError::NotMapped)?;
        table
            .get(&pte_index(vaddr))
            .copied()
            .ok_or(EngineError::NotMapped)
    }

    fn read_frame(&self, frame: FrameNumber, offset: usize, buf: &mut [u8]) -> Result<()> {
        let data = self
            .frames
            .get(frame.0 as usize)
            .ok_or(EngineError::NotMapped)?;
        let end = offset
            .checked_add(buf.len())
            .filter(|end| *end <= PAGE_SIZE)
            .ok_or(EngineError::NotMapped)?;
        buf.copy_from_slice(&data[offset..end]);
        Ok(())
    }

    fn write_frame(&mut self, frame: FrameNumber, offset: usize, data: &[u8]) -> Result<()> {
        let frame = self
            .frames
            .get_mut(frame.0 as usize)
            .ok_or(EngineError::NotMapped)?;
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= PAGE_SIZE)
            .ok_or(EngineError::NotMapped)?;
        frame[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn install_leaf_entry(&mut self, pid: u32, vaddr: u64, entry: LeafEntry) -> Result<()> {
        let slot = self.leaf_slot(pid, vaddr)?;
        *slot = entry;
        Ok(())
    }

    fn flush(&mut self, pid: u32, vaddr: u64) {
        self.flushes.push(FlushRecord {
            pid,
            virtual_page_base: page_base(vaddr),
        });
    }
}
