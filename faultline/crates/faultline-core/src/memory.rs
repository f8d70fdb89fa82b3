//! Physical-address resolution for the calling process.
//!
//! The engine proper never touches `/proc`; this module exists so the demo
//! drivers can report where their buffers actually live, the way the
//! original attack tooling logged frame numbers next to virtual addresses.
//! Needs `CAP_SYS_ADMIN` (or root) for non-zero PFNs on hardened kernels.

use pagemap::{MemoryRegion, PageMap};
use serde::Serialize;
use thiserror::Error;

use crate::util::{PAGE_MASK, PAGE_SHIFT, PAGE_SIZE};

#[derive(Debug, Error)]
pub enum LinuxPageMapError {
    #[error(transparent)]
    Pagemap(#[from] pagemap::PageMapError),
    #[error("virtual address {0:#x} has no physical backing (missing privileges or not resident)")]
    NotBacked(u64),
    #[error("expected one pagemap entry for a single page, got {0}")]
    UnexpectedEntryCount(usize),
}

/// A physical address, as opposed to the virtual ones everything else here
/// deals in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PhysAddr(pub u64);

impl PhysAddr {
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn frame_number(self) -> u64 {
        self.0 >> PAGE_SHIFT
    }
}

impl std::fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

pub trait VirtToPhysResolver {
    fn get_phys(&mut self, virt: u64) -> Result<PhysAddr, LinuxPageMapError>;
}

/// Resolver backed by `/proc/self/pagemap`.
pub struct LinuxPageMap {
    pagemap_wrapper: PageMap,
}

impl LinuxPageMap {
    pub fn new() -> Result<Self, LinuxPageMapError> {
        Ok(LinuxPageMap {
            pagemap_wrapper: PageMap::new(std::process::id() as u64)?,
        })
    }
}

impl VirtToPhysResolver for LinuxPageMap {
    fn get_phys(&mut self, virt: u64) -> Result<PhysAddr, LinuxPageMapError> {
        let base = virt & !(PAGE_MASK as u64);
        let region = MemoryRegion::from((base, base + PAGE_SIZE as u64));
        let entries = self.pagemap_wrapper.pagemap_region(&region)?;
        if entries.len() != 1 {
            return Err(LinuxPageMapError::UnexpectedEntryCount(entries.len()));
        }
        let pfn = entries[0].pfn()?;
        if pfn == 0 {
            return Err(LinuxPageMapError::NotBacked(virt));
        }
        Ok(PhysAddr((pfn << PAGE_SHIFT) | (virt & PAGE_MASK as u64)))
    }
}

/// Physical-frame lookup for raw pointers in the calling process.
pub trait PfnResolver {
    fn pfn(&self) -> Result<PhysAddr, LinuxPageMapError>;
}

impl<T> PfnResolver for *const T {
    fn pfn(&self) -> Result<PhysAddr, LinuxPageMapError> {
        LinuxPageMap::new()?.get_phys(*self as u64)
    }
}

impl<T> PfnResolver for *mut T {
    fn pfn(&self) -> Result<PhysAddr, LinuxPageMapError> {
        LinuxPageMap::new()?.get_phys(*self as u64)
    }
}
