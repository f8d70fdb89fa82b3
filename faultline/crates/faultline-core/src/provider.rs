use serde::Serialize;

use crate::error::EngineError;
use crate::util::PAGE_SHIFT;

pub type Result<T> = std::result::Result<T, EngineError>;

// Leaf-entry state bits, one per predicate the platform exposes.
pub const PTE_PRESENT: u64 = 1 << 0;
pub const PTE_WRITE: u64 = 1 << 1;
pub const PTE_USER_EXEC: u64 = 1 << 2;
pub const PTE_DIRTY: u64 = 1 << 3;
pub const PTE_YOUNG: u64 = 1 << 4;

/// Opaque index into the provider-owned frame arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FrameNumber(pub u64);

impl FrameNumber {
    /// Base physical address of the frame.
    pub const fn phys_base(self) -> u64 {
        self.0 << PAGE_SHIFT
    }

    /// Displace the frame number by a signed delta. `None` when the
    /// displacement underflows; an overshoot past the end of the arena is
    /// caught by the provider's frame accessors instead.
    pub fn displace(self, delta: i64) -> Option<FrameNumber> {
        self.0.checked_add_signed(delta).map(FrameNumber)
    }
}

impl std::fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One leaf (page) entry: the frame it points at plus its state bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeafEntry {
    pub frame: FrameNumber,
    pub flags: u64,
}

impl LeafEntry {
    pub const fn present(&self) -> bool {
        self.flags & PTE_PRESENT != 0
    }

    pub const fn writable(&self) -> bool {
        self.flags & PTE_WRITE != 0
    }

    pub const fn user_exec(&self) -> bool {
        self.flags & PTE_USER_EXEC != 0
    }

    pub const fn dirty(&self) -> bool {
        self.flags & PTE_DIRTY != 0
    }

    pub const fn young(&self) -> bool {
        self.flags & PTE_YOUNG != 0
    }

    /// State bits with the present bit masked off.
    pub const fn permission_bits(&self) -> u64 {
        self.flags & !PTE_PRESENT
    }
}

/// Capability the engine needs from the platform that owns the page tables.
///
/// Implementations hold no engine state; every engine operation resolves the
/// address space fresh via the `pid` parameter, because the underlying
/// mapping can change between calls. Access to a live page table is
/// serialized by the platform's own locking, not here.
pub trait AddressSpaceProvider {
    /// Walk the page-table hierarchy for `vaddr` down to the leaf entry.
    ///
    /// Fails with `NoSuchProcess` when the pid cannot be resolved and with
    /// `NotMapped` when any level on the way to the leaf is absent. A leaf
    /// entry whose present bit is clear is still returned; callers decide
    /// what a non-present entry means for them.
    fn walk(&self, pid: u32, vaddr: u64) -> Result<LeafEntry>;

    /// Read `buf.len()` bytes starting at `offset` within the frame.
    fn read_frame(&self, frame: FrameNumber, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at `offset` within the frame.
    fn write_frame(&mut self, frame: FrameNumber, offset: usize, data: &[u8]) -> Result<()>;

    /// Atomically replace the leaf entry backing `vaddr`. The slot must
    /// already exist; this installs a new value, it does not grow tables.
    fn install_leaf_entry(&mut self, pid: u32, vaddr: u64, entry: LeafEntry) -> Result<()>;

    /// Re-synchronize translation state for the page containing `vaddr`:
    /// data-cache flush, TLB invalidation, and the platform's MMU-cache
    /// update hook, as one unit. Callers never invoke the three steps
    /// separately, so none of them can be forgotten.
    fn flush(&mut self, pid: u32, vaddr: u64);
}
