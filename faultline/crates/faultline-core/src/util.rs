pub const PAGE_SHIFT: usize = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Entries per page-table level (4 KiB granule, 9 bits per level).
pub const PTRS_PER_TABLE: u64 = 512;

/// Width of the operand the injector reads and writes.
pub const WORD_BYTES: usize = 8;
pub const WORD_BITS: u32 = 64;

pub const fn page_base(vaddr: u64) -> u64 {
    vaddr & !(PAGE_MASK as u64)
}

/// Index of `vaddr` within its leaf table.
pub const fn pte_index(vaddr: u64) -> u64 {
    (vaddr >> PAGE_SHIFT) & (PTRS_PER_TABLE - 1)
}

/// Index of `vaddr` within the intermediate directory level.
pub const fn pmd_index(vaddr: u64) -> u64 {
    (vaddr >> 21) & (PTRS_PER_TABLE - 1)
}

/// Key of the leaf table covering `vaddr`, unique across the whole
/// address space (unlike [`pmd_index`], which wraps per directory).
pub const fn table_key(vaddr: u64) -> u64 {
    vaddr >> 21
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices() {
        assert_eq!(pte_index(0), 0);
        assert_eq!(pte_index(0x1000), 1);
        assert_eq!(pte_index(0x1FF000), 511);
        assert_eq!(pte_index(0x200000), 0);
        assert_eq!(pmd_index(0x200000), 1);
        assert_eq!(page_base(0x200FFF), 0x200000);
    }

    #[test]
    fn table_keys_distinct_across_directories() {
        // same pmd index, different directory => different key
        let a = 0x0000_0020_0000u64;
        let b = a + (PTRS_PER_TABLE << 21);
        assert_eq!(pmd_index(a), pmd_index(b));
        assert_ne!(table_key(a), table_key(b));
    }
}
