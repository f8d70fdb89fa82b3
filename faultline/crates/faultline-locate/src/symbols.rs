//! Named-symbol lookup in an on-disk ELF binary.
//!
//! Reads just enough of the file to walk the section headers to a symbol
//! table and its string table: 64-bit little-endian ELF only, which is all
//! the scanned targets are. Anything unexpected resolves to `None` so the
//! caller can fall back to scanning from the region start instead of
//! failing the locate.

use std::fs;
use std::io;
use std::path::Path;

const SHT_SYMTAB: u32 = 2;
const SHT_DYNSYM: u32 = 11;
const EHDR_LEN: usize = 64;
const SYM_LEN: usize = 24;

/// Value of `name` in the binary's symbol table, `None` when the file is
/// not a usable ELF or the symbol is absent. Only I/O failures are errors.
pub fn resolve_symbol(path: &Path, name: &str) -> io::Result<Option<u64>> {
    let bytes = fs::read(path)?;
    Ok(symbol_value(&bytes, name))
}

fn symbol_value(bytes: &[u8], name: &str) -> Option<u64> {
    if bytes.len() < EHDR_LEN || &bytes[..4] != b"\x7fELF" {
        return None;
    }
    // ELFCLASS64, little endian
    if bytes[4] != 2 || bytes[5] != 1 {
        return None;
    }
    let shoff = u64_at(bytes, 0x28)? as usize;
    let shentsize = u16_at(bytes, 0x3A)? as usize;
    let shnum = u16_at(bytes, 0x3C)? as usize;

    for i in 0..shnum {
        let shdr = shoff + i * shentsize;
        let sh_type = u32_at(bytes, shdr + 0x04)?;
        if sh_type != SHT_SYMTAB && sh_type != SHT_DYNSYM {
            continue;
        }
        let sym_off = u64_at(bytes, shdr + 0x18)? as usize;
        let sym_len = u64_at(bytes, shdr + 0x20)? as usize;
        let link = u32_at(bytes, shdr + 0x28)? as usize;
        let entsize = u64_at(bytes, shdr + 0x38)? as usize;
        if entsize < SYM_LEN {
            continue;
        }

        let str_shdr = shoff + link * shentsize;
        let str_off = u64_at(bytes, str_shdr + 0x18)? as usize;
        let str_len = u64_at(bytes, str_shdr + 0x20)? as usize;
        let strtab = bytes.get(str_off..str_off.checked_add(str_len)?)?;

        let end = sym_off.checked_add(sym_len)?;
        let mut off = sym_off;
        while off + entsize <= end {
            let name_off = u32_at(bytes, off)? as usize;
            if symbol_name(strtab, name_off) == Some(name) {
                return u64_at(bytes, off + 0x08);
            }
            off += entsize;
        }
    }
    None
}

fn symbol_name(strtab: &[u8], offset: usize) -> Option<&str> {
    let tail = strtab.get(offset..)?;
    let len = tail.iter().position(|b| *b == 0)?;
    std::str::from_utf8(&tail[..len]).ok()
}

fn u16_at(bytes: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(
        bytes.get(offset..offset + 2)?.try_into().ok()?,
    ))
}

fn u32_at(bytes: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(
        bytes.get(offset..offset + 4)?.try_into().ok()?,
    ))
}

fn u64_at(bytes: &[u8], offset: usize) -> Option<u64> {
    Some(u64::from_le_bytes(
        bytes.get(offset..offset + 8)?.try_into().ok()?,
    ))
}
