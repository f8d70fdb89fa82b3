//! `/proc/<pid>/maps` consumer.
//!
//! The listing is textual: `start-end permissions offset device inode path`.
//! Lines that do not parse into exactly that shape (anonymous mappings with
//! no path, vsyscall oddities, future format extensions) are skipped, not
//! treated as errors.

use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRegion {
    pub start: u64,
    pub end: u64,
    pub read: bool,
    pub write: bool,
    pub exec: bool,
    pub offset: u64,
    pub device: String,
    pub inode: u64,
    pub path: PathBuf,
}

impl MapRegion {
    pub fn executable(&self) -> bool {
        self.read && self.exec
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Parse one maps line, `None` when it does not have the expected shape.
pub fn parse_maps_line(line: &str) -> Option<MapRegion> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    // six whitespace fields; the first splits into start and end
    if fields.len() != 6 {
        return None;
    }
    let (start, end) = fields[0].split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    if end < start {
        return None;
    }
    let perms = fields[1].as_bytes();
    if perms.len() != 4 {
        return None;
    }
    Some(MapRegion {
        start,
        end,
        read: perms[0] == b'r',
        write: perms[1] == b'w',
        exec: perms[2] == b'x',
        offset: u64::from_str_radix(fields[2], 16).ok()?,
        device: fields[3].to_string(),
        inode: fields[4].parse().ok()?,
        path: PathBuf::from(fields[5]),
    })
}

/// All parseable regions of the process, in listing order.
pub fn read_process_maps(pid: u32) -> io::Result<Vec<MapRegion>> {
    let text = fs::read_to_string(format!("/proc/{pid}/maps"))?;
    Ok(text.lines().filter_map(parse_maps_line).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_backed_line() {
        let line = "aaaac2a30000-aaaac2a31000 r-xp 00000000 fe:02 1596519 /usr/bin/mysudo";
        let region = parse_maps_line(line).unwrap();
        assert_eq!(region.start, 0xaaaac2a30000);
        assert_eq!(region.end, 0xaaaac2a31000);
        assert!(region.read && region.exec && !region.write);
        assert_eq!(region.inode, 1596519);
        assert!(region.executable());
        assert_eq!(region.len(), 0x1000);
    }

    #[test]
    fn skips_lines_without_seven_fields() {
        // anonymous mapping, no path
        assert!(parse_maps_line("ffffa000-ffffb000 rw-p 00000000 00:00 0").is_none());
        assert!(parse_maps_line("").is_none());
        assert!(parse_maps_line("not a maps line at all with six fields").is_none());
    }

    #[test]
    fn skips_malformed_numbers() {
        assert!(
            parse_maps_line("zzzz-aaaa r-xp 00000000 fe:02 123 /bin/x").is_none(),
            "bad hex start"
        );
        assert!(
            parse_maps_line("1000-2000 r-xp 00000000 fe:02 abc /bin/x").is_none(),
            "bad inode"
        );
        assert!(
            parse_maps_line("2000-1000 r-xp 00000000 fe:02 123 /bin/x").is_none(),
            "end before start"
        );
    }

    #[test]
    fn own_maps_contain_an_executable_region() {
        let regions = read_process_maps(std::process::id()).unwrap();
        assert!(regions.iter().any(|r| r.executable()));
    }
}
