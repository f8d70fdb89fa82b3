use log::debug;
use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::LocateError;
use crate::insn::InsnSource;

/// Instruction source peeking a stopped tracee one word at a time. ptrace
/// hands back a full machine word; the instruction is its low half.
pub struct PtraceSource {
    pid: Pid,
}

impl PtraceSource {
    pub fn new(pid: Pid) -> Self {
        PtraceSource { pid }
    }
}

impl InsnSource for PtraceSource {
    fn peek(&mut self, addr: u64) -> Result<u32, LocateError> {
        let word = ptrace::read(self.pid, addr as usize as ptrace::AddressType).map_err(|e| {
            debug!("ptrace peek at {:#x} failed: {}", addr, e);
            LocateError::Read(addr)
        })?;
        Ok(word as u64 as u32)
    }
}
