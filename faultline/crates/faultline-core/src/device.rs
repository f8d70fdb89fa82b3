//! Device control boundary.
//!
//! The synchronous request/response surface the privileged engine exposes to
//! unprivileged callers: one fixed-size little-endian record in, one integer
//! status out. No queuing and no concurrency at this layer; the attack model
//! is single-shot.

use log::{info, warn};
use serde::Serialize;

use crate::inject::{DEFAULT_TARGET_BIT, FaultRequest, InjectMode, inject};
use crate::provider::AddressSpaceProvider;

/// Length of the wire record: u64 vaddr, u32 pid, i32 target bit, i32 frame
/// offset, little endian, no padding.
pub const WIRE_LEN: usize = 20;

pub const STATUS_OK: i32 = 0;

/// The request record as it crosses the boundary. A negative `target_bit`
/// means "use the engine default"; `frame_offset` defaults to 0 on the
/// caller side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaultCommand {
    pub vaddr: u64,
    pub pid: u32,
    pub target_bit: i32,
    pub frame_offset: i32,
}

impl FaultCommand {
    pub fn to_wire(&self) -> [u8; WIRE_LEN] {
        let mut buf = [0u8; WIRE_LEN];
        buf[0..8].copy_from_slice(&self.vaddr.to_le_bytes());
        buf[8..12].copy_from_slice(&self.pid.to_le_bytes());
        buf[12..16].copy_from_slice(&self.target_bit.to_le_bytes());
        buf[16..20].copy_from_slice(&self.frame_offset.to_le_bytes());
        buf
    }

    /// `None` unless `buf` is exactly one well-formed record.
    pub fn from_wire(buf: &[u8]) -> Option<FaultCommand> {
        if buf.len() != WIRE_LEN {
            return None;
        }
        Some(FaultCommand {
            vaddr: u64::from_le_bytes(buf[0..8].try_into().ok()?),
            pid: u32::from_le_bytes(buf[8..12].try_into().ok()?),
            target_bit: i32::from_le_bytes(buf[12..16].try_into().ok()?),
            frame_offset: i32::from_le_bytes(buf[16..20].try_into().ok()?),
        })
    }
}

/// One boundary instance. Instances are independent; a test harness can
/// start and stop several of them, there is no process-wide registration.
pub struct FaultDevice<P> {
    provider: P,
    running: bool,
}

impl<P: AddressSpaceProvider> FaultDevice<P> {
    pub fn start(provider: P) -> Self {
        info!("fault device started");
        FaultDevice {
            provider,
            running: true,
        }
    }

    /// Tear the boundary down. Requests against a stopped device are
    /// rejected with `-ENODEV`; the provider stays accessible for
    /// inspection.
    pub fn stop(&mut self) {
        info!("fault device stopped");
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// One atomic request write, one integer status reply.
    pub fn request(&mut self, buf: &[u8]) -> i32 {
        let Some(cmd) = FaultCommand::from_wire(buf) else {
            warn!("fault device: malformed request of {} bytes", buf.len());
            return -libc::EINVAL;
        };
        self.submit(cmd)
    }

    /// Dispatch an already-decoded command to the content-mode injector.
    pub fn submit(&mut self, cmd: FaultCommand) -> i32 {
        if !self.running {
            return -libc::ENODEV;
        }
        let target_bit = if cmd.target_bit < 0 {
            DEFAULT_TARGET_BIT
        } else {
            cmd.target_bit as u32
        };
        let req = FaultRequest {
            vaddr: cmd.vaddr,
            pid: cmd.pid,
            target_bit,
            frame_offset: cmd.frame_offset as i64,
        };
        match inject(&mut self.provider, &req, InjectMode::Content) {
            Ok(()) => STATUS_OK,
            Err(e) => {
                warn!("fault device: request {:?} failed: {}", cmd, e);
                e.status()
            }
        }
    }
}
