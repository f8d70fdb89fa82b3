//! Allocate a simulated region, ask the device boundary for one
//! content-mode flip, and report which byte actually changed. With the
//! default frame displacement of 1 the fault lands one frame past the one
//! the target address translates to, the locality model the engine exists
//! to study.

use anyhow::bail;
use clap::Parser;
use log::{info, warn};

use faultline::util::PAGE_SIZE;
use faultline::{
    FaultCommand, FaultDevice, FrameNumber, PfnResolver, STATUS_OK, SimProvider,
    provider::PTE_WRITE,
};

const PID: u32 = 4242;
const BASE: u64 = 0x4000_0000;

#[derive(Debug, Parser)]
struct CliArgs {
    /// Bit to flip within the word at the frame base. Negative means the
    /// engine default.
    #[arg(long, default_value_t = 0)]
    bit: i32,
    /// Frame displacement relative to the frame backing the target address.
    #[arg(long, default_value_t = 1)]
    offset: i32,
    /// Pages to map in the simulated victim (1024 = the original's 4 MiB).
    #[arg(long, default_value_t = 1024)]
    pages: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CliArgs::parse();
    info!("CLI args: {:?}", args);

    // where does this driver itself live physically, for comparison with
    // the simulated arena
    let probe = Box::new([0u8; PAGE_SIZE]);
    match probe.as_ptr().pfn() {
        Ok(phys) => info!("driver probe page: vaddr {:p} phys {}", probe.as_ptr(), phys),
        Err(e) => warn!("pagemap unavailable ({e}), continuing without it"),
    }

    let mut provider = SimProvider::new();
    provider.add_process(PID);
    provider.map_region(PID, BASE, args.pages, PTE_WRITE)?;
    info!("mapped {} pages at {:#x}", args.pages, BASE);

    let frames = provider.frame_count();
    let before: Vec<Vec<u8>> = (0..frames as u64)
        .map(|f| provider.frame_bytes(FrameNumber(f)).map(|b| b.to_vec()))
        .collect::<Result<_, _>>()?;

    let mut device = FaultDevice::start(provider);
    let cmd = FaultCommand {
        vaddr: BASE,
        pid: PID,
        target_bit: args.bit,
        frame_offset: args.offset,
    };
    let status = device.request(&cmd.to_wire());
    if status != STATUS_OK {
        bail!("fault request failed with status {status}");
    }
    info!("fault request acknowledged");

    for frame in 0..frames as u64 {
        let after = device.provider().frame_bytes(FrameNumber(frame))?;
        for (i, (old, new)) in before[frame as usize].iter().zip(after).enumerate() {
            if old != new {
                println!(
                    "frame {frame} byte {i}: {old:#04x} -> {new:#04x} (target frame was {})",
                    frame as i64 - args.offset as i64
                );
            }
        }
    }

    device.stop();
    Ok(())
}
