//! Map two pages a leaf table apart, redirect the first onto the frame
//! backing the second, and show that the two virtual addresses have become
//! synonyms for one physical frame.

use anyhow::bail;
use clap::Parser;
use log::info;

use faultline::{
    Redirection, RedirectionRequest, SimProvider, provider::PTE_WRITE, redirect, translate,
};

const PID: u32 = 4243;
const SOURCE: u64 = 0x4000_0000;

#[derive(Debug, Parser)]
struct CliArgs {
    /// Distance from source to alias page (the original used 2 MiB, one
    /// leaf table over).
    #[arg(long, default_value_t = 0x20_0000)]
    distance: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = CliArgs::parse();
    let alias = SOURCE + args.distance;

    let mut provider = SimProvider::new();
    provider.add_process(PID);
    provider.map_page(PID, SOURCE, PTE_WRITE)?;
    provider.map_page(PID, alias, PTE_WRITE)?;
    provider.write_virt(PID, SOURCE, &[0xAA; 8])?;
    provider.write_virt(PID, alias, &[0x55; 8])?;

    let before = translate(&provider, PID, SOURCE)?;
    info!(
        "source {:#x} -> frame {} (alias {:#x} -> frame {})",
        SOURCE,
        before.frame_number,
        alias,
        translate(&provider, PID, alias)?.frame_number
    );

    let outcome = redirect(
        &mut provider,
        &RedirectionRequest {
            pid: PID,
            source_vaddr: SOURCE,
            alias_vaddr: alias,
        },
    )?;
    let Redirection::Applied { alias_index } = outcome else {
        bail!("redirection skipped, nothing to show");
    };
    info!("redirection applied, alias leaf index {alias_index}");

    let after = translate(&provider, PID, SOURCE)?;
    let mut via_source = [0u8; 8];
    provider.read_virt(PID, SOURCE, &mut via_source)?;
    println!(
        "source frame {} -> {}, reads {:02x?} (permissions unchanged: {})",
        before.frame_number,
        after.frame_number,
        via_source,
        after.permission_bits == before.permission_bits
    );
    println!("coherence flushes emitted: {}", provider.flush_log().len());
    Ok(())
}
