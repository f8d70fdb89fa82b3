//! Sweep `target_bit` x `frame_offset` over a simulated region and record
//! where every fault lands, plus whether a second identical request
//! restored the original content. Results go to a timestamped JSON file.

use std::fs::File;
use std::io::{BufWriter, Write};

use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::info;
use rand::Rng;
use serde::Serialize;

use faultline::util::{PAGE_SIZE, WORD_BITS};
use faultline::{
    EngineError, FaultRequest, FrameNumber, InjectMode, SimProvider, inject, provider::PTE_WRITE,
};

const PID: u32 = 4244;
const BASE: u64 = 0x4000_0000;

#[derive(Debug, Parser, Serialize)]
struct CliArgs {
    /// Sweep bits 0..bits. Values past the word width are recorded as
    /// rejected, which is the point of including them.
    #[arg(long, default_value_t = WORD_BITS + 2)]
    bits: u32,
    /// Sweep frame offsets -max_offset..=max_offset.
    #[arg(long, default_value_t = 4)]
    max_offset: i64,
    /// Pages to map in the simulated victim.
    #[arg(long, default_value_t = 16)]
    pages: usize,
    /// Inject through the direct-value path instead of content mode.
    #[arg(long)]
    direct: bool,
    /// Directory the results file is written to.
    #[arg(long, default_value = "results")]
    out_dir: String,
}

#[derive(Debug, Serialize)]
struct SweepRecord {
    target_bit: u32,
    frame_offset: i64,
    status: String,
    flipped: Option<FlipLocation>,
    restored: bool,
}

#[derive(Debug, Serialize)]
struct FlipLocation {
    frame: FrameNumber,
    byte: usize,
}

#[derive(Serialize)]
struct SweepResults {
    date: String,
    args: CliArgs,
    records: Vec<SweepRecord>,
}

fn arena(provider: &SimProvider) -> Vec<Vec<u8>> {
    (0..provider.frame_count() as u64)
        .map(|f| {
            provider
                .frame_bytes(FrameNumber(f))
                .map(|b| b.to_vec())
                .unwrap_or_default()
        })
        .collect()
}

fn first_difference(before: &[Vec<u8>], after: &[Vec<u8>]) -> Option<FlipLocation> {
    for (frame, (old, new)) in before.iter().zip(after).enumerate() {
        if let Some(byte) = old.iter().zip(new).position(|(a, b)| a != b) {
            return Some(FlipLocation {
                frame: FrameNumber(frame as u64),
                byte,
            });
        }
    }
    None
}

fn main() -> anyhow::Result<()> {
    let progress = init_logging_with_progress()?;
    let args = CliArgs::parse();
    info!("CLI args: {:?}", args);

    let mut provider = SimProvider::new();
    provider.add_process(PID);
    provider.map_region(PID, BASE, args.pages, PTE_WRITE)?;
    let mut pattern = vec![0u8; args.pages * PAGE_SIZE];
    rand::rng().fill(&mut pattern[..]);
    provider.write_virt(PID, BASE, &pattern)?;

    let mode = if args.direct {
        InjectMode::DirectValue
    } else {
        InjectMode::Content
    };
    let offsets: Vec<i64> = (-args.max_offset..=args.max_offset).collect();
    let pristine = arena(&provider);

    let bar = progress.add(ProgressBar::new(offsets.len() as u64 * args.bits as u64));
    bar.set_style(named_bar("Sweeping faults"));

    let mut records = Vec::new();
    for &frame_offset in &offsets {
        for target_bit in 0..args.bits {
            bar.inc(1);
            let req = FaultRequest {
                vaddr: BASE,
                pid: PID,
                target_bit,
                frame_offset,
            };
            let status = inject(&mut provider, &req, mode);
            let flipped = match status {
                Ok(()) => first_difference(&pristine, &arena(&provider)),
                Err(_) => None,
            };
            // the same request again must toggle the bit back
            let restored = match status {
                Ok(()) => {
                    inject(&mut provider, &req, mode).is_ok() && arena(&provider) == pristine
                }
                Err(_) => arena(&provider) == pristine,
            };
            records.push(SweepRecord {
                target_bit,
                frame_offset,
                status: match status {
                    Ok(()) => "ok".to_string(),
                    Err(EngineError::NotMapped) => "not-mapped".to_string(),
                    Err(EngineError::OutOfRange) => "out-of-range".to_string(),
                    Err(EngineError::NoSuchProcess) => "no-such-process".to_string(),
                },
                flipped,
                restored,
            });
        }
    }
    bar.finish();

    let now = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    std::fs::create_dir_all(&args.out_dir)?;
    let results_file = format!("{}/sweep_{}.json", args.out_dir, now);
    info!("writing {} records to {}", records.len(), results_file);
    let results = SweepResults {
        date: chrono::Local::now().to_rfc3339(),
        args,
        records,
    };
    let mut json_file = BufWriter::new(File::create(results_file)?);
    serde_json::to_writer_pretty(&mut json_file, &results)?;
    json_file.flush()?;
    Ok(())
}

fn named_bar(name: &str) -> ProgressStyle {
    let fmt = format!(
        "{name:<31} {{wide_bar:40.cyan/blue}} {{pos:>3}}/{{len:<3}} [{{elapsed_precise}} ({{eta}} remaining)]"
    );
    ProgressStyle::default_bar()
        .template(&fmt)
        .unwrap_or(ProgressStyle::default_bar())
}

fn init_logging_with_progress() -> anyhow::Result<MultiProgress> {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    let progress = MultiProgress::new();
    LogWrapper::new(progress.clone(), logger).try_init()?;
    Ok(progress)
}
