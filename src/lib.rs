//! romix-simt: the scrypt ROMix core (N = 1024, r = 1) on a SIMT execution
//! model
//!
//! Work units are hashed by lock-step thread-groups that share staging
//! buffers in pairs, guarded by a pair mutex. The fill kernel writes each
//! work unit's 1024-slot scratchpad, the mix kernel reads it back in a
//! data-dependent order. A host model of the device runs everywhere; a wgpu
//! backend is available with `--features gpu`.

mod benchmark;
mod cli;
pub mod device;
pub mod error;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod hash;
pub mod launch;
pub mod mutex;
pub mod reference;
pub mod salsa;

pub use device::layout::{LaunchGeometry, MAX_GROUPS_PER_BLOCK, MIN_GROUPS_PER_BLOCK};
pub use device::memory::{DeviceBuffer, ScratchPool, ScratchTable};
pub use device::DeviceConfig;
pub use error::{HashError, LaunchError};
#[cfg(feature = "gpu")]
pub use gpu::{GpuBackend, GpuContext, GpuDispatcher};
pub use hash::{hash_one, RomixEngine, ScryptHasher, HEADER_LEN};
pub use launch::{Dispatcher, LaunchConfig, LaunchReport, DEFAULT_GROUPS_PER_BLOCK};
pub use mutex::{Backoff, PairMutexArray};

use anyhow::{anyhow, bail};
use clap::{Parser, ValueEnum};
use indicatif::ProgressBar;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Where ROMix runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Backend {
    /// Host model of the SIMT device
    #[default]
    Cpu,
    /// wgpu compute (requires the `gpu` feature)
    Gpu,
}

/// scrypt(N=1024, r=1, p=1) hashing on a SIMT execution model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Password to hash (UTF-8)
    #[arg(short, long, conflicts_with_all = ["header", "count"])]
    password: Option<String>,

    /// Salt for --password (UTF-8)
    #[arg(short, long, default_value = "")]
    salt: String,

    /// 80-byte block header (hex); may be repeated
    #[arg(long, conflicts_with = "count")]
    header: Vec<String>,

    /// Hash this many synthetic block headers (nonce 0..count)
    #[arg(short, long)]
    count: Option<usize>,

    /// Digest length in bytes for --password
    #[arg(long, default_value_t = 32)]
    out_len: usize,

    /// Thread-groups per execution block (1..=24)
    #[arg(short, long, default_value_t = DEFAULT_GROUPS_PER_BLOCK)]
    groups: usize,

    /// Execution blocks per launch (default: just enough for the inputs)
    #[arg(short, long)]
    blocks: Option<usize>,

    /// Pause between the fill and mix launches, in milliseconds
    #[arg(long)]
    pacing_ms: Option<u64>,

    /// Initial pair mutex backoff, in spins
    #[arg(long, default_value_t = Backoff::DEFAULT_MIN_SPINS)]
    spin_min: u32,

    /// Pair mutex backoff ceiling, in spins
    #[arg(long, default_value_t = Backoff::DEFAULT_MAX_SPINS)]
    spin_max: u32,

    /// Extra spins for odd thread-groups per iteration (scheduling stress)
    #[arg(long, default_value_t = 0)]
    stagger_spins: u32,

    /// Execution blocks in flight at once (default: available parallelism)
    #[arg(long)]
    resident_blocks: Option<usize>,

    /// Backend to run ROMix on
    #[arg(long, value_enum, default_value_t)]
    backend: Backend,

    /// GPU device index
    #[arg(long, default_value = "0")]
    gpu: u32,

    /// Graphics API for the GPU backend
    #[cfg(feature = "gpu")]
    #[arg(long, value_enum, default_value_t)]
    gpu_api: GpuBackend,

    /// Check every digest against the single-threaded reference
    #[arg(long)]
    verify: bool,

    /// Run benchmark suite and print results
    #[arg(long)]
    benchmark: bool,

    /// Save benchmark results to BENCHMARKS.md
    #[arg(long, requires = "benchmark")]
    save: bool,

    /// Machine-readable output on stdout
    #[arg(long)]
    json: bool,

    /// Quiet mode - only print digests
    #[arg(short, long)]
    quiet: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct HashSummary {
    backend: &'static str,
    groups_per_block: usize,
    capacity: usize,
    hashes: usize,
    time_seconds: f64,
    rate: f64,
    verified: bool,
    digests: Vec<String>,
}

pub fn run_from_args<I, S>(args: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<std::ffi::OsString> + Clone,
{
    let args = Args::parse_from(args);
    run(args)
}

/// Inputs as (password, salt) pairs plus the digest length.
fn resolve_inputs(args: &Args) -> anyhow::Result<(Vec<(Vec<u8>, Vec<u8>)>, usize)> {
    if let Some(ref password) = args.password {
        let pair = (password.as_bytes().to_vec(), args.salt.as_bytes().to_vec());
        return Ok((vec![pair], args.out_len));
    }

    if !args.header.is_empty() {
        let headers = args
            .header
            .iter()
            .map(|h| parse_header(h))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let inputs = headers.into_iter().map(|h| (h.clone(), h)).collect();
        return Ok((inputs, hash::HEADER_DIGEST_LEN));
    }

    if let Some(count) = args.count {
        if count == 0 {
            bail!("--count must be at least 1");
        }
        let inputs = (0..count as u32)
            .map(|nonce| {
                let header = synthetic_header(nonce).to_vec();
                (header.clone(), header)
            })
            .collect();
        return Ok((inputs, hash::HEADER_DIGEST_LEN));
    }

    Err(anyhow!("one of --password, --header or --count is required"))
}

fn parse_header(s: &str) -> anyhow::Result<Vec<u8>> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| anyhow!("invalid header hex: {}", e))?;
    if bytes.len() != HEADER_LEN {
        bail!(
            "header must be {} bytes, got {}",
            HEADER_LEN,
            bytes.len()
        );
    }
    Ok(bytes)
}

/// Zero header with a little-endian nonce in the last four bytes.
fn synthetic_header(nonce: u32) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[HEADER_LEN - 4..].copy_from_slice(&nonce.to_le_bytes());
    header
}

fn launch_config(args: &Args, work_units: usize) -> LaunchConfig {
    let mut device = DeviceConfig {
        backoff: Backoff::new(args.spin_min, args.spin_max),
        stagger_spins: args.stagger_spins,
        ..DeviceConfig::default()
    };
    if let Some(resident) = args.resident_blocks {
        device.resident_blocks = resident;
    }

    let config = match args.blocks {
        Some(blocks) => LaunchConfig::new(args.groups, blocks),
        None => LaunchConfig::for_work_units(args.groups, work_units),
    };
    config
        .with_pacing(args.pacing_ms.map(Duration::from_millis))
        .with_device(device)
}

fn hash_all<E: RomixEngine>(
    hasher: &ScryptHasher<E>,
    inputs: &[(Vec<u8>, Vec<u8>)],
    out_len: usize,
    pb: &ProgressBar,
) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut digests = Vec::with_capacity(inputs.len());
    for chunk in inputs.chunks(hasher.capacity()) {
        digests.extend(hasher.hash_batch(chunk, out_len)?);
        pb.inc(chunk.len() as u64);
    }
    Ok(digests)
}

fn hash_with_backend(
    args: &Args,
    config: LaunchConfig,
    inputs: &[(Vec<u8>, Vec<u8>)],
    out_len: usize,
    pb: &ProgressBar,
) -> anyhow::Result<(Vec<Vec<u8>>, usize)> {
    match args.backend {
        Backend::Cpu => {
            let hasher = ScryptHasher::new(config)?;
            let digests = hash_all(&hasher, inputs, out_len, pb)?;
            Ok((digests, hasher.capacity()))
        }
        #[cfg(feature = "gpu")]
        Backend::Gpu => {
            let ctx = pollster::block_on(GpuContext::new(args.gpu, args.gpu_api))?;
            if ctx.is_software() {
                tracing::warn!("Using software renderer ({})", ctx.device_name());
            }
            let hasher = ScryptHasher::with_engine(GpuDispatcher::new(ctx, config)?);
            let digests = hash_all(&hasher, inputs, out_len, pb)?;
            Ok((digests, hasher.capacity()))
        }
        #[cfg(not(feature = "gpu"))]
        Backend::Gpu => Err(anyhow!(
            "GPU backend not available (device {}). Rebuild with --features gpu",
            args.gpu
        )),
    }
}

pub fn run(args: Args) -> anyhow::Result<()> {
    cli::init_tracing(args.verbose, args.quiet || args.json);

    if args.benchmark {
        let options = benchmark::BenchmarkOptions {
            base: launch_config(&args, benchmark::BENCH_WORK_UNITS),
            group_counts: benchmark::GROUP_COUNTS.to_vec(),
            work_units: benchmark::BENCH_WORK_UNITS,
            json: args.json,
            save_to_markdown: args.save,
        };
        return benchmark::run(&options);
    }

    let (inputs, out_len) = resolve_inputs(&args)?;
    let config = launch_config(&args, inputs.len());

    if !args.quiet && !args.json {
        info!("ROMix scrypt(N=1024, r=1, p=1)");
        info!("==============================");
        info!("Backend: {:?}", args.backend);
        info!("Inputs: {}", inputs.len());
        info!(
            "Launch: {} groups/block x {} blocks",
            config.groups_per_block, config.blocks
        );
    }

    let pb = if args.quiet || args.json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(inputs.len() as u64);
        pb.set_style(cli::hash_progress_style());
        pb
    };

    let start_time = Instant::now();
    let (digests, capacity) = hash_with_backend(&args, config, &inputs, out_len, &pb)?;
    let duration = start_time.elapsed();
    pb.finish_and_clear();

    if args.verify {
        for (i, ((password, salt), digest)) in inputs.iter().zip(&digests).enumerate() {
            let mut expected = vec![0u8; out_len];
            hash_one(password, salt, &mut expected)?;
            if *digest != expected {
                error!("Verification FAILED for input {}", i);
                bail!("digest {} differs from the reference", i);
            }
        }
        if !args.quiet && !args.json {
            info!("Verification: SUCCESS ({} digests)", digests.len());
        }
    }

    let time_seconds = duration.as_secs_f64();
    let rate = digests.len() as f64 / time_seconds.max(f64::EPSILON);

    if args.json {
        let summary = HashSummary {
            backend: match args.backend {
                Backend::Cpu => "cpu",
                Backend::Gpu => "gpu",
            },
            groups_per_block: config.groups_per_block,
            capacity,
            hashes: digests.len(),
            time_seconds,
            rate,
            verified: args.verify,
            digests: digests.iter().map(hex::encode).collect(),
        };
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        for digest in &digests {
            println!("{}", hex::encode(digest));
        }
        if !args.quiet {
            info!("Hashes: {}", digests.len());
            info!("Time elapsed: {:.2}s ({:.1} H/s)", time_seconds, rate);
        }
    }

    Ok(())
}
