use crate::cli;
use crate::device::layout::{LANE_GROUPS_PER_GROUP, WORK_UNIT_WORDS};
use crate::launch::{Dispatcher, LaunchConfig};
use crate::reference;
use anyhow::{bail, Result};
use indicatif::ProgressBar;
use serde::Serialize;
use std::fmt::Write as FmtWrite;
use std::path::Path;
use tracing::info;

/// Group counts swept by the benchmark.
pub const GROUP_COUNTS: &[usize] = &[1, 2, 4, 8, 12, 16, 24];

/// Work units per case. Divisible by every lane-group count above, so each
/// case runs whole blocks.
pub const BENCH_WORK_UNITS: usize = 192;

#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub groups_per_block: usize,
    pub blocks: usize,
    pub work_units: usize,
    pub fill_secs: f64,
    pub mix_secs: f64,
    pub rate: f64,
}

#[derive(Serialize)]
struct BenchmarkReport<'a> {
    metric: &'static str,
    unit: &'static str,
    device: &'a str,
    algorithm: &'static str,
    cases: &'a [CaseResult],
}

pub struct BenchmarkOptions {
    pub base: LaunchConfig,
    pub group_counts: Vec<usize>,
    pub work_units: usize,
    pub json: bool,
    pub save_to_markdown: bool,
}

pub fn run(options: &BenchmarkOptions) -> Result<()> {
    let device_name = host_device_name(options.base.device.resident_blocks);
    let quiet = options.json;

    if !quiet {
        println!("ROMix Benchmark Suite");
        println!("=====================\n");
        println!("Device: {device_name}");
        println!("Work units per case: {}\n", options.work_units);
    }

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(options.group_counts.len() as u64);
        pb.set_style(cli::benchmark_progress_style());
        pb
    };

    let mut results = Vec::with_capacity(options.group_counts.len());
    for &groups in &options.group_counts {
        pb.set_message(format!("{groups} groups/block"));
        results.push(run_case(options, groups)?);
        pb.inc(1);
    }
    pb.finish_and_clear();

    if options.json {
        let report = BenchmarkReport {
            metric: "hash_rate",
            unit: "H/s",
            device: &device_name,
            algorithm: "scrypt_romix_n1024_r1",
            cases: &results,
        };
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!(
            "{:<8} {:>8} {:>10} {:>10} {:>12}",
            "Groups", "Blocks", "Fill", "Mix", "Rate"
        );
        println!("{}", "-".repeat(52));
        for r in &results {
            println!(
                "{:<8} {:>8} {:>9.3}s {:>9.3}s {:>8.1} H/s",
                r.groups_per_block, r.blocks, r.fill_secs, r.mix_secs, r.rate
            );
        }
    }

    if options.save_to_markdown {
        let version = env!("CARGO_PKG_VERSION");
        save_to_file(&device_name, version, &results)?;
        if !quiet {
            println!("\nResults saved to BENCHMARKS.md");
        }
    }

    Ok(())
}

fn run_case(options: &BenchmarkOptions, groups: usize) -> Result<CaseResult> {
    let config = LaunchConfig::for_work_units(groups, options.work_units)
        .with_pacing(options.base.pacing)
        .with_device(options.base.device);
    let dispatcher = Dispatcher::new(config)?;

    let units = dispatcher.capacity();
    let input: Vec<u32> = (0..units * WORK_UNIT_WORDS)
        .map(|i| (i as u32).wrapping_mul(0x2545_f491) ^ 0xdead_beef)
        .collect();

    let (output, report) = dispatcher.dispatch(&input)?;

    // Spot-check the last work unit of the last block against the reference.
    let unit = units - 1;
    let mut expected = [0u32; WORK_UNIT_WORDS];
    expected.copy_from_slice(&input[unit * WORK_UNIT_WORDS..(unit + 1) * WORK_UNIT_WORDS]);
    reference::romix(&mut expected);
    if output[unit * WORK_UNIT_WORDS..(unit + 1) * WORK_UNIT_WORDS] != expected[..] {
        bail!("self-check failed for {groups} groups/block (work unit {unit})");
    }

    info!(
        "{} groups/block: {} blocks, {:.1} H/s",
        groups,
        report.blocks,
        report.hashes_per_sec()
    );

    Ok(CaseResult {
        groups_per_block: groups,
        blocks: report.blocks,
        work_units: report.work_units,
        fill_secs: report.fill_secs,
        mix_secs: report.mix_secs,
        rate: report.hashes_per_sec(),
    })
}

fn host_device_name(resident_blocks: usize) -> String {
    format!(
        "host {} ({} resident blocks, {} lane-groups per thread-group)",
        std::env::consts::ARCH,
        resident_blocks,
        LANE_GROUPS_PER_GROUP
    )
}

/// Rewrites BENCHMARKS.md in the working directory with this host's table.
fn save_to_file(device_name: &str, version: &str, results: &[CaseResult]) -> Result<()> {
    let path = Path::new("BENCHMARKS.md");
    let existing = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err.into()),
    };
    std::fs::write(path, generate_markdown(device_name, version, results, &existing))?;
    Ok(())
}

fn generate_markdown(
    device_name: &str,
    version: &str,
    results: &[CaseResult],
    existing: &str,
) -> String {
    let section = format_device_section(device_name, version, results);
    if existing.is_empty() {
        return format_fresh_file(&section);
    }

    let heading = format!("### {device_name}");
    if let Some((start, end)) = section_span(existing, &heading) {
        return [&existing[..start], section.as_str(), &existing[end..]].concat();
    }
    match results_body_start(existing) {
        Some(pos) => [&existing[..pos], section.as_str(), "\n", &existing[pos..]].concat(),
        None => format!("{existing}\n## Results\n\n{section}"),
    }
}

fn format_fresh_file(device_section: &str) -> String {
    let mut out = String::new();
    out.push_str("# Benchmark Results\n\n");
    out.push_str("Run benchmarks on your hardware:\n\n");
    out.push_str("```bash\nromix --benchmark --save\n```\n\n");
    out.push_str("## Results\n\n");
    out.push_str(device_section);
    out
}

fn format_device_section(device_name: &str, version: &str, results: &[CaseResult]) -> String {
    let mut s = String::new();
    writeln!(s, "### {device_name}").unwrap();
    writeln!(s).unwrap();
    writeln!(s, "| Groups/block | Blocks | Fill | Mix | Rate |").unwrap();
    writeln!(s, "|--------------|--------|------|-----|------|").unwrap();
    for r in results {
        writeln!(
            s,
            "| {} | {} | {:.3}s | {:.3}s | {:.1} H/s |",
            r.groups_per_block, r.blocks, r.fill_secs, r.mix_secs, r.rate
        )
        .unwrap();
    }
    if let Some(best) = results
        .iter()
        .max_by(|a, b| a.rate.total_cmp(&b.rate))
    {
        writeln!(s).unwrap();
        writeln!(
            s,
            "Best: {} groups/block at {:.1} H/s",
            best.groups_per_block, best.rate
        )
        .unwrap();
    }
    writeln!(s).unwrap();
    writeln!(s, "*Version: {version}*").unwrap();
    writeln!(s).unwrap();
    s
}

/// Byte span of the block opened by the line `heading`. It runs to the next
/// level-2 or level-3 heading, or to the end of the document.
fn section_span(doc: &str, heading: &str) -> Option<(usize, usize)> {
    let mut start = None;
    let mut offset = 0;
    for line in doc.split_inclusive('\n') {
        let text = line.trim_end_matches('\n');
        match start {
            None if text == heading => start = Some(offset),
            Some(begin) if text.starts_with("## ") || text.starts_with("### ") => {
                return Some((begin, offset));
            }
            _ => {}
        }
        offset += line.len();
    }
    start.map(|begin| (begin, doc.len()))
}

/// Offset of the first content line under `## Results`.
fn results_body_start(doc: &str) -> Option<usize> {
    let mut offset = 0;
    let mut found = false;
    for line in doc.split_inclusive('\n') {
        if found && !line.trim().is_empty() {
            return Some(offset);
        }
        offset += line.len();
        found |= line.trim_end() == "## Results";
    }
    found.then_some(offset)
}
