//! CLI utilities for progress bars and tracing

use indicatif::ProgressStyle;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing with optional verbosity. `RUST_LOG` overrides the
/// level when set.
pub fn init_tracing(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Progress over hashed inputs.
pub fn hash_progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} hashes ({per_sec}, {eta}) {msg}",
        )
        .expect("Invalid progress bar template")
        .progress_chars("#>-")
}

/// Progress over benchmark cases.
pub fn benchmark_progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("Invalid progress bar template")
        .progress_chars("#>-")
}
