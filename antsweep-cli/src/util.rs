use std::path::{Path, PathBuf};

use anyhow::{Error, Result};
use colored::*;

use antsweep::coord::RunFailure;
use antsweep::sweep::SweepReport;
use antsweep::SWEEP_MANIFEST_FILE;

/// Picks the manifest file using a given path. Directories are expected to
/// contain the default manifest file.
pub(crate) fn resolve_manifest_path(path: &Path) -> Result<PathBuf> {
    let manifest = if path.is_dir() {
        path.join(SWEEP_MANIFEST_FILE)
    } else {
        path.to_path_buf()
    };
    if !manifest.is_file() {
        return Err(Error::msg(format!(
            "sweep manifest not found at {}",
            manifest.to_string_lossy()
        )));
    }
    Ok(manifest)
}

/// Splits a `name=value` pair.
pub(crate) fn split_assignment(pair: &str) -> Result<(String, String)> {
    let mut split = pair.splitn(2, '=');
    match (split.next(), split.next()) {
        (Some(name), Some(value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(Error::msg(format!(
            "expected name=value assignment, got \"{}\"",
            pair
        ))),
    }
}

pub(crate) fn print_report(report: &SweepReport) {
    println!(
        "{} {} runs succeeded, {} failed",
        "Sweep finished:".green(),
        report.succeeded(),
        report.failed()
    );
    for outcome in &report.outcomes {
        if let Err(e) = outcome {
            let label = match e.failure {
                RunFailure::Cancelled => "cancelled".yellow(),
                _ => "failed".red(),
            };
            println!("  {} run {} ({:016x}): {}", label, e.index, e.fingerprint, e.failure);
        }
    }
    for (index, result) in &report.exports {
        if let Err(e) = result {
            println!("  {} writing time series of run {}: {}", "failed".red(), index, e);
        }
    }
    for (index, result) in &report.reductions {
        if let Err(e) = result {
            println!("  {} reducing output of run {}: {}", "failed".red(), index, e);
        }
    }
    println!("Results written to {}", report.batch_dir.to_string_lossy());
}
