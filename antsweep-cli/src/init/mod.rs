//! Initialize sweep manifests based on templates.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Error, Result};

use antsweep::sweep::SweepManifest;
use antsweep::{SchemaVersion, SWEEP_MANIFEST_FILE};

/// Writes a new manifest at the given path. A directory path gets the
/// default manifest file name appended. Returns the path of the created
/// manifest.
pub fn init_at_path(path: &Path, schema: SchemaVersion, template: &str) -> Result<PathBuf> {
    let path = if path.is_dir() || path.extension().is_none() {
        path.join(SWEEP_MANIFEST_FILE)
    } else {
        path.to_path_buf()
    };
    println!(
        "Initiating new sweep at: {path} (schema: {schema}, template: {template})",
        path = path.to_string_lossy(),
        schema = schema,
        template = template
    );

    // don't overwrite existing manifests
    if path.exists() {
        return Err(Error::msg(format!(
            "Can't initialize sweep, file already exists ({}). Try another path.",
            path.to_string_lossy()
        )));
    }

    let content = match template {
        "commented" => template_commented(schema)?,
        "bare" => template_bare(schema)?,
        _ => {
            return Err(Error::msg(format!(
                "Failed getting sweep template \"{}\"",
                template
            )))
        }
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, content)?;
    Ok(path)
}

fn template_bare(schema: SchemaVersion) -> Result<String> {
    Ok(toml::to_string(&SweepManifest::template(schema))?)
}

fn template_commented(schema: SchemaVersion) -> Result<String> {
    Ok(format!(
        r##"# Sweep manifest, generated with `antsweep new`.
#
# schema            parameter schema version, `v1` (colony) or `v2` (competition)
# model             path to the model file, relative to this manifest
# engine            command line of the headless engine process, not needed
#                   for dry runs (`antsweep run --dry-run`)
# deterministic     seed runs from their parameters instead of at random
# multi_run         tag each run with `set run-ix <index>`, for model variants
#                   writing per-run `<index>.out` files
# workers           number of parallel workers, 0 means available parallelism
# run_timeout_secs  per-run timeout, 0 means none
# output_dir        root of the timestamped batch directories
# raw_output_dir    where the engine writes raw `<index>.out` files
#
# [ticks] sets the sampled range `[start, stop)` and the sampling interval.
#
# Every [[runs]] entry describes one parameter set, `repeat` times. Fields
# missing from its params table take the schema defaults listed below.

{}"##,
        template_bare(schema)?
    ))
}
