//! Sweep manifests and batch execution.
//!
//! A sweep is described by a manifest file listing the runs to perform.
//! Each run entry carries a partial parameter table (missing fields take the
//! schema defaults) and an optional repeat count. Executing a sweep creates
//! a new batch directory named after the batch start time, then fills it
//! with per-run time series, a results snapshot, a listing of failed runs
//! and reduced raw output files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use linked_hash_map::LinkedHashMap;

use crate::coord::{CoordConfig, RunCoordinator, RunJob, RunOutcome};
use crate::engine::process::ProcessEngineFactory;
use crate::engine::{EngineFactory, TickRange};
use crate::error::Error;
use crate::params::{ParamDict, ParameterSet, SchemaVersion};
use crate::result::RunResult;
use crate::{reduce, snapshot, util};
use crate::{Result, BATCH_DIR_TIME_FORMAT, FAILURES_FILE, RAW_OUTPUT_EXTENSION, RESULTS_SNAPSHOT_FILE};

/// Sweep manifest as read from file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepManifest {
    /// Parameter schema version, required
    pub schema: String,
    /// Path to the model file
    #[serde(default)]
    pub model: String,
    /// Command line of the external engine process
    #[serde(default)]
    pub engine: String,
    #[serde(default = "default_true")]
    pub deterministic: bool,
    /// Tag each run with its index, for model variants saving per-run output
    #[serde(default)]
    pub multi_run: bool,
    /// Number of workers, 0 means available parallelism
    #[serde(default)]
    pub workers: usize,
    /// Per-run timeout, 0 means none
    #[serde(default)]
    pub run_timeout_secs: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Directory the engine writes raw `<index>.out` files into
    #[serde(default = "default_raw_output_dir")]
    pub raw_output_dir: String,
    #[serde(default)]
    pub ticks: TickRange,
    #[serde(default)]
    pub runs: Vec<RunEntry>,
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> String {
    "./output".to_string()
}

fn default_raw_output_dir() -> String {
    "./".to_string()
}

fn default_repeat() -> usize {
    1
}

/// Single entry of the manifest's run list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEntry {
    /// Number of jobs this entry contributes
    #[serde(default = "default_repeat")]
    pub repeat: usize,
    #[serde(default)]
    pub params: LinkedHashMap<String, toml::Value>,
}

impl RunEntry {
    /// Stringifies the parameter table.
    pub fn param_dict(&self) -> Result<ParamDict> {
        let mut dict = ParamDict::new();
        for (key, value) in &self.params {
            let s = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => format!("{:?}", f),
                other => {
                    return Err(Error::config(
                        key,
                        &other.to_string(),
                        "expected a number or a string",
                    ))
                }
            };
            dict.insert(key.clone(), s);
        }
        Ok(dict)
    }
}

impl SweepManifest {
    /// Manifest for a single run with default parameters of the given
    /// schema.
    pub fn template(schema: SchemaVersion) -> Self {
        let params = ParameterSet::default_for(schema)
            .values()
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    crate::ParamValue::Int(i) => toml::Value::Integer(i),
                    crate::ParamValue::Float(f) => toml::Value::Float(f),
                };
                (name.to_string(), value)
            })
            .collect();
        Self {
            schema: schema.name().to_string(),
            model: "./model.nlogo".to_string(),
            engine: String::new(),
            deterministic: true,
            multi_run: schema == SchemaVersion::V2,
            workers: 0,
            run_timeout_secs: 0,
            output_dir: default_output_dir(),
            raw_output_dir: default_raw_output_dir(),
            ticks: TickRange::default(),
            runs: vec![RunEntry { repeat: 1, params }],
        }
    }
}

/// Resolved sweep, ready for execution.
#[derive(Debug, Clone)]
pub struct Sweep {
    pub schema: SchemaVersion,
    pub model: PathBuf,
    pub engine: Option<String>,
    pub deterministic: bool,
    pub multi_run: bool,
    pub workers: usize,
    pub run_timeout: Option<Duration>,
    pub output_dir: PathBuf,
    pub raw_output_dir: PathBuf,
    /// Directory relative paths are resolved against, also the engine's
    /// working directory
    pub root: PathBuf,
    pub ticks: TickRange,
    /// Parameter sets with repeats expanded, job index equals position
    pub params: Vec<ParameterSet>,
}

impl Sweep {
    /// Reads the manifest at the given path. Relative paths within it are
    /// resolved against the manifest's directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        let manifest: SweepManifest = util::deser_struct_from_path(path)?;
        let root = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Sweep::from_manifest(manifest, &root)
    }

    pub fn from_manifest(manifest: SweepManifest, root: &Path) -> Result<Self> {
        let schema: SchemaVersion = manifest.schema.parse()?;
        manifest.ticks.validate()?;

        let mut params = Vec::new();
        for (n, entry) in manifest.runs.iter().enumerate() {
            let set = ParameterSet::from_dict(schema, &entry.param_dict()?)?;
            if entry.repeat == 0 {
                warn!("run entry {} has zero repeats, skipping", n);
            }
            for _ in 0..entry.repeat {
                params.push(set.clone());
            }
        }
        if params.is_empty() {
            warn!("sweep manifest doesn't describe any runs");
        }

        let root = util::resolve_path(Path::new("."), root);
        let engine = match manifest.engine.trim() {
            "" => None,
            e => Some(e.to_string()),
        };
        Ok(Sweep {
            schema,
            model: util::resolve_path(&root, Path::new(&manifest.model)),
            engine,
            deterministic: manifest.deterministic,
            multi_run: manifest.multi_run,
            workers: manifest.workers,
            run_timeout: match manifest.run_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            output_dir: util::resolve_path(&root, Path::new(&manifest.output_dir)),
            raw_output_dir: util::resolve_path(&root, Path::new(&manifest.raw_output_dir)),
            ticks: manifest.ticks,
            params,
            root,
        })
    }

    /// Jobs for every parameter set of the sweep, in manifest order.
    pub fn jobs(&self) -> Vec<RunJob> {
        self.params
            .iter()
            .enumerate()
            .map(|(index, params)| {
                let job = RunJob::new(index, params.clone(), self.deterministic);
                if self.multi_run {
                    job.tagged()
                } else {
                    job
                }
            })
            .collect()
    }

    pub fn coord_config(&self) -> CoordConfig {
        CoordConfig {
            model: self.model.clone(),
            ticks: self.ticks,
            workers: self.workers,
            run_timeout: self.run_timeout,
            ..CoordConfig::default()
        }
    }

    /// Factory spawning the external engine configured for the sweep.
    pub fn engine_factory(&self) -> Result<ProcessEngineFactory> {
        match &self.engine {
            Some(line) => {
                Ok(ProcessEngineFactory::from_command_line(line)?.with_work_dir(self.root.clone()))
            }
            None => Err(Error::config(
                "engine",
                "",
                "no engine command configured for the sweep",
            )),
        }
    }

    /// Executes every run of the sweep.
    pub fn execute<F: EngineFactory + 'static>(
        &self,
        factory: F,
        running: Arc<AtomicBool>,
    ) -> Result<SweepReport> {
        self.execute_jobs(factory, self.jobs(), running)
    }

    /// Executes a selection of the sweep's jobs, persisting the outcomes
    /// into a fresh batch directory.
    pub fn execute_jobs<F: EngineFactory + 'static>(
        &self,
        factory: F,
        jobs: Vec<RunJob>,
        running: Arc<AtomicBool>,
    ) -> Result<SweepReport> {
        let batch_dir = create_batch_dir(&self.output_dir)?;
        info!(
            "starting {} sweep with {} runs, batch directory: {}",
            self.schema,
            jobs.len(),
            batch_dir.to_string_lossy()
        );

        let indices: Vec<usize> = jobs.iter().map(|j| j.index).collect();
        let coord = RunCoordinator::new(factory, self.coord_config());
        let outcomes = coord.run_until(jobs, running)?;

        let exports = export_time_series(&indices, &outcomes, &batch_dir);
        let mut results: Vec<RunResult> = Vec::new();
        let mut failures: Vec<FailureRecord> = Vec::new();
        for outcome in &outcomes {
            match outcome {
                Ok(result) => results.push(result.clone()),
                Err(e) => failures.push(FailureRecord {
                    index: e.index,
                    fingerprint: format!("{:016x}", e.fingerprint),
                    reason: e.failure.to_string(),
                    params: e.params.as_dict(),
                }),
            }
        }

        snapshot::write_snapshot(&batch_dir.join(RESULTS_SNAPSHOT_FILE), results, true)?;
        if !failures.is_empty() {
            let listing = FailureListing { failed: failures };
            fs::write(batch_dir.join(FAILURES_FILE), toml::to_string(&listing)?)?;
        }

        let reductions = self.reduce_outputs(&indices, &outcomes, &batch_dir);
        let report = SweepReport {
            batch_dir,
            outcomes,
            exports,
            reductions,
        };
        info!(
            "sweep finished: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }

    /// Reduces raw output files of the successful runs into the batch
    /// directory. Runs that didn't produce any raw output are skipped.
    fn reduce_outputs(
        &self,
        indices: &[usize],
        outcomes: &[RunOutcome],
        batch_dir: &Path,
    ) -> Vec<(usize, Result<PathBuf>)> {
        let mut reductions = Vec::new();
        for (&index, outcome) in indices.iter().zip(outcomes) {
            if outcome.is_err() {
                continue;
            }
            let input = self
                .raw_output_dir
                .join(format!("{}.{}", index, RAW_OUTPUT_EXTENSION));
            if !input.is_file() {
                trace!("no raw output for run {}", index);
                continue;
            }
            let output = batch_dir.join(reduce::csv_name_for(&input));
            let result = reduce::reduce_file(&input, &output).map(|_| output);
            if let Err(e) = &result {
                error!("failed reducing output of run {}: {}", index, e);
            }
            reductions.push((index, result));
        }
        reductions
    }
}

/// Writes the time series of every successful run as `run_<index>.csv`.
///
/// A failed write is logged and reported for its run only.
fn export_time_series(
    indices: &[usize],
    outcomes: &[RunOutcome],
    batch_dir: &Path,
) -> Vec<(usize, Result<PathBuf>)> {
    let mut exports = Vec::new();
    for (&index, outcome) in indices.iter().zip(outcomes) {
        if let Ok(result) = outcome {
            let path = batch_dir.join(format!("run_{}.csv", index));
            let written = result.write_csv_at(&path).map(|_| path);
            if let Err(e) = &written {
                error!("failed writing time series of run {}: {}", index, e);
            }
            exports.push((index, written));
        }
    }
    exports
}

/// Creates a new batch directory named after the current local time.
fn create_batch_dir(output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let stamp = chrono::Local::now().format(BATCH_DIR_TIME_FORMAT).to_string();
    let mut dir = output_dir.join(&stamp);
    let mut n = 1;
    while dir.exists() {
        dir = output_dir.join(format!("{}_{}", stamp, n));
        n += 1;
    }
    fs::create_dir(&dir)?;
    Ok(dir)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FailureListing {
    failed: Vec<FailureRecord>,
}

/// Failed run as listed in the batch directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub index: usize,
    pub fingerprint: String,
    pub reason: String,
    pub params: ParamDict,
}

/// Reads the failed runs listing of a batch.
pub fn read_failures(batch_dir: &Path) -> Result<Vec<FailureRecord>> {
    let path = batch_dir.join(FAILURES_FILE);
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let listing: FailureListing = util::deser_struct_from_path(&path)?;
    Ok(listing.failed)
}

/// Summary of an executed sweep.
#[derive(Debug)]
pub struct SweepReport {
    pub batch_dir: PathBuf,
    /// Outcomes in submission order
    pub outcomes: Vec<RunOutcome>,
    /// Per-run time series files, by run index
    pub exports: Vec<(usize, Result<PathBuf>)>,
    /// Reduced raw output files, by run index
    pub reductions: Vec<(usize, Result<PathBuf>)>,
}

impl SweepReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_err()).count()
    }

    pub fn failed_exports(&self) -> usize {
        self.exports.iter().filter(|(_, r)| r.is_err()).count()
    }

    pub fn failed_reductions(&self) -> usize {
        self.reductions.iter().filter(|(_, r)| r.is_err()).count()
    }

    /// Whether every run, every time series export and every reduction
    /// succeeded.
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.failed_exports() == 0 && self.failed_reductions() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
schema = "v2"
model = "AntsCompSave.nlogo"
multi_run = true
run_timeout_secs = 30

[ticks]
stop = 50

[[runs]]
repeat = 2
[runs.params]
food_val = 2.0
chunk_size = "10"

[[runs]]
[runs.params]
initial_colonies = 4
"#;

    #[test]
    fn manifest_expands_repeats() {
        let manifest: SweepManifest = toml::from_str(MANIFEST).unwrap();
        let sweep = Sweep::from_manifest(manifest, Path::new("/tmp")).unwrap();
        assert_eq!(sweep.schema, SchemaVersion::V2);
        assert_eq!(sweep.params.len(), 3);
        assert_eq!(sweep.params[0], sweep.params[1]);
        assert_ne!(sweep.params[1], sweep.params[2]);
        assert_eq!(sweep.ticks, TickRange::new(10, 50, 10).unwrap());
        assert_eq!(sweep.run_timeout, Some(Duration::from_secs(30)));
        assert!(sweep.deterministic);
        assert!(sweep.engine.is_none());

        let dict = sweep.params[0].as_dict();
        assert_eq!(dict["food_val"], "2.0");
        assert_eq!(dict["chunk_size"], "10");

        let jobs = sweep.jobs();
        assert_eq!(
            jobs.iter().map(|j| j.run_tag).collect::<Vec<_>>(),
            vec![Some(0), Some(1), Some(2)]
        );
    }

    #[test]
    fn manifest_requires_known_schema() {
        let manifest: SweepManifest = toml::from_str("schema = \"v7\"").unwrap();
        match Sweep::from_manifest(manifest, Path::new(".")) {
            Err(Error::UnknownSchema(s)) => assert_eq!(s, "v7"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn manifest_rejects_bad_values() {
        let manifest: SweepManifest =
            toml::from_str("schema = \"v1\"\n[[runs]]\nparams = { food_val = true }").unwrap();
        assert!(Sweep::from_manifest(manifest, Path::new(".")).is_err());

        let manifest: SweepManifest =
            toml::from_str("schema = \"v1\"\n[ticks]\ninterval = 0").unwrap();
        assert!(Sweep::from_manifest(manifest, Path::new(".")).is_err());
    }

    #[test]
    fn failed_export_is_per_run() {
        let dir = std::env::temp_dir().join(format!("antsweep-export-{}", std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        // a directory in place of the csv file makes that one write fail
        fs::create_dir_all(dir.join("run_1.csv")).unwrap();

        let result = RunResult::new(ParameterSet::default_for(SchemaVersion::V1), 1, None);
        let outcomes: Vec<RunOutcome> = vec![Ok(result.clone()), Ok(result.clone()), Ok(result)];
        let exports = export_time_series(&[0, 1, 2], &outcomes, &dir);

        assert_eq!(exports.len(), 3);
        assert_eq!(exports[0].1.as_ref().unwrap(), &dir.join("run_0.csv"));
        assert_eq!(exports[1].0, 1);
        assert!(exports[1].1.is_err());
        assert!(dir.join("run_2.csv").is_file());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn template_round_trip() {
        let template = SweepManifest::template(SchemaVersion::V1);
        let text = toml::to_string(&template).unwrap();
        let manifest: SweepManifest = toml::from_str(&text).unwrap();
        let sweep = Sweep::from_manifest(manifest, Path::new(".")).unwrap();
        assert_eq!(sweep.params, vec![ParameterSet::default_for(SchemaVersion::V1)]);
    }
}
