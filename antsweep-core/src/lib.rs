//! This library implements parameter sweeps over an external ant colony
//! simulation engine.
//!
//! Programming interface is centered around the [`RunCoordinator`], which
//! fans a batch of [`ParameterSet`]s out over a pool of workers. Each worker
//! owns a single private [`Engine`] instance and uses the [`Sampler`] to
//! drive one run at a time: seed the engine, apply parameters, set up the
//! world and sample a fixed vector of reporters at a fixed tick interval.
//! Every run produces a [`RunResult`] holding the sampled time series.
//!
//! # Engines
//!
//! The simulation engine itself is not part of this library. It's treated as
//! an external collaborator reachable through the [`Engine`] trait. The
//! [`ProcessEngine`] talks to an external headless engine process using a
//! line-oriented JSON protocol. The [`SyntheticEngine`] is an in-process
//! stand-in producing deterministic pseudo-random data, useful for dry runs.
//!
//! # Reducing raw output
//!
//! Model variants that save per-agent data write it out in the engine's
//! native list-printing format. The [`reduce`] module turns those files into
//! proper csv tables.
//!
//! # Sweeps
//!
//! [`Sweep`] ties everything together: it's created from a manifest file,
//! executes all the runs it describes and persists results into a
//! timestamped batch directory.
//!
//! ## Example
//!
//! ```ignore
//! extern crate antsweep_core as antsweep;
//! use std::path::Path;
//! use antsweep::{Engine, ParameterSet, SchemaVersion, Sampler, SyntheticEngine, TickRange};
//!
//! pub fn main() {
//!     let params = ParameterSet::default_for(SchemaVersion::V1);
//!     let mut engine = SyntheticEngine::new();
//!     engine.open_model(Path::new("ants.nlogo")).unwrap();
//!     let sampler = Sampler::new(TickRange::new(10, 100, 10).unwrap());
//!     let result = sampler.sample(&mut engine, &params, true, None).unwrap();
//!     println!("{:?}", result.ticks().collect::<Vec<_>>());
//! }
//! ```
//!
//! [`RunCoordinator`]: coord/struct.RunCoordinator.html
//! [`ParameterSet`]: params/enum.ParameterSet.html
//! [`Engine`]: engine/trait.Engine.html
//! [`ProcessEngine`]: engine/process/struct.ProcessEngine.html
//! [`SyntheticEngine`]: engine/synthetic/struct.SyntheticEngine.html
//! [`Sampler`]: sampler/struct.Sampler.html
//! [`RunResult`]: result/struct.RunResult.html
//! [`reduce`]: reduce/index.html
//! [`Sweep`]: sweep/struct.Sweep.html

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

// reexports
pub use coord::{CoordConfig, RunCoordinator, RunError, RunFailure, RunJob, RunOutcome};
pub use engine::process::{ProcessEngine, ProcessEngineFactory};
pub use engine::synthetic::{SyntheticEngine, SyntheticEngineFactory};
pub use engine::{Engine, EngineFactory, ReportValue, Terminate, TerminateHandle, TickRange};
pub use error::{Error, Result};
pub use params::{ParamDict, ParamValue, ParameterSet, SchemaVersion};
pub use result::RunResult;
pub use sampler::Sampler;
pub use state::{Measure, MeasureKind, MeasureSpec, SimState};
pub use sweep::{Sweep, SweepManifest, SweepReport};

pub mod coord;
pub mod engine;
pub mod error;
pub mod params;
pub mod reduce;
pub mod result;
pub mod sampler;
pub mod snapshot;
pub mod state;
pub mod sweep;

mod util;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

/// Default name of the sweep manifest file.
pub const SWEEP_MANIFEST_FILE: &str = "sweep.toml";
/// Extension of the raw per-run output files written by the engine.
pub const RAW_OUTPUT_EXTENSION: &str = "out";
/// Name of the results snapshot file within a batch directory.
pub const RESULTS_SNAPSHOT_FILE: &str = "results.snapshot";
/// Name of the failed runs listing within a batch directory.
pub const FAILURES_FILE: &str = "failures.toml";
/// Format used for naming batch directories.
pub const BATCH_DIR_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Default tick range sampled during a run, `[10, 100)` every 10 ticks.
pub const DEFAULT_TICK_START: Tick = 10;
pub const DEFAULT_TICK_STOP: Tick = 100;
pub const DEFAULT_TICK_INTERVAL: Tick = 10;

/// Upper bound (exclusive) for seeds picked at random for
/// non-deterministic runs.
pub const RANDOM_SEED_LIMIT: i64 = 1_000_000_000;

/// Floating point numer type used throughout the library.
pub type Float = f64;
/// Integer number type used throughout the library.
pub type Int = i64;
/// Simulation time step.
pub type Tick = i64;
/// Deterministic hash of a parameter set.
pub type Fingerprint = u64;
