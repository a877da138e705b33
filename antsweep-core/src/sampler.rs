//! Execution of a single simulation run.

use rand::Rng;

use crate::engine::{Engine, TickRange};
use crate::error::Error;
use crate::params::ParameterSet;
use crate::result::RunResult;
use crate::state::{reporter_names, SimState};
use crate::{Fingerprint, Int, Result, RANDOM_SEED_LIMIT};

/// Seeds derived from fingerprints are folded into `[0, 2^31)`, the range
/// every engine accepts.
pub const SEED_MODULUS: u64 = 1 << 31;

/// Derives an engine seed from a parameter set fingerprint.
pub fn seed_from_fingerprint(fingerprint: Fingerprint) -> Int {
    (fingerprint % SEED_MODULUS) as Int
}

/// Picks the seed for a run.
///
/// Deterministic runs are seeded from the parameters' fingerprint, so equal
/// parameters always get equal seeds. Other runs get a fresh random seed.
pub fn resolve_seed(params: &ParameterSet, deterministic: bool) -> Int {
    if deterministic {
        seed_from_fingerprint(params.deterministic_hash())
    } else {
        rand::thread_rng().gen_range(0, RANDOM_SEED_LIMIT)
    }
}

/// Drives one run end-to-end against a single engine instance, sampling the
/// schema's measurement vector across a fixed tick range.
#[derive(Debug, Copy, Clone, Default)]
pub struct Sampler {
    pub ticks: TickRange,
}

impl Sampler {
    pub fn new(ticks: TickRange) -> Self {
        Self { ticks }
    }

    /// Executes exactly one run.
    ///
    /// Seeds the engine, applies the parameters, optionally tags the run
    /// with `run_tag`, sets up the world and samples every tick of the
    /// range. Any engine failure aborts the run. An empty tick range skips
    /// sampling and produces an empty result.
    pub fn sample<E: Engine + ?Sized>(
        &self,
        engine: &mut E,
        params: &ParameterSet,
        deterministic: bool,
        run_tag: Option<usize>,
    ) -> Result<RunResult> {
        self.ticks.validate()?;
        let seed = resolve_seed(params, deterministic);
        engine.command(&format!("random-seed {}", seed))?;
        params.apply_to_engine(engine)?;
        if let Some(tag) = run_tag {
            engine.command(&format!("set run-ix {}", tag))?;
        }
        engine.command("setup")?;

        let mut result = RunResult::new(params.clone(), seed, run_tag);
        if self.ticks.is_empty() {
            debug!("empty tick range {}, nothing to sample", self.ticks);
            return Ok(result);
        }

        let specs = params.schema().measures();
        let names = reporter_names(specs);
        let columns = engine.schedule_reporters(
            &names,
            self.ticks.start,
            self.ticks.stop,
            self.ticks.interval,
        )?;

        if columns.len() != names.len() {
            return Err(Error::ReporterShape(format!(
                "asked for {} reporters, got {} columns",
                names.len(),
                columns.len()
            )));
        }
        let expected = self.ticks.len();
        for (name, column) in names.iter().zip(columns.iter()) {
            if column.len() != expected {
                return Err(Error::ReporterShape(format!(
                    "reporter {} returned {} values for {} ticks",
                    name,
                    column.len(),
                    expected
                )));
            }
        }

        for (idx, tick) in self.ticks.ticks().enumerate() {
            let row: Vec<_> = columns.iter().map(|column| &column[idx]).collect();
            let state = SimState::from_row(tick, specs, &row)?;
            result.states.insert(tick, state);
        }
        trace!(
            "sampled {} ticks with seed {} (fingerprint {})",
            result.len(),
            seed,
            result.fingerprint()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::engine::synthetic::SyntheticEngine;
    use crate::engine::ReportValue;
    use crate::params::SchemaVersion;
    use crate::state::Measure;
    use crate::Tick;

    fn engine() -> SyntheticEngine {
        let mut engine = SyntheticEngine::new();
        engine.open_model(Path::new("ants.nlogo")).unwrap();
        engine
    }

    #[test]
    fn command_sequence() {
        let mut engine = engine();
        let params = ParameterSet::default_for(SchemaVersion::V1);
        let sampler = Sampler::new(TickRange::new(10, 100, 10).unwrap());
        let result = sampler.sample(&mut engine, &params, true, Some(3)).unwrap();

        let history = engine.history();
        assert_eq!(history[0], format!("random-seed {}", result.seed));
        assert!(history[1].starts_with("set food-evaporation"));
        let n = history.len();
        assert_eq!(history[n - 2], "set run-ix 3");
        assert_eq!(history[n - 1], "setup");
        assert_eq!(result.run_tag, Some(3));
    }

    #[test]
    fn cadence() {
        let mut engine = engine();
        let params = ParameterSet::default_for(SchemaVersion::V2);
        let sampler = Sampler::new(TickRange::new(10, 100, 10).unwrap());
        let result = sampler.sample(&mut engine, &params, true, None).unwrap();
        let ticks: Vec<Tick> = result.ticks().collect();
        assert_eq!(ticks, (1..10).map(|i| i * 10).collect::<Vec<_>>());
        for (pos, (tick, state)) in result.states.iter().enumerate() {
            assert_eq!(*tick, state.tick);
            assert_eq!(state.tick, 10 * (pos as Tick + 1));
            assert_eq!(state.measures.len(), SchemaVersion::V2.measures().len());
            assert!(matches!(state.measures[0], Measure::Int(_)));
            assert!(matches!(state.measures[2], Measure::Float(_)));
        }
    }

    #[test]
    fn deterministic_seed() {
        let params = ParameterSet::default_for(SchemaVersion::V1);
        assert_eq!(resolve_seed(&params, true), resolve_seed(&params, true));
        assert_eq!(
            resolve_seed(&params, true),
            seed_from_fingerprint(params.deterministic_hash())
        );
        let seed = resolve_seed(&params, false);
        assert!(seed >= 0 && seed < RANDOM_SEED_LIMIT);
    }

    #[test]
    fn empty_range() {
        let mut engine = engine();
        let params = ParameterSet::default_for(SchemaVersion::V1);
        let sampler = Sampler::new(TickRange::new(100, 100, 10).unwrap());
        let result = sampler.sample(&mut engine, &params, false, None).unwrap();
        assert!(result.is_empty());
    }

    struct ShortEngine;

    impl Engine for ShortEngine {
        fn open_model(&mut self, _: &Path) -> Result<()> {
            Ok(())
        }
        fn command(&mut self, _: &str) -> Result<()> {
            Ok(())
        }
        fn schedule_reporters(
            &mut self,
            names: &[&str],
            _: Tick,
            _: Tick,
            _: Tick,
        ) -> Result<Vec<Vec<ReportValue>>> {
            Ok(names.iter().map(|_| vec![ReportValue::Number(1.0)]).collect())
        }
    }

    #[test]
    fn short_columns_are_rejected() {
        let params = ParameterSet::default_for(SchemaVersion::V1);
        let sampler = Sampler::default();
        match sampler.sample(&mut ShortEngine, &params, true, None) {
            Err(Error::ReporterShape(_)) => (),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
