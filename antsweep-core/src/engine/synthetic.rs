//! In-process stand-in for a real simulation engine.

use std::hash::Hasher;
use std::path::{Path, PathBuf};

use fnv::{FnvHashMap, FnvHasher};

use super::{Engine, EngineFactory, ReportValue};
use crate::error::Error;
use crate::{Float, Int, Result, Tick};

/// Engine producing deterministic pseudo-random reporter values.
///
/// Understands the same command vocabulary the sweep machinery uses
/// (`random-seed`, `set`, `setup`) and rejects anything else. Reported
/// values are derived from the seed, the configured globals, the reporter
/// name and the tick, so two runs with the same seed and parameters yield
/// identical data.
///
/// Reporters named `num-*` yield integral values, all others yield
/// fractional ones.
#[derive(Debug, Default)]
pub struct SyntheticEngine {
    model: Option<PathBuf>,
    seed: Int,
    globals: FnvHashMap<String, String>,
    /// Digest of the globals taken at setup
    world: Option<u64>,
    history: Vec<String>,
}

impl SyntheticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command issued so far, in order.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Currently set seed.
    pub fn seed(&self) -> Int {
        self.seed
    }

    /// Value of a global as set with the `set` command.
    pub fn global(&self, name: &str) -> Option<&str> {
        self.globals.get(name).map(|s| s.as_str())
    }

    pub fn model(&self) -> Option<&Path> {
        self.model.as_deref()
    }

    fn reject(command: &str, message: &str) -> Error {
        Error::EngineCommand {
            command: command.to_string(),
            message: message.to_string(),
        }
    }

    fn value(&self, world: u64, reporter: &str, tick: Tick) -> ReportValue {
        let mut hasher = FnvHasher::default();
        hasher.write_u64(world);
        hasher.write_i64(self.seed);
        hasher.write(reporter.as_bytes());
        hasher.write_i64(tick);
        let h = hasher.finish();
        if reporter.starts_with("num-") {
            ReportValue::Number((h % 500) as Float)
        } else {
            ReportValue::Number((h % 1_000_000) as Float / 1000.0)
        }
    }
}

impl Engine for SyntheticEngine {
    fn open_model(&mut self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(Self::reject("open-model", "empty model path"));
        }
        self.model = Some(path.to_path_buf());
        Ok(())
    }

    fn command(&mut self, text: &str) -> Result<()> {
        self.history.push(text.to_string());
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.as_slice() {
            ["random-seed", seed] => {
                self.seed = seed
                    .parse()
                    .map_err(|_| Self::reject(text, "seed must be an integer"))?;
            }
            ["set", name, value] => {
                self.globals.insert(name.to_string(), value.to_string());
            }
            ["setup"] => {
                if self.model.is_none() {
                    return Err(Self::reject(text, "no model opened"));
                }
                let mut names: Vec<&String> = self.globals.keys().collect();
                names.sort();
                let mut hasher = FnvHasher::default();
                for name in names {
                    hasher.write(name.as_bytes());
                    hasher.write(self.globals[name].as_bytes());
                }
                self.world = Some(hasher.finish());
            }
            [] => return Err(Self::reject(text, "empty command")),
            [name, ..] => {
                return Err(Self::reject(
                    text,
                    &format!("nothing named {} has been defined", name.to_uppercase()),
                ))
            }
        }
        Ok(())
    }

    fn schedule_reporters(
        &mut self,
        names: &[&str],
        start: Tick,
        stop: Tick,
        interval: Tick,
    ) -> Result<Vec<Vec<ReportValue>>> {
        let described = format!("schedule-reporters {:?}", names);
        let world = self
            .world
            .ok_or_else(|| Self::reject(&described, "setup has not been run"))?;
        if interval <= 0 {
            return Err(Self::reject(&described, "interval must be positive"));
        }
        let ticks: Vec<Tick> = (start..stop.max(start)).step_by(interval as usize).collect();
        Ok(names
            .iter()
            .map(|name| ticks.iter().map(|t| self.value(world, name, *t)).collect())
            .collect())
    }
}

/// Creates fresh [`SyntheticEngine`]s.
///
/// [`SyntheticEngine`]: struct.SyntheticEngine.html
#[derive(Debug, Copy, Clone, Default)]
pub struct SyntheticEngineFactory;

impl EngineFactory for SyntheticEngineFactory {
    type Engine = SyntheticEngine;

    fn create(&self) -> Result<SyntheticEngine> {
        Ok(SyntheticEngine::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_engine(seed: Int) -> SyntheticEngine {
        let mut engine = SyntheticEngine::new();
        engine.open_model(Path::new("model.nlogo")).unwrap();
        engine.command(&format!("random-seed {}", seed)).unwrap();
        engine.command("set food-val 2.0").unwrap();
        engine.command("setup").unwrap();
        engine
    }

    #[test]
    fn same_seed_same_data() {
        let a = ready_engine(7)
            .schedule_reporters(&["num-ants", "mean-colony-energy"], 0, 50, 5)
            .unwrap();
        let b = ready_engine(7)
            .schedule_reporters(&["num-ants", "mean-colony-energy"], 0, 50, 5)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].len(), 10);
        assert!(a[0].iter().all(|v| v.as_int().is_some()));
    }

    #[test]
    fn different_seed_different_data() {
        let a = ready_engine(1).schedule_reporters(&["num-ants"], 0, 100, 1).unwrap();
        let b = ready_engine(2).schedule_reporters(&["num-ants"], 0, 100, 1).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_unknown_commands() {
        let mut engine = ready_engine(1);
        match engine.command("go-fishing now") {
            Err(Error::EngineCommand { message, .. }) => assert!(message.contains("GO-FISHING")),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(engine.command("random-seed abc").is_err());
    }

    #[test]
    fn reporting_requires_setup() {
        let mut engine = SyntheticEngine::new();
        engine.open_model(Path::new("model.nlogo")).unwrap();
        assert!(engine.schedule_reporters(&["num-ants"], 0, 10, 1).is_err());
        assert!(SyntheticEngine::new().command("setup").is_err());
    }
}
