//! Results of a single simulation run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use linked_hash_map::LinkedHashMap;

use crate::params::ParameterSet;
use crate::reduce::write_record;
use crate::state::{MeasureSpec, SimState};
use crate::{Fingerprint, Int, Result, Tick};

/// Parameters used for a run paired with the time series it produced.
///
/// States are keyed by tick, in sampling order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub params: ParameterSet,
    /// Seed the engine was given
    pub seed: Int,
    /// Run index passed to the engine, multi-run mode only
    pub run_tag: Option<usize>,
    pub states: LinkedHashMap<Tick, SimState>,
}

impl RunResult {
    pub fn new(params: ParameterSet, seed: Int, run_tag: Option<usize>) -> Self {
        Self {
            params,
            seed,
            run_tag,
            states: LinkedHashMap::new(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.params.deterministic_hash()
    }

    /// Measurement vector this result's states follow.
    pub fn measures(&self) -> &'static [MeasureSpec] {
        self.params.schema().measures()
    }

    pub fn ticks(&self) -> impl Iterator<Item = Tick> + '_ {
        self.states.keys().copied()
    }

    pub fn get(&self, tick: Tick) -> Option<&SimState> {
        self.states.get(&tick)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Writes the time series as csv, one row per sampled tick.
    pub fn write_csv<W: Write>(&self, mut out: W) -> Result<()> {
        let specs = self.measures();
        let mut header = vec!["tick".to_string()];
        header.extend(specs.iter().map(|s| s.name.to_string()));
        write_record(&mut out, &header)?;
        for state in self.states.values() {
            let mut row = vec![state.tick.to_string()];
            row.extend(state.measures.iter().map(|m| m.to_string()));
            write_record(&mut out, &row)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Writes the time series as csv to the file at the given path.
    pub fn write_csv_at(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_csv(BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SchemaVersion;
    use crate::state::Measure;

    #[test]
    fn csv_time_series() {
        let mut result = RunResult::new(ParameterSet::default_for(SchemaVersion::V1), 42, None);
        for tick in &[10, 20] {
            result.states.insert(
                *tick,
                SimState {
                    tick: *tick,
                    measures: vec![Measure::Int(*tick); 5],
                },
            );
        }
        let mut buf = Vec::new();
        result.write_csv(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "tick,num_kills,num_coop,num_colonies,num_ants,num_food\n\
             10,10,10,10,10,10\n\
             20,20,20,20,20,20\n"
        );
        assert_eq!(result.ticks().collect::<Vec<_>>(), vec![10, 20]);
        assert_eq!(result.fingerprint(), result.params.deterministic_hash());
    }
}
