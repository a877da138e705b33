//! Sampled simulation state.

use std::fmt;

use crate::engine::ReportValue;
use crate::error::Error;
use crate::{Float, Int, Result, Tick};

/// Type of a measurement column.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MeasureKind {
    Int,
    Float,
}

/// Definition of a single measurement: column name, the engine reporter it's
/// sampled from, and its type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MeasureSpec {
    pub name: &'static str,
    pub reporter: &'static str,
    pub kind: MeasureKind,
}

const fn int(name: &'static str, reporter: &'static str) -> MeasureSpec {
    MeasureSpec {
        name,
        reporter,
        kind: MeasureKind::Int,
    }
}

const fn float(name: &'static str, reporter: &'static str) -> MeasureSpec {
    MeasureSpec {
        name,
        reporter,
        kind: MeasureKind::Float,
    }
}

/// Raw counts sampled from the colony model.
pub const V1_MEASURES: &[MeasureSpec] = &[
    int("num_kills", "num-kills"),
    int("num_coop", "num-coop"),
    int("num_colonies", "num-queens"),
    int("num_ants", "num-ants"),
    int("num_food", "num-food"),
];

/// Counts and min/avg/max aggregates sampled from the competition model.
pub const V2_MEASURES: &[MeasureSpec] = &[
    int("num_colonies", "num-colonies"),
    int("num_ants", "num-ants"),
    float("min_colony_energy", "min-colony-energy"),
    float("avg_colony_energy", "mean-colony-energy"),
    float("max_colony_energy", "max-colony-energy"),
    float("min_colony_size", "min-colony-size"),
    float("avg_colony_size", "mean-colony-size"),
    float("max_colony_size", "max-colony-size"),
    float("min_colony_age", "min-colony-age"),
    float("avg_colony_age", "mean-colony-age"),
    float("max_colony_age", "max-colony-age"),
];

/// Reporter names of the given measurement vector, in order.
pub fn reporter_names(specs: &[MeasureSpec]) -> Vec<&'static str> {
    specs.iter().map(|s| s.reporter).collect()
}

/// Single typed measurement value.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum Measure {
    Int(Int),
    Float(Float),
}

impl Measure {
    /// Coerces a reporter value into a measurement of the given spec.
    pub fn from_report(spec: &MeasureSpec, value: &ReportValue) -> Result<Self> {
        let measure = match spec.kind {
            MeasureKind::Int => value.as_int().map(Measure::Int),
            MeasureKind::Float => value.as_float().map(Measure::Float),
        };
        measure.ok_or_else(|| Error::ReporterValue {
            reporter: spec.reporter.to_string(),
            value: value.to_string(),
        })
    }

    pub fn as_float(&self) -> Float {
        match self {
            Measure::Int(i) => *i as Float,
            Measure::Float(f) => *f,
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Int(i) => write!(f, "{}", i),
            Measure::Float(v) => write!(f, "{:?}", v),
        }
    }
}

/// One sampled observation of the simulation.
///
/// Measurements are stored in the order of the schema's measurement vector,
/// see [`SchemaVersion::measures`].
///
/// [`SchemaVersion::measures`]: ../params/enum.SchemaVersion.html#method.measures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    pub tick: Tick,
    pub measures: Vec<Measure>,
}

impl SimState {
    /// Builds a state from one row of reporter values, coercing each value
    /// according to its spec.
    pub fn from_row(tick: Tick, specs: &[MeasureSpec], row: &[&ReportValue]) -> Result<Self> {
        if specs.len() != row.len() {
            return Err(Error::ReporterShape(format!(
                "expected {} values at tick {}, got {}",
                specs.len(),
                tick,
                row.len()
            )));
        }
        let measures = specs
            .iter()
            .zip(row.iter())
            .map(|(spec, value)| Measure::from_report(spec, value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { tick, measures })
    }

    /// Gets a measurement by name.
    pub fn get(&self, specs: &[MeasureSpec], name: &str) -> Option<Measure> {
        specs
            .iter()
            .position(|s| s.name == name)
            .and_then(|idx| self.measures.get(idx).copied())
    }
}
