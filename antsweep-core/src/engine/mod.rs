//! Boundary with the external simulation engine.
//!
//! The engine is an opaque collaborator: it can load a model, accept
//! imperative commands, and report named values at scheduled ticks. This
//! module only defines that contract, plus a couple of implementations.
//!
//! # Ownership
//!
//! Engine instances hold exclusive mutable world state. They are never
//! shared between runs executing at the same time, which is why [`Engine`]
//! doesn't require `Send`. Instead an [`EngineFactory`] is shared between
//! workers and each worker creates its own instance.
//!
//! [`Engine`]: trait.Engine.html
//! [`EngineFactory`]: trait.EngineFactory.html

pub mod process;
pub mod synthetic;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::Error;
use crate::{Float, Int, Result, Tick};

/// Control and reporting interface of a single simulation engine instance.
pub trait Engine {
    /// Loads a simulation definition from the given path.
    fn open_model(&mut self, path: &Path) -> Result<()>;

    /// Issues an imperative instruction, e.g. `random-seed 42`,
    /// `set food-val 2.0` or `setup`.
    fn command(&mut self, text: &str) -> Result<()>;

    /// Runs the simulation sampling each of the named reporters at every
    /// tick of `[start, stop)`, stepping by `interval`.
    ///
    /// Returns one sequence of values per reporter name, each aligned 1:1
    /// with the implied tick sequence.
    fn schedule_reporters(
        &mut self,
        names: &[&str],
        start: Tick,
        stop: Tick,
        interval: Tick,
    ) -> Result<Vec<Vec<ReportValue>>>;

    /// Handle able to forcibly stop this engine from another thread, if
    /// the engine supports it.
    fn terminate_handle(&self) -> Option<TerminateHandle> {
        None
    }
}

/// Forcibly stops an engine that's blocked in the middle of a request.
///
/// After termination every pending and future request of the engine fails.
pub trait Terminate: Send + Sync {
    fn terminate(&self);
}

pub type TerminateHandle = Arc<dyn Terminate>;

/// Creates engine instances on demand.
///
/// Factories are shared between worker threads, while the engines they
/// create stay with the worker that created them.
pub trait EngineFactory: Send + Sync {
    type Engine: Engine;

    fn create(&self) -> Result<Self::Engine>;
}

impl<E, F> EngineFactory for F
where
    E: Engine,
    F: Fn() -> Result<E> + Send + Sync,
{
    type Engine = E;

    fn create(&self) -> Result<E> {
        (self)()
    }
}

/// Single value returned by an engine reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportValue {
    Number(Float),
    Bool(bool),
    Text(String),
}

impl ReportValue {
    /// Coerces the value to an integer.
    ///
    /// Engines often report every number as a double, so integral floats
    /// like `12.0` are accepted.
    pub fn as_int(&self) -> Option<Int> {
        match self {
            ReportValue::Number(n) => float_to_int(*n),
            ReportValue::Text(s) => {
                let s = s.trim();
                match s.parse::<Int>() {
                    Ok(i) => Some(i),
                    Err(_) => s.parse::<Float>().ok().and_then(float_to_int),
                }
            }
            ReportValue::Bool(_) => None,
        }
    }

    /// Coerces the value to a finite float.
    pub fn as_float(&self) -> Option<Float> {
        let f = match self {
            ReportValue::Number(n) => *n,
            ReportValue::Text(s) => s.trim().parse::<Float>().ok()?,
            ReportValue::Bool(_) => return None,
        };
        if f.is_finite() {
            Some(f)
        } else {
            None
        }
    }
}

fn float_to_int(f: Float) -> Option<Int> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < Int::MAX as Float {
        Some(f as Int)
    } else {
        None
    }
}

impl fmt::Display for ReportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportValue::Number(n) => write!(f, "{}", n),
            ReportValue::Bool(b) => write!(f, "{}", b),
            ReportValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<Float> for ReportValue {
    fn from(n: Float) -> Self {
        ReportValue::Number(n)
    }
}

impl From<&str> for ReportValue {
    fn from(s: &str) -> Self {
        ReportValue::Text(s.to_string())
    }
}

/// Half-open range of ticks `[start, stop)` sampled every `interval` ticks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickRange {
    pub start: Tick,
    pub stop: Tick,
    pub interval: Tick,
}

impl Default for TickRange {
    fn default() -> Self {
        Self {
            start: crate::DEFAULT_TICK_START,
            stop: crate::DEFAULT_TICK_STOP,
            interval: crate::DEFAULT_TICK_INTERVAL,
        }
    }
}

impl TickRange {
    /// Creates a new tick range. Interval has to be a positive number.
    pub fn new(start: Tick, stop: Tick, interval: Tick) -> Result<Self> {
        let range = Self {
            start,
            stop,
            interval,
        };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval <= 0 {
            return Err(Error::config(
                "interval",
                &self.interval.to_string(),
                "tick interval must be positive",
            ));
        }
        if self.stop > self.start && self.stop.checked_sub(self.start).is_none() {
            return Err(Error::config(
                "stop",
                &self.stop.to_string(),
                format!("tick range starting at {} is too wide", self.start),
            ));
        }
        Ok(())
    }

    /// Iterates over all the sampled ticks, in order.
    pub fn ticks(&self) -> impl Iterator<Item = Tick> {
        let (start, stop) = (self.start, self.stop);
        let step = self.interval.max(1) as usize;
        (start..stop.max(start)).step_by(step)
    }

    /// Number of sampled ticks.
    pub fn len(&self) -> usize {
        if self.stop <= self.start || self.interval <= 0 {
            return 0;
        }
        // widened so that unvalidated extreme ranges can't overflow
        let span = self.stop as i128 - self.start as i128;
        ((span - 1) / self.interval as i128 + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, tick: Tick) -> bool {
        tick >= self.start
            && tick < self.stop
            && self.interval > 0
            && (tick - self.start) % self.interval == 0
    }
}

impl fmt::Display for TickRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}) every {}", self.start, self.stop, self.interval)
    }
}
