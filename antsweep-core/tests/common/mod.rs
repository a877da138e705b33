//! Engine wrappers and helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use antsweep_core::{
    Engine, EngineFactory, Error, ParamDict, ParameterSet, ReportValue, Result, SchemaVersion,
    SyntheticEngine, Tick,
};

/// `initial_ants` value making setup fail.
pub const FAIL_SETUP: i64 = 13;
/// `initial_ants` value making setup panic.
pub const PANIC_SETUP: i64 = 666;
/// `initial_ants` value making reporter scheduling hang for a long while.
pub const HANG: i64 = 999;
/// `initial_ants` values from this one up delay reporter scheduling by the
/// excess in milliseconds.
pub const DELAY_BASE: i64 = 1000;

/// Synthetic engine misbehaving on request, driven by the `initial-ants`
/// global.
pub struct ScriptedEngine {
    inner: SyntheticEngine,
}

impl ScriptedEngine {
    fn ants(&self) -> i64 {
        self.inner
            .global("initial-ants")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

impl Engine for ScriptedEngine {
    fn open_model(&mut self, path: &Path) -> Result<()> {
        self.inner.open_model(path)
    }

    fn command(&mut self, text: &str) -> Result<()> {
        if text == "setup" {
            match self.ants() {
                FAIL_SETUP => {
                    return Err(Error::EngineCommand {
                        command: text.to_string(),
                        message: "colony collapsed".to_string(),
                    })
                }
                PANIC_SETUP => panic!("engine blew up"),
                _ => (),
            }
        }
        self.inner.command(text)
    }

    fn schedule_reporters(
        &mut self,
        names: &[&str],
        start: Tick,
        stop: Tick,
        interval: Tick,
    ) -> Result<Vec<Vec<ReportValue>>> {
        match self.ants() {
            HANG => thread::sleep(Duration::from_secs(3)),
            n if n > DELAY_BASE => thread::sleep(Duration::from_millis((n - DELAY_BASE) as u64)),
            _ => (),
        }
        self.inner.schedule_reporters(names, start, stop, interval)
    }
}

/// Factory counting created engines.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    pub created: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl EngineFactory for ScriptedFactory {
    type Engine = ScriptedEngine;

    fn create(&self) -> Result<ScriptedEngine> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedEngine {
            inner: SyntheticEngine::new(),
        })
    }
}

/// V1 parameter set with the given `initial_ants`.
pub fn ants(n: i64) -> ParameterSet {
    let mut dict = ParamDict::new();
    dict.insert("initial_ants".to_string(), n.to_string());
    ParameterSet::from_dict(SchemaVersion::V1, &dict).unwrap()
}

/// Fresh empty directory under the system temp dir.
pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("antsweep-{}-{}", name, std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn setup_log() {
    let _ = simplelog::TestLogger::init(simplelog::LevelFilter::Debug, simplelog::Config::default());
}
