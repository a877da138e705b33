mod common;

use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use antsweep_core::snapshot::read_snapshot;
use antsweep_core::sweep::read_failures;
use antsweep_core::{Error, RunFailure, Sweep, SyntheticEngineFactory};

use common::*;

const MANIFEST: &str = r#"
schema = "v1"
model = "ants.nlogo"
multi_run = true
workers = 2
output_dir = "results"
raw_output_dir = "raw"

[ticks]
start = 0
stop = 50
interval = 10

[[runs]]
repeat = 2
[runs.params]
initial_ants = 80

[[runs]]
[runs.params]
initial_ants = 13
food_val = 1.5
"#;

#[test]
fn sweep_end_to_end() {
    setup_log();
    let dir = temp_dir("sweep-e2e");
    let manifest = dir.join("sweep.toml");
    fs::write(&manifest, MANIFEST).unwrap();
    fs::create_dir(dir.join("raw")).unwrap();
    fs::write(
        dir.join("raw").join("0.out"),
        "[0 \"scent-1\" 10.5 1.0 2.0 ]]]\n[10 \"scent-1\" 9.5 1.5 2.5 ]]]\n",
    )
    .unwrap();
    // malformed, reduction fails without leaving output behind
    fs::write(dir.join("raw").join("1.out"), "[0 1 2]]]]\n").unwrap();

    let sweep = Sweep::from_path(&manifest).unwrap();
    assert_eq!(sweep.params.len(), 3);
    assert!(sweep.model.ends_with("ants.nlogo"));

    let report = sweep
        .execute(ScriptedFactory::default(), Arc::new(AtomicBool::new(true)))
        .unwrap();
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert!(!report.is_success());
    assert!(report.batch_dir.starts_with(&sweep.output_dir));

    let batch = &report.batch_dir;
    assert!(batch.join("run_0.csv").is_file());
    assert!(batch.join("run_1.csv").is_file());
    assert!(!batch.join("run_2.csv").exists());
    assert_eq!(report.exports.len(), 2);
    assert_eq!(report.failed_exports(), 0);
    let series = fs::read_to_string(batch.join("run_0.csv")).unwrap();
    assert_eq!(series.lines().count(), 6);
    assert!(series.starts_with("tick,num_kills,num_coop,num_colonies,num_ants,num_food\n0,"));

    let reduced = fs::read_to_string(batch.join("0.csv")).unwrap();
    assert_eq!(
        reduced,
        "tick,scent_id,energy,x,y,\n0,scent-1,10.5,1.0,2.0\n10,scent-1,9.5,1.5,2.5\n"
    );
    assert!(!batch.join("1.csv").exists());
    assert_eq!(report.reductions.len(), 2);
    assert_eq!(report.failed_reductions(), 1);
    match &report.reductions[1] {
        (1, Err(Error::MalformedLine { line: 1, .. })) => (),
        other => panic!("unexpected: {:?}", other),
    }

    let results = read_snapshot(&batch.join("results.snapshot")).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].run_tag, Some(0));
    assert_eq!(results[1].run_tag, Some(1));
    assert_eq!(results[0].params, sweep.params[0]);

    let failures = read_failures(batch).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 2);
    assert_eq!(failures[0].params["initial_ants"], "13");
    assert_eq!(failures[0].params["food_val"], "1.5");
    assert_eq!(
        failures[0].fingerprint,
        format!("{:016x}", sweep.params[2].deterministic_hash())
    );
    match &report.outcomes[2] {
        Err(e) => assert!(matches!(e.failure, RunFailure::Engine(_))),
        Ok(_) => panic!("expected failure"),
    }

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn batches_get_distinct_directories() {
    let dir = temp_dir("sweep-batches");
    let manifest = dir.join("sweep.toml");
    fs::write(
        &manifest,
        "schema = \"v2\"\nmodel = \"m.nlogo\"\n[[runs]]\nrepeat = 1\n",
    )
    .unwrap();
    let sweep = Sweep::from_path(&manifest).unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let first = sweep
        .execute(SyntheticEngineFactory, running.clone())
        .unwrap();
    let second = sweep
        .execute(SyntheticEngineFactory, running)
        .unwrap();
    assert_ne!(first.batch_dir, second.batch_dir);
    assert!(first.is_success() && second.is_success());
    assert!(!first.batch_dir.join("failures.toml").exists());
    assert_eq!(read_snapshot(&second.batch_dir.join("results.snapshot")).unwrap().len(), 1);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_engine_command_is_a_configuration_error() {
    let dir = temp_dir("sweep-engine");
    let manifest = dir.join("sweep.toml");
    fs::write(&manifest, "schema = \"v1\"\n").unwrap();
    let sweep = Sweep::from_path(&manifest).unwrap();
    assert!(matches!(sweep.engine_factory(), Err(Error::Configuration { .. })));
    fs::remove_dir_all(&dir).unwrap();
}
