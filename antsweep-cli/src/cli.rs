//! Application definition.

extern crate simplelog;

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Error, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;

use antsweep::reduce;
use antsweep::sampler::seed_from_fingerprint;
use antsweep::{ParamDict, ParameterSet, SchemaVersion, Sweep, SyntheticEngineFactory};

use crate::init;
use crate::util;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");

pub fn app<'a, 'b>() -> App<'a, 'b> {
    let app = App::new("antsweep")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .version(VERSION)
        .author(AUTHORS)
        .about("Run parameter sweeps over ant colony simulations and reduce their output.")
        .arg(Arg::with_name("verbosity")
            .long("verbosity")
            .short("v")
            .takes_value(true)
            .default_value("info")
            .value_name("verb")
            .global(true)
            .help("Set the verbosity of the log output"))

        // new subcommand
        .subcommand(SubCommand::with_name("new")
            .display_order(10)
            .about("Create new sweep manifest")
            .arg(Arg::with_name("path")
                .required(true)
                .value_name("path")
                .help("Path to the new manifest, or to a directory to put it in"))
            .arg(Arg::with_name("schema")
                .possible_values(&["v1", "v2"])
                .takes_value(true)
                .default_value("v1")
                .help("Parameter schema version")
                .long("schema")
                .short("s"))
            .arg(Arg::with_name("template")
                .possible_values(&["commented", "bare"])
                .takes_value(true)
                .default_value("commented")
                .help("Init with a template")
                .long("template")
                .short("t")))

        // run subcommand
        .subcommand(SubCommand::with_name("run")
            .display_order(20)
            .about("Execute a sweep described by a manifest")
            .arg(Arg::with_name("path")
                .value_name("path")
                .default_value("./")
                .help("Path to the sweep manifest, or a directory containing sweep.toml"))
            .arg(Arg::with_name("dry-run")
                .long("dry-run")
                .help("Use the built-in synthetic engine instead of the configured one"))
            .arg(Arg::with_name("engine")
                .long("engine")
                .short("e")
                .takes_value(true)
                .value_name("command")
                .help("Override the engine command line"))
            .arg(Arg::with_name("workers")
                .long("workers")
                .short("w")
                .takes_value(true)
                .value_name("n")
                .help("Number of parallel workers, 0 means available parallelism"))
            .arg(Arg::with_name("timeout")
                .long("timeout")
                .takes_value(true)
                .value_name("secs")
                .help("Per-run timeout in seconds, 0 disables it"))
            .arg(Arg::with_name("nondeterministic")
                .long("nondeterministic")
                .help("Seed every run at random instead of from its parameters"))
            .arg(Arg::with_name("only")
                .long("only")
                .takes_value(true)
                .multiple(true)
                .use_delimiter(true)
                .value_name("index")
                .help("Only execute runs with the given indices")))

        // reduce subcommand
        .subcommand(SubCommand::with_name("reduce")
            .display_order(30)
            .about("Reduce raw engine output into csv")
            .arg(Arg::with_name("input")
                .required(true)
                .value_name("input")
                .help("Raw output file, or a directory to reduce every .out file in"))
            .arg(Arg::with_name("output")
                .long("output")
                .short("o")
                .takes_value(true)
                .value_name("path")
                .help("Output file, or output directory when reducing a directory")))

        // params subcommand
        .subcommand(SubCommand::with_name("params")
            .display_order(40)
            .about("Print parameters of a schema along with their fingerprint")
            .arg(Arg::with_name("schema")
                .possible_values(&["v1", "v2"])
                .takes_value(true)
                .default_value("v1")
                .long("schema")
                .short("s"))
            .arg(Arg::with_name("set")
                .long("set")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .value_name("name=value")
                .help("Override a parameter value")));

    app
}

pub fn app_matches() -> ArgMatches<'static> {
    app().get_matches()
}

/// Runs based on specified subcommand.
pub fn start(matches: ArgMatches) -> Result<()> {
    match matches.subcommand() {
        ("new", Some(m)) => start_new(m),
        ("run", Some(m)) => start_run(m),
        ("reduce", Some(m)) => start_reduce(m),
        ("params", Some(m)) => start_params(m),
        _ => Ok(()),
    }
}

fn schema_arg(matches: &ArgMatches) -> Result<SchemaVersion> {
    Ok(matches.value_of("schema").unwrap_or("v1").parse()?)
}

fn start_new(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .value_of("path")
        .ok_or_else(|| Error::msg("path argument missing"))?;
    let template = matches.value_of("template").unwrap_or("commented");
    let created = init::init_at_path(Path::new(path), schema_arg(matches)?, template)?;
    println!(
        "{} {}",
        "Created sweep manifest at".green(),
        created.to_string_lossy()
    );
    Ok(())
}

fn start_run(matches: &ArgMatches) -> Result<()> {
    setup_log_verbosity(matches);
    let path = util::resolve_manifest_path(&current_dir_join(
        matches.value_of("path").unwrap_or("./"),
    )?)?;
    let mut sweep = Sweep::from_path(&path)?;

    if let Some(engine) = matches.value_of("engine") {
        sweep.engine = Some(engine.to_string());
    }
    if let Some(workers) = matches.value_of("workers") {
        sweep.workers = workers.parse()?;
    }
    if let Some(timeout) = matches.value_of("timeout") {
        sweep.run_timeout = match timeout.parse::<u64>()? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
    }
    if matches.is_present("nondeterministic") {
        sweep.deterministic = false;
    }

    let mut jobs = sweep.jobs();
    if let Some(only) = matches.values_of("only") {
        let selected = only
            .map(|s| s.trim().parse::<usize>())
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        jobs.retain(|job| selected.contains(&job.index));
        if jobs.is_empty() {
            return Err(Error::msg(format!(
                "none of the selected runs exist, sweep has {} runs",
                sweep.params.len()
            )));
        }
    }

    // Ctrl-C skips runs that haven't started yet
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let report = if matches.is_present("dry-run") {
        info!("dry run, using synthetic engine");
        sweep.execute_jobs(SyntheticEngineFactory, jobs, running)?
    } else {
        sweep.execute_jobs(sweep.engine_factory()?, jobs, running)?
    };

    util::print_report(&report);
    if !report.is_success() {
        return Err(Error::msg(format!(
            "{} runs, {} time series exports and {} reductions failed, see {}",
            report.failed(),
            report.failed_exports(),
            report.failed_reductions(),
            report.batch_dir.to_string_lossy()
        )));
    }
    Ok(())
}

fn start_reduce(matches: &ArgMatches) -> Result<()> {
    setup_log_verbosity(matches);
    let input = current_dir_join(
        matches
            .value_of("input")
            .ok_or_else(|| Error::msg("input argument missing"))?,
    )?;
    let output = match matches.value_of("output") {
        Some(o) => Some(current_dir_join(o)?),
        None => None,
    };

    if input.is_dir() {
        let out_dir = output.unwrap_or_else(|| input.clone());
        let results = reduce::reduce_dir(&input, &out_dir)?;
        let mut failed = 0;
        for (file, result) in &results {
            match result {
                Ok(out) => println!("{} -> {}", file.to_string_lossy(), out.to_string_lossy()),
                Err(e) => {
                    failed += 1;
                    println!("{} {}: {}", "failed".red(), file.to_string_lossy(), e);
                }
            }
        }
        if failed > 0 {
            return Err(Error::msg(format!(
                "failed reducing {} of {} files",
                failed,
                results.len()
            )));
        }
        println!("{} {} files", "Reduced".green(), results.len());
    } else {
        let out = output.unwrap_or_else(|| input.with_extension("csv"));
        let rows = reduce::reduce_file(&input, &out)?;
        println!(
            "{} {} rows into {}",
            "Reduced".green(),
            rows,
            out.to_string_lossy()
        );
    }
    Ok(())
}

fn start_params(matches: &ArgMatches) -> Result<()> {
    setup_log_verbosity(matches);
    let schema = schema_arg(matches)?;
    let mut dict = ParamDict::new();
    if let Some(overrides) = matches.values_of("set") {
        for pair in overrides {
            let (name, value) = util::split_assignment(pair)?;
            dict.insert(name, value);
        }
    }
    let params = ParameterSet::from_dict(schema, &dict)?;
    println!("{} {}", "schema:".cyan(), schema);
    for (name, value) in params.as_dict() {
        let marker = if dict.contains_key(&name) { "*" } else { " " };
        println!("{} {} = {}", marker, name, value);
    }
    let fingerprint = params.deterministic_hash();
    println!("{} {:016x}", "fingerprint:".cyan(), fingerprint);
    println!("{} {}", "seed:".cyan(), seed_from_fingerprint(fingerprint));
    Ok(())
}

/// Resolves a relative path against the current working directory.
fn current_dir_join(path: &str) -> Result<PathBuf> {
    let p = PathBuf::from(path);
    let path = if p.is_relative() {
        env::current_dir()?.join(p)
    } else {
        p
    };
    Ok(path.canonicalize().unwrap_or(path))
}

fn setup_log_verbosity(matches: &ArgMatches) {
    use self::simplelog::{LevelFilter, TermLogger};
    let level_filter = match matches.value_of("verbosity") {
        Some(s) => match s {
            "0" | "none" => LevelFilter::Off,
            "1" | "err" | "error" | "min" => LevelFilter::Error,
            "2" | "warn" | "warning" | "default" => LevelFilter::Warn,
            "3" | "info" => LevelFilter::Info,
            "4" | "debug" => LevelFilter::Debug,
            "5" | "trace" | "max" | "all" => LevelFilter::Trace,
            _ => LevelFilter::Warn,
        },
        _ => LevelFilter::Warn,
    };
    let mut config_builder = simplelog::ConfigBuilder::new();
    let logger_conf = config_builder
        .set_time_level(LevelFilter::Error)
        .set_target_level(LevelFilter::Debug)
        .set_location_level(LevelFilter::Error)
        .set_time_format_str("%H:%M:%S%.6f")
        .build();
    let _ = TermLogger::init(level_filter, logger_conf, simplelog::TerminalMode::Mixed);
}
