// Copyright 2021 Siemens AG
// SPDX-License-Identifier: MIT

use fmurun::loader::Package;
use fmurun::output::{ResultWriter, RowKind, RESULT_FILE};
use fmurun::runtime::InstanceConfig;
use fmu_base::types::{ExecutionMode, StepOutcome};

use anyhow::Result;
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use std::path::{Path, PathBuf};


#[derive(Debug, StructOpt)]
#[structopt(name = "fmusim", about = "Simulates a FMI 2.0 co-simulation package and writes result.csv")]
struct Opt {
    /// Path of the package (.fmu)
    #[structopt(parse(from_os_str))]
    package: PathBuf,
    /// Simulation end time
    #[structopt(parse(try_from_str = parse_non_negative), default_value = "1.0")]
    end_time: f64,
    /// Communication step size
    #[structopt(parse(try_from_str = parse_positive), default_value = "0.1")]
    step_size: f64,
    /// Debug logging of the model, 0 or 1
    #[structopt(parse(try_from_str = parse_logging_flag), default_value = "0")]
    logging_on: bool,
    /// Column separator: `c` for comma, `s` for semicolon or a single character
    #[structopt(parse(try_from_str = parse_separator), default_value = "c")]
    separator: char,
    /// Log categories to enable
    categories: Vec<String>
}

fn parse_non_negative(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.is_finite() => Ok(v),
        _ => Err(format!("`{}` is not a non-negative number", s)),
    }
}

fn parse_positive(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if v > 0.0 && v.is_finite() => Ok(v),
        _ => Err(format!("`{}` is not a positive number", s)),
    }
}

fn parse_logging_flag(s: &str) -> Result<bool, String> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(format!("logging flag must be 0 or 1, got `{}`", s)),
    }
}

fn parse_separator(s: &str) -> Result<char, String> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some('c'), None) => Ok(','),
        (Some('s'), None) => Ok(';'),
        (Some(c), None) if c.is_ascii() => Ok(c),
        _ => Err(format!("separator must be c, s or a single character, got `{}`", s)),
    }
}


fn main() -> Result<()> {

    let opt = Opt::from_args();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if opt.logging_on { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("FMU Simulator: run '{}' from t=0..{} with step size h={}, loggingOn={}, csv separator='{}'",
        opt.package.display(), opt.end_time, opt.step_size, opt.logging_on as u8, opt.separator);
    if !opt.categories.is_empty() {
        println!("log categories={{ {} }}", opt.categories.join(", "));
    }

    let package = Package::load(&opt.package, ExecutionMode::CoSimulation)?;
    let md = package.model_description();

    let config = InstanceConfig {
        logging_on: opt.logging_on,
        categories: opt.categories.clone(),
        end_time: Some(opt.end_time),
        step_size: opt.step_size,
        ..Default::default()
    };

    let mut inst = package.instantiate(config)?;
    inst.initialize()?;

    let mut writer = ResultWriter::create(Path::new(RESULT_FILE), opt.separator)?;
    writer.write_row(RowKind::Header, &inst, md, inst.time())?;
    writer.write_row(RowKind::Values, &inst, md, inst.time())?;

    loop {
        match inst.advance()? {
            StepOutcome::Advanced { time } => writer.write_row(RowKind::Values, &inst, md, time)?,
            StepOutcome::TerminationRequested => {
                info!("{} requested to terminate at t={}", md.model.name, inst.time());
                break;
            },
            StepOutcome::EndReached => break,
        }
    }

    writer.flush()?;
    inst.terminate()?;

    println!("Simulation from 0 to {} terminated successful", inst.time());
    println!("  steps ............ {}", inst.step_count());
    println!("  fixed step size .. {}", opt.step_size);
    println!("CSV file '{}' written", RESULT_FILE);

    Ok(())
}
