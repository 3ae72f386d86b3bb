#![deny(warnings)]

//! Headless runner: simulates a population and prints the final summary.

use anyhow::{bail, Context, Result};
use runway_core::SimParams;
use runway_engine::{run, ExecOptions, StorageKind};
use std::fmt::Display;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_N: usize = 2_000_000;
const DEFAULT_MONTHS: u32 = 24;
const DEFAULT_CHUNK: usize = 500_000;
const DEFAULT_SAMPLE: usize = 200_000;

#[derive(Debug, PartialEq)]
struct CliArgs {
    n: usize,
    months: Option<u32>,
    chunk: Option<usize>,
    sample: Option<usize>,
    memmap: bool,
    memmap_dir: PathBuf,
    config: Option<PathBuf>,
    progress_every: u32,
    parallel: bool,
    out: Option<PathBuf>,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            n: DEFAULT_N,
            months: None,
            chunk: None,
            sample: None,
            memmap: false,
            memmap_dir: PathBuf::from("sim_mem"),
            config: None,
            progress_every: 6,
            parallel: false,
            out: None,
        }
    }
}

fn next_value(flag: &str, value: Option<String>) -> Result<String> {
    value.with_context(|| format!("{flag} expects a value"))
}

/// Numbers may use `_` separators, e.g. `100_000_000`.
fn parse_number<T>(flag: &str, value: Option<String>) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = next_value(flag, value)?;
    raw.replace('_', "")
        .parse()
        .map_err(|e| anyhow::anyhow!("{flag} {raw}: {e}"))
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--n" | "--N" => cli.n = parse_number(&arg, it.next())?,
            "--months" => cli.months = Some(parse_number(&arg, it.next())?),
            "--chunk" => cli.chunk = Some(parse_number(&arg, it.next())?),
            "--sample" => cli.sample = Some(parse_number(&arg, it.next())?),
            "--memmap" => cli.memmap = true,
            "--memmap-dir" => cli.memmap_dir = next_value(&arg, it.next())?.into(),
            "--config" => cli.config = Some(next_value(&arg, it.next())?.into()),
            "--progress-every" => cli.progress_every = parse_number(&arg, it.next())?,
            "--parallel" => cli.parallel = true,
            "--out" => cli.out = Some(next_value(&arg, it.next())?.into()),
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(cli)
}

/// Parameters from the config file (or defaults), with explicit flags on top.
fn build_params(cli: &CliArgs) -> Result<SimParams> {
    let mut params = match &cli.config {
        Some(path) => SimParams::from_yaml_file(path)
            .with_context(|| format!("loading parameters from {}", path.display()))?,
        None => SimParams {
            months: DEFAULT_MONTHS,
            chunk_size: DEFAULT_CHUNK,
            sample_size: DEFAULT_SAMPLE,
            ..SimParams::default()
        },
    };
    if let Some(months) = cli.months {
        params.months = months;
    }
    if let Some(chunk) = cli.chunk {
        params.chunk_size = chunk;
    }
    if let Some(sample) = cli.sample {
        params.sample_size = sample;
    }
    Ok(params)
}

fn exec_options(cli: &CliArgs) -> ExecOptions {
    let storage = if cli.memmap {
        StorageKind::FileMapped {
            dir: cli.memmap_dir.clone(),
        }
    } else {
        StorageKind::Resident
    };
    ExecOptions {
        storage,
        progress_every: cli.progress_every,
        parallel: cli.parallel,
        keep_population: false,
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = parse_args(std::env::args().skip(1))?;
    let params = build_params(&cli)?;
    info!(n = cli.n, months = params.months, memmap = cli.memmap, "starting run");

    let out = run(cli.n, params, exec_options(&cli))?;

    if let Some(path) = &cli.out {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &out.series)?;
    }

    let Some(summary) = out.summary() else {
        bail!("run recorded no months");
    };
    println!("\n=== FINAL ===");
    println!("N: {}  months: {}", summary.population, summary.months);
    println!(
        "Exited: {}  ({:.2}% over horizon)",
        summary.exited, summary.exited_pct
    );
    println!("Unemployment rate (end): {:.3}", summary.unemployment_rate);
    println!(
        "Median runway (end, sample): {:.2} months",
        summary.median_runway
    );
    println!(
        "Final effective job-slot ratio: {:.3}",
        summary.final_effective_job_slot_ratio
    );
    if let Some(path) = &cli.out {
        println!("Saved series to: {}", path.display());
    }
    Ok(())
}
