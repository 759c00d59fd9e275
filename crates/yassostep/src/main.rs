use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use yasso_core::engine::{Control, RunOutput, SimulationEngine};
use yasso_core::io::frame::{progress_frame, summary_frame};
use yasso_core::io::report::{write_moments, write_raw, ResultType};
use yasso_core::params::ParameterEnsemble;
use yasso_core::phase::RunKind;
use yasso_core::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(
    name = "yassostep",
    about = "Batch runner for Yasso soil carbon scenarios"
)]
struct Args {
    /// Path to the scenario JSON document.
    #[arg(long, value_name = "PATH")]
    scenario: PathBuf,

    /// Whitespace-separated parameter ensemble, one row per sample draw.
    #[arg(long, value_name = "PATH")]
    parameters: PathBuf,

    /// Override the scenario's parameter set (Yasso07, Yasso15, Yasso20).
    #[arg(long = "parameter-set", value_name = "NAME")]
    parameter_set: Option<String>,

    /// Override the scenario's sample size.
    #[arg(long, value_name = "COUNT")]
    samples: Option<usize>,

    /// Override the run seed.
    #[arg(long, value_name = "NUMBER", conflicts_with = "seed_phrase")]
    seed: Option<u64>,

    /// Derive the run seed from a phrase instead of a number.
    #[arg(long = "seed-phrase", value_name = "TEXT", conflicts_with = "seed")]
    seed_phrase: Option<String>,

    /// Which raw table to export: stock, change or co2.
    #[arg(long = "result-type", default_value = "stock")]
    result_type: ResultType,

    /// Output path for the raw result table.
    #[arg(long)]
    out: PathBuf,

    /// Optional output path for the moment table of the same result type.
    #[arg(long, value_name = "PATH")]
    moments: Option<PathBuf>,

    /// Optional path to emit per-sample progress and the run summary as NDJSON.
    #[arg(long, value_name = "PATH")]
    frames: Option<PathBuf>,
}

impl Args {
    fn apply_overrides(&self, scenario: &mut Scenario) {
        if let Some(name) = &self.parameter_set {
            scenario.run.parameter_set = name.clone();
        }
        if let Some(samples) = self.samples {
            scenario.run.sample_size = samples;
        }
        if let Some(seed) = self.seed {
            scenario.run.seed = Some(seed);
            scenario.run.seed_phrase = None;
        }
        if let Some(phrase) = &self.seed_phrase {
            scenario.run.seed_phrase = Some(phrase.clone());
        }
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    Ok(BufWriter::new(file))
}

fn execute(args: &Args) -> Result<RunOutput> {
    let mut scenario = Scenario::load_from_path(&args.scenario)
        .with_context(|| format!("failed to read scenario {:?}", args.scenario))?;
    args.apply_overrides(&mut scenario);
    let ensemble = ParameterEnsemble::load_from_path(&args.parameters)
        .with_context(|| format!("failed to read parameters {:?}", args.parameters))?;
    let engine = SimulationEngine::for_parameter_set(&scenario, &ensemble)?;

    let mut frame_writer = args.frames.as_deref().map(create).transpose()?;
    let mut frame_error = None;
    let mut progress = |kind: RunKind, sample: usize, total: usize| {
        if let Some(writer) = frame_writer.as_mut() {
            let written = progress_frame(kind, sample, total)
                .to_ndjson()
                .map_err(anyhow::Error::from)
                .and_then(|line| Ok(writer.write_all(line.as_bytes())?));
            if let Err(err) = written {
                frame_error = Some(err);
                return Control::Cancel;
            }
        }
        Control::Continue
    };
    let output = engine.simulate(&mut progress)?;
    if let Some(err) = frame_error {
        return Err(err.context("failed to write progress frame"));
    }

    let datafile = args.parameters.display().to_string();
    let mut raw = create(&args.out)?;
    write_raw(&mut raw, args.result_type, &scenario, &datafile, &output.tables)?;
    raw.flush()?;
    if let Some(path) = &args.moments {
        let mut writer = create(path)?;
        write_moments(&mut writer, args.result_type, &scenario, &datafile, &output.moments)?;
        writer.flush()?;
    }
    if let Some(writer) = frame_writer.as_mut() {
        writer.write_all(summary_frame(&output).to_ndjson()?.as_bytes())?;
        writer.flush()?;
    }
    Ok(output)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    let output = execute(&args)?;
    if output.status.is_completed() {
        info!(
            rows = output.tables.stock.len(),
            out = ?args.out,
            "run complete"
        );
    } else {
        warn!(status = ?output.status, "run ended early; partial results written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::fs;
    use std::path::PathBuf;

    use super::{execute, Args};
    use clap::{error::ErrorKind, Parser};
    use yasso_core::io::report::ResultType;

    const DEMO_SCENARIO: &str = include_str!("../../yasso_core/data/demo_scenario.json");
    const DEMO_PARAMETERS: &str = include_str!("../../yasso_core/data/yasso15_demo.dat");

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("yassostep-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    #[test]
    fn requires_scenario_and_parameters() {
        let err = Args::try_parse_from(["yassostep", "--out", "stock.txt"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_both_seed_flags() {
        let err = Args::try_parse_from([
            "yassostep",
            "--scenario",
            "plot.json",
            "--parameters",
            "yasso15.dat",
            "--out",
            "stock.txt",
            "--seed",
            "1",
            "--seed-phrase",
            "spruce",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_result_type() {
        let args = Args::try_parse_from([
            "yassostep",
            "--scenario",
            "plot.json",
            "--parameters",
            "yasso15.dat",
            "--out",
            "co2.txt",
            "--result-type",
            "co2",
        ])
        .expect("args parse");
        assert_eq!(args.result_type, ResultType::Co2);

        let err = Args::try_parse_from([
            "yassostep",
            "--scenario",
            "plot.json",
            "--parameters",
            "yasso15.dat",
            "--out",
            "x.txt",
            "--result-type",
            "flux",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn paired_runs_write_identical_files() {
        let dir = scratch("determinism");
        let scenario = dir.join("scenario.json");
        let parameters = dir.join("yasso15.dat");
        fs::write(&scenario, DEMO_SCENARIO).expect("write scenario");
        fs::write(&parameters, DEMO_PARAMETERS).expect("write parameters");

        let run_once = |tag: &str| {
            let out = dir.join(format!("stock-{tag}.txt"));
            let moments = dir.join(format!("moments-{tag}.txt"));
            let frames = dir.join(format!("frames-{tag}.ndjson"));
            let mut argv: Vec<OsString> = vec!["yassostep".into()];
            for (flag, value) in [
                ("--scenario", &scenario),
                ("--parameters", &parameters),
                ("--out", &out),
                ("--moments", &moments),
                ("--frames", &frames),
            ] {
                argv.push(flag.into());
                argv.push(value.clone().into_os_string());
            }
            argv.push("--samples".into());
            argv.push("4".into());
            let args = Args::try_parse_from(argv).expect("args parse");
            let output = execute(&args).expect("run succeeds");
            assert!(output.status.is_completed());
            (
                fs::read_to_string(out).expect("raw output"),
                fs::read_to_string(moments).expect("moment output"),
                fs::read_to_string(frames).expect("frame output"),
            )
        };

        let first = run_once("a");
        let second = run_once("b");
        assert_eq!(first, second);

        let (raw, moments, frames) = first;
        let raw_rows = raw.lines().filter(|l| !l.starts_with('#')).count();
        assert_eq!(raw_rows, 4 * 6);
        assert!(moments.lines().any(|l| l.starts_with("humus ")));
        assert!(raw.contains("# Scenario: hyytiala_spruce"));

        let lines: Vec<&str> = frames.lines().collect();
        assert_eq!(lines.len(), 5);
        let last: serde_json::Value = serde_json::from_str(lines[4]).expect("summary json");
        assert_eq!(last["kind"], "summary");
        assert_eq!(last["status"], "completed");

        fs::remove_dir_all(dir).ok();
    }
}
