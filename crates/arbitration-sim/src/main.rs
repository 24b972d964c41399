use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use arbitration_metrics::ArbitrationMetrics;
use clap::Parser;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{error, info, Level};

mod scenario;

use scenario::{Action, Scenario};

#[derive(Debug, Parser)]
#[command(name = "arbitration-sim", about = "Daily carbon and nitrogen arbitration for one plant")]
struct Args {
    /// Scenario file (JSON).
    #[arg(long)]
    scenario: PathBuf,
    /// Overrides the scenario's day count.
    #[arg(long)]
    days: Option<u32>,
    #[arg(long, default_value = "info")]
    log_level: Level,
    #[arg(long)]
    json_logs: bool,
    /// Print Prometheus text exposition to stderr after the run.
    #[arg(long)]
    metrics: bool,
}

fn init_logging(args: &Args) {
    let builder = tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading scenario {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing scenario {}", path.display()))
}

fn run(args: &Args) -> Result<()> {
    let scenario = load_scenario(&args.scenario)?;
    let days = args.days.unwrap_or(scenario.days);

    let registry = Registry::new();
    let metrics = ArbitrationMetrics::new(&registry).context("registering metrics")?;

    let mut plant = scenario.build_plant().context("building plant")?;
    let mut soil = scenario.soil.clone();
    plant.sow(scenario.start)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    'days: for day in 1..=days {
        let date = scenario.date_of(day);
        for action in scenario.events_on(date) {
            match action {
                Action::Remove { organ, fractions } => {
                    let removed = plant.remove_biomass(organ, *fractions)?;
                    info!(%date, organ = organ.as_str(), removed, "removal scheduled");
                }
                Action::Harvest => {
                    plant.harvest()?;
                }
                Action::End => {
                    let shed = plant.end()?;
                    let residue: f64 = shed.iter().map(|(_, s)| s.wt()).sum();
                    info!(%date, residue, "crop ended");
                    break 'days;
                }
            }
        }

        let report = match plant.run_day(date, &mut soil) {
            Ok(report) => report,
            Err(err) => {
                error!(%date, plant = plant.name(), error = %err, "arbitration failed, halting run");
                bail!(err);
            }
        };
        metrics.observe(plant.name(), &report);
        serde_json::to_writer(&mut out, &report).context("writing daily report")?;
        writeln!(out)?;
    }
    out.flush()?;

    if args.metrics {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buf)
            .context("encoding metrics")?;
        io::stderr().write_all(&buf)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);
    info!(scenario = %args.scenario.display(), "starting run");
    run(&args)
}
