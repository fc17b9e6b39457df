use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use sr_lab_arq::{sr_receiver, sr_sender};
use sr_lab_simulator::{SimulationReport, scenario_runner};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless grader for selective-repeat scenarios")]
struct Args {
    /// Scenario TOML files to execute.
    #[arg(required = true)]
    scenarios: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("sr-lab-eval-host starting...");

    let mut failed = Vec::new();
    for path in &args.scenarios {
        match run_one(path) {
            Ok(report) => log_summary(&report),
            Err(err) => {
                error!("{}: {:#}", path.display(), err);
                failed.push(path.display().to_string());
            }
        }
    }

    info!(
        "{} of {} scenarios passed",
        args.scenarios.len() - failed.len(),
        args.scenarios.len()
    );
    if !failed.is_empty() {
        anyhow::bail!("Failed scenarios: {}", failed.join(", "));
    }
    Ok(())
}

fn run_one(path: &Path) -> Result<SimulationReport> {
    let scenario = scenario_runner::load_scenario(path)?;
    let sender = sr_sender(&scenario.arq).context("Invalid ARQ configuration")?;
    let receiver = sr_receiver(&scenario.arq).context("Invalid ARQ configuration")?;
    scenario_runner::run_scenario(&scenario, sender, receiver)
}

fn log_summary(report: &SimulationReport) {
    info!(
        "Simulation duration: {} | frames sent: {} | retransmissions: {} | deliveries: {}",
        report.duration,
        report.sender_packet_count,
        report.retransmitted_seqs().len(),
        report.delivered_data.len()
    );
}
