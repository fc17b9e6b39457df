use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use sr_lab_abstract::{ArqConfig, SimConfig, TransportProtocol};
use sr_lab_arq::{sr_receiver, sr_sender};
use sr_lab_simulator::{SimulationReport, Simulator, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Selective-repeat ARQ link simulator")]
struct Args {
    /// Load a scenario from disk instead of generating random traffic.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Number of application messages to generate.
    #[arg(long, default_value_t = 20)]
    messages: u32,

    /// Mean time between application messages.
    #[arg(long, default_value_t = 10)]
    interval: u64,

    /// Probability that a frame is lost.
    #[arg(long, default_value_t = 0.1)]
    loss: f64,

    /// Probability that a frame is corrupted.
    #[arg(long, default_value_t = 0.1)]
    corrupt: f64,

    #[arg(long, default_value_t = 1)]
    min_latency: u64,
    #[arg(long, default_value_t = 10)]
    max_latency: u64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Keep frames in send order within each direction.
    #[arg(long, default_value_t = false)]
    fifo: bool,

    #[arg(long, default_value_t = 8)]
    seq_space: u32,
    #[arg(long, default_value_t = 4)]
    window_size: u32,

    /// Retransmission timeout.
    #[arg(long, default_value_t = 25)]
    rtt: u64,

    /// Run a lossy channel even when the ring is smaller than twice the window.
    #[arg(long, default_value_t = false)]
    allow_ambiguous_ring: bool,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("sr-lab-sim starting…");

    let report = if let Some(path) = &args.scenario {
        let scenario = scenario_runner::load_scenario(path)?;
        let (sender, receiver) = build_pair(&scenario.arq)?;
        scenario_runner::run_scenario(&scenario, sender, receiver)?
    } else {
        let (sender, receiver) = build_pair(&args.arq_config())?;
        run_default_sim(&args, sender, receiver)?
    };

    log_summary(&report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

impl Args {
    fn arq_config(&self) -> ArqConfig {
        ArqConfig {
            seq_space: self.seq_space,
            window_size: self.window_size,
            rtt: self.rtt,
        }
    }

    fn sim_config(&self) -> SimConfig {
        SimConfig {
            loss_rate: self.loss,
            corrupt_rate: self.corrupt,
            min_latency: self.min_latency,
            max_latency: self.max_latency,
            seed: self.seed,
            fifo: self.fifo,
        }
    }
}

fn build_pair(
    arq: &ArqConfig,
) -> Result<(Box<dyn TransportProtocol>, Box<dyn TransportProtocol>)> {
    let sender = sr_sender(arq).context("Invalid ARQ configuration")?;
    let receiver = sr_receiver(arq).context("Invalid ARQ configuration")?;
    Ok((sender, receiver))
}

fn run_default_sim(
    args: &Args,
    sender: Box<dyn TransportProtocol>,
    receiver: Box<dyn TransportProtocol>,
) -> Result<SimulationReport> {
    let config = args.sim_config();
    config.validate().context("Invalid channel configuration")?;
    check_ring(&args.arq_config(), &config, args.allow_ambiguous_ring)?;

    let mut sim = Simulator::new(config, sender, receiver);
    sim.schedule_message_stream(0, args.messages, args.interval);

    info!(
        "Starting headless simulation of {} messages over {:?}",
        args.messages,
        sim.config()
    );
    sim.run_until_complete();
    info!("Simulation complete.");
    Ok(sim.export_report())
}

/// Refuse lossy runs where a stale retransmission could be taken for a new frame.
fn check_ring(arq: &ArqConfig, channel: &SimConfig, allow_ambiguous: bool) -> Result<()> {
    let lossy = channel.loss_rate > 0.0 || channel.corrupt_rate > 0.0;
    if lossy && !arq.is_unambiguous() && !allow_ambiguous {
        anyhow::bail!(
            "sequence space {} is smaller than twice the window {} on a lossy channel; \
             pass --allow-ambiguous-ring to run anyway",
            arq.seq_space,
            arq.window_size
        );
    }
    if arq.rtt <= channel.max_latency.saturating_mul(2) {
        warn!(
            "timeout {} does not cover a worst-case round trip of {}; expect early retransmissions",
            arq.rtt,
            channel.max_latency.saturating_mul(2)
        );
    }
    Ok(())
}

fn log_summary(report: &SimulationReport) {
    info!(
        "Messages accepted: {} | dropped (window full): {} | delivered: {}",
        report.accepted_messages.len(),
        report.window_full_drops,
        report.delivered_data.len()
    );
    info!(
        "Frames sent by sender: {} | retransmissions: {} | frames sent by receiver: {}",
        report.sender_packet_count,
        report.retransmitted_seqs().len(),
        report.receiver_packet_count
    );
    info!(
        "ACKs received: {} | new ACKs: {}",
        report.last_metric("acks_received").unwrap_or(0.0),
        report.last_metric("new_acks").unwrap_or(0.0)
    );
    info!("Duration: {} time units", report.duration);
    if !report.delivered_in_order() {
        warn!("Delivered data does not match the accepted messages in order");
    }
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lossy() -> SimConfig {
        SimConfig {
            loss_rate: 0.1,
            corrupt_rate: 0.1,
            ..Default::default()
        }
    }

    #[test]
    fn default_flags_pick_a_safe_ring() {
        let args = Args::parse_from(["sr-lab-sim"]);
        let arq = args.arq_config();
        assert!(arq.is_unambiguous());
        assert!(arq.rtt > 2 * args.max_latency);
        assert!(check_ring(&arq, &args.sim_config(), false).is_ok());
    }

    #[test]
    fn ambiguous_ring_needs_opt_in_on_lossy_channel() {
        let classic = ArqConfig {
            seq_space: 7,
            window_size: 6,
            rtt: 16,
        };
        let err = check_ring(&classic, &lossy(), false).unwrap_err();
        assert!(err.to_string().contains("--allow-ambiguous-ring"));
        assert!(check_ring(&classic, &lossy(), true).is_ok());
        assert!(check_ring(&classic, &SimConfig::default(), false).is_ok());
    }

    #[test]
    fn default_random_run_delivers_in_order() {
        for seed in 0..20 {
            let seed = seed.to_string();
            let args = Args::parse_from(["sr-lab-sim", "--seed", seed.as_str()]);
            let (sender, receiver) = build_pair(&args.arq_config()).unwrap();
            let report = run_default_sim(&args, sender, receiver).unwrap();
            assert!(report.delivered_in_order(), "seed {seed}");
        }
    }
}
