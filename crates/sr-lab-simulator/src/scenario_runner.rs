use anyhow::{Context, anyhow};
use sr_lab_abstract::{
    Message, SimConfig, TestAction, TestAssertion, TestScenario, TransportProtocol,
};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::{SimulationReport, Simulator};

const DEFAULT_MAX_DURATION: u64 = 10_000;

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    parse_scenario(&content)
        .with_context(|| format!("Failed to parse scenario file {}", path.display()))
}

pub fn parse_scenario(content: &str) -> anyhow::Result<TestScenario> {
    let scenario: TestScenario = toml::from_str(content)?;
    scenario.arq.validate().context("Invalid [arq] section")?;
    Ok(scenario)
}

/// Build a simulator with the scenario's channel settings and actions applied.
pub fn build_simulator(
    scenario: &TestScenario,
    sender: Box<dyn TransportProtocol>,
    receiver: Box<dyn TransportProtocol>,
) -> anyhow::Result<Simulator> {
    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);
    config.validate().context("Invalid [config] section")?;

    let mut sim = Simulator::new(config, sender, receiver);

    // Configure actions (App sends, deterministic faults, etc.)
    for action in &scenario.actions {
        match action {
            TestAction::AppSend { time, data } => {
                let message = Message::from_text(data)
                    .with_context(|| format!("Invalid app_send data {data:?}"))?;
                sim.schedule_app_send(*time, message);
            }
            TestAction::MessageStream {
                start,
                count,
                mean_interval,
            } => sim.schedule_message_stream(*start, *count, *mean_interval),
            TestAction::DropNextFromSenderSeq { seq } => sim.add_drop_sender_seq_once(*seq),
            TestAction::DropNextFromReceiverAck { ack } => sim.add_drop_receiver_ack_once(*ack),
            TestAction::CorruptNextFromSenderSeq { seq } => sim.add_corrupt_sender_seq_once(*seq),
            TestAction::CorruptNextFromReceiverAck { ack } => {
                sim.add_corrupt_receiver_ack_once(*ack)
            }
        }
    }
    Ok(sim)
}

pub fn max_duration(scenario: &TestScenario) -> u64 {
    scenario
        .assertions
        .iter()
        .find_map(|a| match a {
            TestAssertion::MaxDuration { ms } => Some(*ms),
            _ => None,
        })
        .unwrap_or(DEFAULT_MAX_DURATION)
}

pub fn run_scenario(
    scenario: &TestScenario,
    sender: Box<dyn TransportProtocol>,
    receiver: Box<dyn TransportProtocol>,
) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    info!("Description: {}", scenario.description);

    let mut sim = build_simulator(scenario, sender, receiver)?;

    // Call init after we've configured the simulator
    sim.init();

    let deadline = max_duration(scenario);
    if !sim.run_until(deadline) {
        return Err(anyhow!("Test timed out after {} time units", deadline));
    }

    let report = sim.export_report();
    check_assertions(scenario, &report)?;
    info!("Test Scenario Passed!");
    Ok(report)
}

fn check_range(what: &str, value: u32, min: u32, max: Option<u32>) -> anyhow::Result<()> {
    if value < min {
        return Err(anyhow!(
            "Assertion Failed: {} was {}, expected min {}",
            what,
            value,
            min
        ));
    }
    if let Some(max) = max
        && value > max
    {
        return Err(anyhow!(
            "Assertion Failed: {} was {}, expected max {}",
            what,
            value,
            max
        ));
    }
    Ok(())
}

pub fn check_assertions(scenario: &TestScenario, report: &SimulationReport) -> anyhow::Result<()> {
    for assertion in &scenario.assertions {
        match assertion {
            TestAssertion::DataDelivered { data } => {
                let expected = Message::from_text(data)?;
                if !report.delivered_data.contains(&expected) {
                    return Err(anyhow!(
                        "Assertion Failed: Data {:?} was not delivered",
                        data
                    ));
                }
            }
            TestAssertion::InOrderDelivery => {
                if !report.delivered_in_order() {
                    return Err(anyhow!(
                        "Assertion Failed: delivered {:?}, accepted {:?}",
                        report.delivered_data,
                        report.accepted_messages
                    ));
                }
            }
            TestAssertion::SenderPacketCount { min, max } => {
                check_range("Sender frame count", report.sender_packet_count, *min, *max)?;
            }
            TestAssertion::RetransmissionCount { min, max } => {
                let count = report.retransmitted_seqs().len() as u32;
                check_range("Retransmission count", count, *min, *max)?;
            }
            TestAssertion::RetransmittedSeqs { seqs } => {
                let actual = report.retransmitted_seqs();
                if &actual != seqs {
                    return Err(anyhow!(
                        "Assertion Failed: retransmitted {:?}, expected {:?}",
                        actual,
                        seqs
                    ));
                }
            }
            TestAssertion::WindowFullDrops { min, max } => {
                check_range("Window-full drops", report.window_full_drops, *min, *max)?;
            }
            TestAssertion::MaxDuration { .. } => {} // Already checked
        }
    }
    Ok(())
}
