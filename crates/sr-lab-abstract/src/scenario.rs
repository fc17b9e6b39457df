use crate::config::{ArqConfig, SimConfig};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default)]
    pub arq: ArqConfig,
    pub actions: Vec<TestAction>,
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub seed: Option<u64>,
    pub fifo: Option<bool>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.corrupt_rate {
            config.corrupt_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.fifo {
            config.fifo = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Application sends data at a specific time
    AppSend { time: u64, data: String },
    /// Application sends `count` generated messages starting at `start`
    MessageStream {
        start: u64,
        count: u32,
        mean_interval: u64,
    },
    /// Deterministically drop the first frame sent by Sender with given seq number
    DropNextFromSenderSeq { seq: i32 },
    /// Deterministically drop the first ACK sent by Receiver with given ack number
    DropNextFromReceiverAck { ack: i32 },
    /// Deterministically damage the payload of the first frame sent by Sender with given seq number
    CorruptNextFromSenderSeq { seq: i32 },
    /// Deterministically damage the payload of the first ACK sent by Receiver with given ack number
    CorruptNextFromReceiverAck { ack: i32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Assert that specific data was delivered to the application layer
    DataDelivered { data: String },
    /// Assert that every accepted message was delivered exactly once, in submission order
    InOrderDelivery,
    /// Assert that the total number of frames sent by Sender is within range
    SenderPacketCount { min: u32, max: Option<u32> },
    /// Assert that the number of timeout retransmissions is within range
    RetransmissionCount { min: u32, max: Option<u32> },
    /// Assert the exact sequence numbers retransmitted, in order
    RetransmittedSeqs { seqs: Vec<i32> },
    /// Assert how many messages were rejected because the window was full
    WindowFullDrops { min: u32, max: Option<u32> },
    /// Assert that simulation finishes within time
    MaxDuration { ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scenario_with_defaults() {
        let scenario: TestScenario = toml::from_str(
            r#"
            name = "lost frame"
            description = "seq 2 is lost once"

            [config]
            max_latency = 5

            [[actions]]
            type = "app_send"
            time = 0
            data = "hello"

            [[actions]]
            type = "drop_next_from_sender_seq"
            seq = 2

            [[assertions]]
            type = "in_order_delivery"

            [[assertions]]
            type = "retransmitted_seqs"
            seqs = [2]
            "#,
        )
        .unwrap();

        assert_eq!(scenario.arq, ArqConfig::default());
        assert_eq!(scenario.actions.len(), 2);
        assert!(matches!(
            scenario.assertions[1],
            TestAssertion::RetransmittedSeqs { ref seqs } if seqs == &[2]
        ));

        let mut config = SimConfig::default();
        scenario.config.apply_to(&mut config);
        assert_eq!(config.max_latency, 5);
        assert_eq!(config.min_latency, 1);
    }
}
