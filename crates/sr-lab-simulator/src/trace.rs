use serde::Serialize;
use std::collections::HashMap;
use sr_lab_abstract::{Message, SimConfig};

use crate::engine::LinkEventSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration: u64,
    pub accepted_messages: Vec<Message>,
    pub window_full_drops: u32,
    pub delivered_data: Vec<Message>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,
}

impl SimulationReport {
    /// Final value of a metric series, if it was ever recorded.
    pub fn last_metric(&self, name: &str) -> Option<f64> {
        self.metrics
            .get(name)
            .and_then(|series| series.last())
            .map(|&(_, value)| value)
    }

    /// Sequence numbers retransmitted on timeout, in order.
    pub fn retransmitted_seqs(&self) -> Vec<i32> {
        self.metrics
            .get("retransmit_seq")
            .map(|series| series.iter().map(|&(_, seq)| seq as i32).collect())
            .unwrap_or_default()
    }

    /// Whether the application saw exactly the accepted messages, in order.
    pub fn delivered_in_order(&self) -> bool {
        self.delivered_data == self.accepted_messages
    }
}
