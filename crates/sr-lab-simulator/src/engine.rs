use crate::trace::SimulationReport;
use rand::Rng;
use serde::Serialize;
use sr_lab_abstract::{Frame, Message, SimConfig, SubmitError};
use sr_lab_abstract::{SystemContext, TransportProtocol};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tracing::{debug, info};

/// Value the channel writes into a damaged `seqnum` / `acknum` field.
const GARBLED_FIELD: i32 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(&self) -> Self {
        match self {
            NodeId::Sender => NodeId::Receiver,
            NodeId::Receiver => NodeId::Sender,
        }
    }
}

#[derive(Debug)]
pub enum EventType {
    FrameArrival { to: NodeId, frame: Frame },
    TimerExpiry { node: NodeId, generation: u64 },
    AppSend { message: Message },
}

#[derive(Debug)]
struct Event {
    time: u64,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A compact textual summary of important link-layer events.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

#[derive(Debug, Clone, Copy)]
enum TimerCommand {
    Start(u64),
    Stop,
}

/// Actions buffered during one protocol callback
#[derive(Default)]
struct ActionBuffer {
    outgoing_frames: Vec<Frame>,
    // Only the last command of a callback matters: there is one timer per node.
    timer: Option<TimerCommand>,
    logs: Vec<String>,
    delivered_data: Vec<Message>,
    metrics: Vec<(String, f64)>,
}

/// Context implementation passed to a protocol role
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    now: u64,
}

impl<'a> SystemContext for ScopedContext<'a> {
    fn send_frame(&mut self, frame: Frame) {
        self.buffer.outgoing_frames.push(frame);
    }

    fn start_timer(&mut self, delay: u64) {
        self.buffer.timer = Some(TimerCommand::Start(delay));
    }

    fn stop_timer(&mut self) {
        self.buffer.timer = Some(TimerCommand::Stop);
    }

    fn deliver_data(&mut self, message: &Message) {
        self.buffer.delivered_data.push(*message);
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.metrics.push((name.to_string(), value));
    }
}

/// Per-node timer bookkeeping. Expiry events carry the generation they were
/// scheduled under; any later start/stop makes them stale.
#[derive(Debug, Default, Clone, Copy)]
struct TimerSlot {
    generation: u64,
    deadline: Option<u64>,
}

/// One-shot fault keyed by the frame field the channel looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Drop,
    Corrupt,
}

pub struct Simulator {
    time: u64,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,

    config: SimConfig,
    rng: rand::rngs::StdRng,

    pub sender: Box<dyn TransportProtocol>,
    pub receiver: Box<dyn TransportProtocol>,

    // Stats for Grader
    pub accepted_messages: Vec<Message>,
    pub window_full_drops: u32,
    pub delivered_data: Vec<Message>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,

    /// Time-series metrics recorded via `SystemContext::record_metric`
    /// Key: metric name (e.g., "outstanding"), Value: Vec<(time, value)>
    pub metrics: HashMap<String, Vec<(u64, f64)>>,

    // Deterministic fault injection on the first sender frame with a given seq
    sender_seq_faults: Vec<(i32, Fault)>,
    // Deterministic fault injection on the first receiver ACK with a given ack number
    receiver_ack_faults: Vec<(i32, Fault)>,

    /// Timeline of link events (drops, corruptions, sends, deliveries).
    pub link_events: Vec<LinkEventSummary>,

    timers: HashMap<NodeId, TimerSlot>,
    /// Latest scheduled arrival per destination, used in FIFO mode.
    last_arrival: HashMap<NodeId, u64>,
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        sender: Box<dyn TransportProtocol>,
        receiver: Box<dyn TransportProtocol>,
    ) -> Self {
        use rand::SeedableRng;
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);

        Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            config,
            rng,
            sender,
            receiver,
            accepted_messages: Vec::new(),
            window_full_drops: 0,
            delivered_data: Vec::new(),
            sender_packet_count: 0,
            receiver_packet_count: 0,
            metrics: HashMap::new(),
            sender_seq_faults: Vec::new(),
            receiver_ack_faults: Vec::new(),
            link_events: Vec::new(),
            timers: HashMap::new(),
            last_arrival: HashMap::new(),
        }
    }

    /// Register a deterministic fault: drop the first frame sent by Sender whose seq equals `seq`.
    pub fn add_drop_sender_seq_once(&mut self, seq: i32) {
        self.sender_seq_faults.push((seq, Fault::Drop));
    }

    /// Register a deterministic fault: drop the first ACK sent by Receiver whose ack equals `ack`.
    pub fn add_drop_receiver_ack_once(&mut self, ack: i32) {
        self.receiver_ack_faults.push((ack, Fault::Drop));
    }

    /// Register a deterministic fault: damage the first frame sent by Sender whose seq equals `seq`.
    pub fn add_corrupt_sender_seq_once(&mut self, seq: i32) {
        self.sender_seq_faults.push((seq, Fault::Corrupt));
    }

    /// Register a deterministic fault: damage the first ACK sent by Receiver whose ack equals `ack`.
    pub fn add_corrupt_receiver_ack_once(&mut self, ack: i32) {
        self.receiver_ack_faults.push((ack, Fault::Corrupt));
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Return a slice of (time, value) samples for a named metric, if present.
    pub fn metric_series(&self, name: &str) -> Option<&[(u64, f64)]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    /// Whether `node` currently has an armed timer.
    pub fn is_timer_armed(&self, node: NodeId) -> bool {
        self.timers
            .get(&node)
            .is_some_and(|slot| slot.deadline.is_some())
    }

    fn push_event(&mut self, time: u64, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    pub fn schedule_app_send(&mut self, time: u64, message: Message) {
        self.push_event(time, EventType::AppSend { message });
    }

    /// Schedule `count` generated messages starting at `start`.
    pub fn schedule_message_stream(&mut self, start: u64, count: u32, mean_interval: u64) {
        let times = crate::workload::arrival_times(&mut self.rng, start, count, mean_interval);
        for (index, time) in times.into_iter().enumerate() {
            self.schedule_app_send(time, crate::workload::nth_message(index));
        }
    }

    pub fn init(&mut self) {
        for node in [NodeId::Sender, NodeId::Receiver] {
            let mut buffer = ActionBuffer::default();
            {
                let mut ctx = ScopedContext {
                    buffer: &mut buffer,
                    now: self.time,
                };
                self.protocol(node).init(&mut ctx);
            }
            self.process_actions(node, buffer);
        }
    }

    pub fn peek_next_event_time(&self) -> Option<u64> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn current_time(&self) -> u64 {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    fn protocol(&mut self, node: NodeId) -> &mut dyn TransportProtocol {
        match node {
            NodeId::Sender => self.sender.as_mut(),
            NodeId::Receiver => self.receiver.as_mut(),
        }
    }

    /// Process the next event. Returns true if an event was processed, false if queue is empty.
    pub fn step(&mut self) -> bool {
        let event = match self.event_queue.pop() {
            Some(e) => e,
            None => return false,
        };

        self.time = event.time;
        debug!("Processing event at {}: {:?}", self.time, event.event_type);

        match event.event_type {
            EventType::FrameArrival { to, frame } => {
                let mut buffer = ActionBuffer::default();
                {
                    let mut ctx = ScopedContext {
                        buffer: &mut buffer,
                        now: self.time,
                    };
                    self.protocol(to).on_frame(&mut ctx, frame);
                }
                self.process_actions(to, buffer);
            }
            EventType::TimerExpiry { node, generation } => {
                let slot = self.timers.entry(node).or_default();
                if slot.generation != generation {
                    debug!("Skipping stale timer event for {:?}", node);
                    return true; // Event processed (by being ignored)
                }
                slot.deadline = None;

                let mut buffer = ActionBuffer::default();
                {
                    let mut ctx = ScopedContext {
                        buffer: &mut buffer,
                        now: self.time,
                    };
                    self.protocol(node).on_timer(&mut ctx);
                }
                self.process_actions(node, buffer);
            }
            EventType::AppSend { message } => {
                let mut buffer = ActionBuffer::default();
                let result = {
                    let mut ctx = ScopedContext {
                        buffer: &mut buffer,
                        now: self.time,
                    };
                    self.sender.on_app_data(&mut ctx, message)
                };
                match result {
                    Ok(()) => self.accepted_messages.push(message),
                    Err(err @ SubmitError::WindowFull { .. }) => {
                        self.window_full_drops += 1;
                        self.link_events.push(LinkEventSummary {
                            time: self.time,
                            description: format!("[Sender] APP DROP {message:?}: {err}"),
                        });
                    }
                    Err(err) => debug!("Sender refused application data: {err}"),
                }
                self.process_actions(NodeId::Sender, buffer);
            }
        }
        true
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            duration: self.time,
            accepted_messages: self.accepted_messages.clone(),
            window_full_drops: self.window_full_drops,
            delivered_data: self.delivered_data.clone(),
            sender_packet_count: self.sender_packet_count,
            receiver_packet_count: self.receiver_packet_count,
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    pub fn run_until_complete(&mut self) {
        self.init();
        while self.step() {}
    }

    /// Step until the queue drains or the next event lies past `deadline`.
    /// Returns true when the queue drained.
    pub fn run_until(&mut self, deadline: u64) -> bool {
        while let Some(next) = self.peek_next_event_time() {
            if next > deadline {
                return false;
            }
            self.step();
        }
        true
    }

    fn process_actions(&mut self, source_node: NodeId, buffer: ActionBuffer) {
        for (name, value) in buffer.metrics {
            self.metrics
                .entry(name)
                .or_default()
                .push((self.time, value));
        }

        for log in buffer.logs {
            info!("[{:?}] {}", source_node, log);
        }

        for message in buffer.delivered_data {
            info!("[{:?}] DELIVERED {:?}", source_node, message);
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!("[{source_node:?}] DELIVERED {message:?} to application"),
            });
            self.delivered_data.push(message);
        }

        if let Some(command) = buffer.timer {
            self.apply_timer(source_node, command);
        }

        for frame in buffer.outgoing_frames {
            self.transmit(source_node, frame);
        }
    }

    fn apply_timer(&mut self, node: NodeId, command: TimerCommand) {
        let slot = self.timers.entry(node).or_default();
        // Any command supersedes whatever was armed before.
        slot.generation += 1;
        match command {
            TimerCommand::Stop => slot.deadline = None,
            TimerCommand::Start(delay) => {
                let deadline = self.time.saturating_add(delay);
                slot.deadline = Some(deadline);
                let generation = slot.generation;
                self.push_event(deadline, EventType::TimerExpiry { node, generation });
            }
        }
    }

    fn take_fault(&mut self, source_node: NodeId, frame: &Frame) -> Option<Fault> {
        let (faults, key) = match source_node {
            NodeId::Sender => (&mut self.sender_seq_faults, frame.seqnum),
            NodeId::Receiver => (&mut self.receiver_ack_faults, frame.acknum),
        };
        let pos = faults.iter().position(|(k, _)| *k == key)?;
        Some(faults.remove(pos).1)
    }

    /// Channel: deterministic faults, random loss, random corruption, latency.
    fn transmit(&mut self, source_node: NodeId, mut frame: Frame) {
        let target_node = source_node.peer();
        match source_node {
            NodeId::Sender => self.sender_packet_count += 1,
            NodeId::Receiver => self.receiver_packet_count += 1,
        }

        match self.take_fault(source_node, &frame) {
            Some(Fault::Drop) => {
                self.link_events.push(LinkEventSummary {
                    time: self.time,
                    description: format!(
                        "[{source_node:?}->{target_node:?}] DROP (deterministic) seq={} ack={}",
                        frame.seqnum, frame.acknum
                    ),
                });
                debug!("Deterministically dropping {:?} frame {:?}", source_node, frame);
                return;
            }
            Some(Fault::Corrupt) => {
                self.link_events.push(LinkEventSummary {
                    time: self.time,
                    description: format!(
                        "[{source_node:?}->{target_node:?}] CORRUPT (deterministic) seq={} ack={}",
                        frame.seqnum, frame.acknum
                    ),
                });
                frame.payload.0[0] ^= 0xFF;
            }
            None => {}
        }

        // 1. Check Loss
        if self.rng.random::<f64>() < self.config.loss_rate {
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{source_node:?}->{target_node:?}] DROP (random loss) seq={} ack={}",
                    frame.seqnum, frame.acknum
                ),
            });
            debug!("Frame lost in channel");
            return;
        }

        // 2. Check Corruption
        if self.rng.random::<f64>() < self.config.corrupt_rate {
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{source_node:?}->{target_node:?}] CORRUPT seq={} ack={}",
                    frame.seqnum, frame.acknum
                ),
            });
            debug!("Frame corrupted in channel");
            self.garble(&mut frame);
        }

        // 3. Calculate Latency
        let latency = self
            .rng
            .random_range(self.config.min_latency..=self.config.max_latency);
        let mut arrival_time = self.time.saturating_add(latency);
        if self.config.fifo {
            let last = self.last_arrival.entry(target_node).or_insert(0);
            arrival_time = arrival_time.max(*last);
            *last = arrival_time;
        }

        self.link_events.push(LinkEventSummary {
            time: self.time,
            description: format!(
                "[{:?}->{:?}] SEND seq={} ack={} (arrives at {})",
                source_node, target_node, frame.seqnum, frame.acknum, arrival_time
            ),
        });

        self.push_event(
            arrival_time,
            EventType::FrameArrival {
                to: target_node,
                frame,
            },
        );
    }

    /// Damage one field without fixing the checksum.
    fn garble(&mut self, frame: &mut Frame) {
        let x = self.rng.random::<f64>();
        if x < 0.75 {
            frame.payload.0[0] = b'Z';
        } else if x < 0.875 {
            frame.seqnum = GARBLED_FIELD;
        } else {
            frame.acknum = GARBLED_FIELD;
        }
    }
}
