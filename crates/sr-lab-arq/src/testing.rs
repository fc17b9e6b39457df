use sr_lab_abstract::{ArqConfig, Frame, Message, SystemContext};

/// Seven sequence numbers, six-frame window, timeout 16.
pub fn classic_config() -> ArqConfig {
    ArqConfig {
        seq_space: 7,
        window_size: 6,
        rtt: 16,
    }
}

/// Context that records everything a role asks of its collaborators.
#[derive(Default)]
pub struct RecordingContext {
    pub sent: Vec<Frame>,
    pub delivered: Vec<Message>,
    pub timer: Option<u64>,
    pub timer_starts: usize,
    pub logs: Vec<String>,
    pub metrics: Vec<(String, f64)>,
    pub now: u64,
}

impl RecordingContext {
    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Clears sent frames so the next assertion only sees new traffic.
    pub fn take_sent(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.sent)
    }

    /// Simulates the clock firing: the timer is no longer armed.
    pub fn fire_timer(&mut self) {
        assert!(self.timer.take().is_some(), "timer fired while disarmed");
    }
}

impl SystemContext for RecordingContext {
    fn send_frame(&mut self, frame: Frame) {
        self.sent.push(frame);
    }

    fn start_timer(&mut self, delay: u64) {
        assert!(self.timer.is_none(), "timer armed twice without stop");
        self.timer = Some(self.now + delay);
        self.timer_starts += 1;
    }

    fn stop_timer(&mut self) {
        self.timer = None;
    }

    fn deliver_data(&mut self, message: &Message) {
        self.delivered.push(*message);
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.metrics.push((name.to_string(), value));
    }
}
