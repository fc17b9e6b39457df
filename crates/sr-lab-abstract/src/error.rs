use thiserror::Error;

/// Why an application message was not taken by a protocol role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Every window slot is in use. The message is dropped, retrying is up to the caller.
    #[error("send window is full ({outstanding} frames outstanding), message dropped")]
    WindowFull { outstanding: u32 },
    /// The role only consumes frames and never originates data.
    #[error("receiver role does not send application data")]
    ReceiveOnly,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    EmptyWindow,
    #[error("sequence space {seq_space} must be larger than window size {window_size}")]
    SeqSpaceTooSmall { seq_space: u32, window_size: u32 },
    #[error("sequence space {seq_space} exceeds the limit of {max}")]
    SeqSpaceTooLarge { seq_space: u32, max: u32 },
    #[error("round-trip timeout must be positive")]
    ZeroTimeout,
    #[error("{name} must be within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },
    #[error("min_latency {min} exceeds max_latency {max}")]
    LatencyRange { min: u64, max: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload of {len} bytes does not fit in a {max} byte frame", max = crate::PAYLOAD_LEN)]
    TooLong { len: usize },
}
