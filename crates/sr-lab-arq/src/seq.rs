//! Sequence-number arithmetic over a finite ring.

use sr_lab_abstract::{ArqConfig, ConfigError, MAX_SEQ_SPACE};

/// A ring of `space` sequence numbers with a window of `window` slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRing {
    space: u32,
    window: u32,
}

impl SeqRing {
    pub fn new(space: u32, window: u32) -> Result<Self, ConfigError> {
        if window == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if space <= window {
            return Err(ConfigError::SeqSpaceTooSmall {
                seq_space: space,
                window_size: window,
            });
        }
        if space > MAX_SEQ_SPACE {
            return Err(ConfigError::SeqSpaceTooLarge {
                seq_space: space,
                max: MAX_SEQ_SPACE,
            });
        }
        Ok(Self { space, window })
    }

    pub fn from_config(config: &ArqConfig) -> Result<Self, ConfigError> {
        Self::new(config.seq_space, config.window_size)
    }

    pub fn space(&self) -> u32 {
        self.space
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn next(&self, seq: u32) -> u32 {
        (seq + 1) % self.space
    }

    pub fn prev(&self, seq: u32) -> u32 {
        (seq + self.space - 1) % self.space
    }

    /// `seq` advanced by `offset` positions.
    pub fn add(&self, seq: u32, offset: u32) -> u32 {
        (seq + offset % self.space) % self.space
    }

    /// Forward distance from `base` to `seq` around the ring.
    pub fn distance(&self, base: u32, seq: u32) -> u32 {
        (seq + self.space - base % self.space) % self.space
    }

    /// Whether `seq` lies in `[base, base + window)` modulo the ring size.
    pub fn in_window(&self, base: u32, seq: u32) -> bool {
        self.distance(base, seq) < self.window
    }

    /// Converts a wire value into a ring position, `None` if it is out of range.
    pub fn checked(&self, raw: i32) -> Option<u32> {
        u32::try_from(raw).ok().filter(|&seq| seq < self.space)
    }
}
