use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest accepted sequence ring. Both roles keep one slot per sequence number.
pub const MAX_SEQ_SPACE: u32 = 1 << 16;

/// Channel parameters for the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
    /// Deliver frames in send order within each direction.
    #[serde(default)]
    pub fifo: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 1,
            max_latency: 10,
            seed: 0,
            fifo: false,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("loss_rate", self.loss_rate),
            ("corrupt_rate", self.corrupt_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }
        if self.min_latency > self.max_latency {
            return Err(ConfigError::LatencyRange {
                min: self.min_latency,
                max: self.max_latency,
            });
        }
        Ok(())
    }
}

/// Parameters of the selective-repeat state machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArqConfig {
    /// Size of the sequence number ring.
    pub seq_space: u32,
    /// Maximum number of outstanding frames.
    pub window_size: u32,
    /// Retransmission timeout, in simulator time units.
    pub rtt: u64,
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            seq_space: 8,
            window_size: 4,
            rtt: 25,
        }
    }
}

impl ArqConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if self.seq_space <= self.window_size {
            return Err(ConfigError::SeqSpaceTooSmall {
                seq_space: self.seq_space,
                window_size: self.window_size,
            });
        }
        if self.seq_space > MAX_SEQ_SPACE {
            return Err(ConfigError::SeqSpaceTooLarge {
                seq_space: self.seq_space,
                max: MAX_SEQ_SPACE,
            });
        }
        if self.rtt == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Whether a receiver can always tell a retransmitted old frame from a new one.
    pub fn is_unambiguous(&self) -> bool {
        u64::from(self.seq_space) >= 2 * u64::from(self.window_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SimConfig::default().validate().is_ok());
        assert!(ArqConfig::default().validate().is_ok());
        assert!(ArqConfig::default().is_unambiguous());
        // Round trip of the default channel stays under the timeout.
        assert!(ArqConfig::default().rtt > 2 * SimConfig::default().max_latency);
    }

    #[test]
    fn classic_ring_is_valid_but_ambiguous() {
        let cfg = ArqConfig {
            seq_space: 7,
            window_size: 6,
            rtt: 16,
        };
        assert!(cfg.validate().is_ok());
        assert!(!cfg.is_unambiguous());
    }

    #[test]
    fn oversized_ring_is_rejected() {
        let cfg = ArqConfig {
            seq_space: u32::MAX,
            window_size: 3_000_000_000,
            rtt: 16,
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::SeqSpaceTooLarge {
                seq_space: u32::MAX,
                max: MAX_SEQ_SPACE
            })
        );
        assert!(!cfg.is_unambiguous());

        let cfg = ArqConfig {
            seq_space: MAX_SEQ_SPACE,
            window_size: MAX_SEQ_SPACE / 2,
            rtt: 16,
        };
        assert!(cfg.validate().is_ok());
        assert!(cfg.is_unambiguous());
    }

    #[test]
    fn seq_space_must_exceed_window() {
        let cfg = ArqConfig {
            seq_space: 6,
            window_size: 6,
            rtt: 16,
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::SeqSpaceTooSmall {
                seq_space: 6,
                window_size: 6
            })
        );
    }

    #[test]
    fn rejects_bad_channel() {
        let cfg = SimConfig {
            loss_rate: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Probability { name: "loss_rate", .. })
        ));

        let cfg = SimConfig {
            min_latency: 20,
            max_latency: 5,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::LatencyRange { min: 20, max: 5 })
        );
    }

    #[test]
    fn arq_config_fills_missing_fields() {
        let cfg: ArqConfig = toml::from_str("window_size = 3").unwrap();
        assert_eq!(cfg.window_size, 3);
        assert_eq!(cfg.seq_space, 8);
        assert_eq!(cfg.rtt, 25);
    }
}
