//! Selective-repeat ARQ roles.
//!
//! [`SrSender`] and [`SrReceiver`] each own their state and only talk to the
//! outside world through [`SystemContext`](sr_lab_abstract::SystemContext).

pub mod codec;
pub mod receiver;
pub mod sender;
pub mod seq;

#[cfg(test)]
mod testing;

pub use receiver::{ReceiverStats, SrReceiver};
pub use sender::{SenderStats, SrSender};
pub use seq::SeqRing;

use sr_lab_abstract::{ArqConfig, ConfigError, TransportProtocol};

pub fn sr_sender(config: &ArqConfig) -> Result<Box<dyn TransportProtocol>, ConfigError> {
    Ok(Box::new(SrSender::try_new(config)?))
}

pub fn sr_receiver(config: &ArqConfig) -> Result<Box<dyn TransportProtocol>, ConfigError> {
    Ok(Box::new(SrReceiver::try_new(config)?))
}
