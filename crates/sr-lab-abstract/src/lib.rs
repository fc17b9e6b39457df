pub mod config;
pub mod error;
pub mod frame;
pub mod interface;
pub mod scenario;

pub use interface::{SystemContext, TransportProtocol};
pub use frame::{Frame, Message, NOT_IN_USE, PAYLOAD_LEN};

pub use config::{ArqConfig, MAX_SEQ_SPACE, SimConfig};
pub use error::{ConfigError, PayloadError, SubmitError};
pub use scenario::{SimConfigOverride, TestAction, TestAssertion, TestScenario};
