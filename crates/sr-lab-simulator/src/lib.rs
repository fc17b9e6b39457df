pub mod engine;
pub mod scenario_runner;
pub mod trace;
pub mod workload;

pub use engine::{LinkEventSummary, NodeId, Simulator};
pub use trace::SimulationReport;
