use crate::error::SubmitError;
use crate::frame::{Frame, Message};

/// The capability provided by the simulator to a protocol role.
/// Roles call these methods to interact with the channel and the application layer.
pub trait SystemContext {
    /// Hand a frame to the (unreliable) channel.
    fn send_frame(&mut self, frame: Frame);

    /// Arm the role's single timer to fire after `delay` time units.
    /// Arming while already armed replaces the earlier deadline.
    fn start_timer(&mut self, delay: u64);

    /// Disarm the role's timer. No-op when it is not armed.
    fn stop_timer(&mut self);

    /// Deliver an in-order payload to the application layer.
    fn deliver_data(&mut self, message: &Message);

    /// Log a message to the simulator's debug output.
    fn log(&mut self, message: &str);

    /// Get current simulation time
    fn now(&self) -> u64;

    /// Record a numeric metric for the run report (e.g., outstanding frames, resends).
    fn record_metric(&mut self, _name: &str, _value: f64) {
        // Default no-op so callers without a collector don't need to care.
    }
}

/// One side of the link, driven by the simulator one event at a time.
pub trait TransportProtocol {
    /// Called when the simulation starts.
    fn init(&mut self, _ctx: &mut dyn SystemContext) {}

    /// Called when a frame (possibly corrupted) arrives from the channel.
    fn on_frame(&mut self, ctx: &mut dyn SystemContext, frame: Frame);

    /// Called when the role's armed timer reaches its deadline.
    fn on_timer(&mut self, ctx: &mut dyn SystemContext);

    /// Called when the application layer offers one outbound message.
    fn on_app_data(
        &mut self,
        ctx: &mut dyn SystemContext,
        message: Message,
    ) -> Result<(), SubmitError>;
}
