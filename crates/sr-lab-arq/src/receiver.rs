//! Selective-repeat receive side.
//!
//! Frames inside the acceptance window are buffered by sequence number and
//! handed to the application strictly in order, once each. Every accepted
//! frame is acknowledged individually, duplicates included. A resent copy of
//! a frame delivered within the last window is acknowledged again under its
//! own number. Anything corrupted or further out gets a re-ACK of the last
//! delivered sequence number instead.

use sr_lab_abstract::{
    ArqConfig, ConfigError, Frame, Message, SubmitError, SystemContext, TransportProtocol,
};

use crate::codec::{ack_frame, is_corrupted};
use crate::seq::SeqRing;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Intact frames inside the window, duplicates included.
    pub packets_received: u64,
    pub delivered: u64,
    pub duplicates: u64,
    pub corrupted: u64,
    pub out_of_window: u64,
    pub acks_sent: u64,
}

pub struct SrReceiver {
    ring: SeqRing,
    expected_base: u32,
    /// Indexed by sequence number; holds frames waiting on an earlier gap.
    slots: Vec<Option<Frame>>,
    /// Nominal `seqnum` of the next ACK, alternates between 1 and 0.
    ack_toggle: u32,
    stats: ReceiverStats,
}

impl SrReceiver {
    pub fn try_new(config: &ArqConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let ring = SeqRing::from_config(config)?;
        Ok(Self {
            ring,
            expected_base: 0,
            slots: vec![None; ring.space() as usize],
            ack_toggle: 1,
            stats: ReceiverStats::default(),
        })
    }

    pub fn expected_base(&self) -> u32 {
        self.expected_base
    }

    pub fn is_buffered(&self, seq: u32) -> bool {
        self.slots.get(seq as usize).is_some_and(Option::is_some)
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.expected_base = 0;
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.ack_toggle = 1;
        self.stats = ReceiverStats::default();
    }

    pub fn on_frame_received(&mut self, ctx: &mut dyn SystemContext, frame: Frame) {
        if is_corrupted(&frame) {
            self.stats.corrupted += 1;
            ctx.log("SR receiver: corrupted frame, re-ACKing last delivered");
            self.send_ack(ctx, self.ring.prev(self.expected_base));
            return;
        }

        let Some(seq) = self.ring.checked(frame.seqnum) else {
            self.stats.out_of_window += 1;
            ctx.log(&format!(
                "SR receiver: seq {} is not a sequence number, re-ACKing last delivered",
                frame.seqnum
            ));
            self.send_ack(ctx, self.ring.prev(self.expected_base));
            return;
        };

        if !self.ring.in_window(self.expected_base, seq) {
            if self.is_recently_delivered(seq) {
                // Its ACK was lost; the sender is still waiting on this number.
                self.stats.duplicates += 1;
                ctx.log(&format!("SR receiver: seq {seq} already delivered, re-ACKing it"));
                self.send_ack(ctx, seq);
                return;
            }

            self.stats.out_of_window += 1;
            ctx.log(&format!(
                "SR receiver: seq {} outside window starting at {}, re-ACKing last delivered",
                frame.seqnum, self.expected_base
            ));
            self.send_ack(ctx, self.ring.prev(self.expected_base));
            return;
        }

        self.stats.packets_received += 1;
        let slot = &mut self.slots[seq as usize];
        if slot.is_none() {
            *slot = Some(frame);
            ctx.log(&format!("SR receiver: buffered seq {seq}"));
        } else {
            self.stats.duplicates += 1;
            ctx.log(&format!("SR receiver: duplicate seq {seq}"));
        }

        self.drain(ctx);
        self.send_ack(ctx, seq);
    }

    /// `seq` lies in `[expected_base - window, expected_base)`.
    fn is_recently_delivered(&self, seq: u32) -> bool {
        let behind = self.ring.distance(seq, self.expected_base);
        (1..=self.ring.window()).contains(&behind)
    }

    fn drain(&mut self, ctx: &mut dyn SystemContext) {
        while let Some(frame) = self.slots[self.expected_base as usize].take() {
            ctx.log(&format!(
                "SR receiver: delivering seq {} to application",
                self.expected_base
            ));
            ctx.deliver_data(&frame.payload);
            self.stats.delivered += 1;
            ctx.record_metric("delivered", self.stats.delivered as f64);
            self.expected_base = self.ring.next(self.expected_base);
        }
    }

    fn send_ack(&mut self, ctx: &mut dyn SystemContext, acknum: u32) {
        ctx.send_frame(ack_frame(self.ack_toggle, acknum));
        self.ack_toggle ^= 1;
        self.stats.acks_sent += 1;
    }
}

impl TransportProtocol for SrReceiver {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.reset();
        ctx.log(&format!(
            "SR receiver ready (seq space {}, window {})",
            self.ring.space(),
            self.ring.window()
        ));
    }

    fn on_frame(&mut self, ctx: &mut dyn SystemContext, frame: Frame) {
        self.on_frame_received(ctx, frame);
    }

    fn on_timer(&mut self, _ctx: &mut dyn SystemContext) {
        // Receiver has no timers
    }

    fn on_app_data(
        &mut self,
        _ctx: &mut dyn SystemContext,
        _message: Message,
    ) -> Result<(), SubmitError> {
        Err(SubmitError::ReceiveOnly)
    }
}
