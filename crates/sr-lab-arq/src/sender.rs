//! Selective-repeat send side.
//!
//! The sender keeps up to `window_size` frames outstanding. Each frame is
//! acknowledged individually; the window slides only over the acknowledged
//! prefix. A single timer covers the whole window: when it fires, every
//! unacknowledged frame in the window is sent again and the timer is armed
//! once more.

use sr_lab_abstract::{
    ArqConfig, ConfigError, Frame, Message, SubmitError, SystemContext, TransportProtocol,
};
use tracing::warn;

use crate::codec::{data_frame, is_corrupted};
use crate::seq::SeqRing;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// New data frames handed to the channel.
    pub frames_sent: u64,
    /// Timeout retransmissions.
    pub packets_resent: u64,
    /// Messages rejected because the window was full.
    pub window_full: u64,
    /// Intact ACKs, including duplicates.
    pub acks_received: u64,
    /// ACKs that marked a frame for the first time.
    pub new_acks: u64,
    pub corrupted_acks: u64,
}

#[derive(Debug, Clone)]
struct PendingFrame {
    frame: Frame,
    acked: bool,
}

pub struct SrSender {
    ring: SeqRing,
    rtt: u64,
    next_seq: u32,
    window_base: u32,
    outstanding: u32,
    /// Indexed by sequence number; `None` outside the window.
    pending: Vec<Option<PendingFrame>>,
    stats: SenderStats,
}

impl SrSender {
    pub fn try_new(config: &ArqConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if !config.is_unambiguous() {
            warn!(
                seq_space = config.seq_space,
                window_size = config.window_size,
                "sequence space is smaller than twice the window; stale retransmissions can alias new frames"
            );
        }
        let ring = SeqRing::from_config(config)?;
        Ok(Self {
            ring,
            rtt: config.rtt,
            next_seq: 0,
            window_base: 0,
            outstanding: 0,
            pending: vec![None; ring.space() as usize],
            stats: SenderStats::default(),
        })
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn window_base(&self) -> u32 {
        self.window_base
    }

    pub fn outstanding(&self) -> u32 {
        self.outstanding
    }

    pub fn is_window_full(&self) -> bool {
        self.outstanding == self.ring.window()
    }

    /// `Some(acked)` for a sequence number that currently holds a frame.
    pub fn slot_state(&self, seq: u32) -> Option<bool> {
        self.pending
            .get(seq as usize)
            .and_then(|slot| slot.as_ref())
            .map(|p| p.acked)
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    /// Return to the initial state: empty window, sequence numbers from 0.
    pub fn reset(&mut self) {
        self.next_seq = 0;
        self.window_base = 0;
        self.outstanding = 0;
        self.pending.iter_mut().for_each(|slot| *slot = None);
        self.stats = SenderStats::default();
    }

    /// Offer one application message.
    pub fn submit(
        &mut self,
        ctx: &mut dyn SystemContext,
        message: Message,
    ) -> Result<(), SubmitError> {
        if self.is_window_full() {
            self.stats.window_full += 1;
            ctx.log("SR sender: window full, dropping message");
            ctx.record_metric("window_full", self.stats.window_full as f64);
            return Err(SubmitError::WindowFull {
                outstanding: self.outstanding,
            });
        }

        let seq = self.next_seq;
        let frame = data_frame(seq, message);
        self.pending[seq as usize] = Some(PendingFrame {
            frame,
            acked: false,
        });
        self.outstanding += 1;
        self.stats.frames_sent += 1;

        ctx.log(&format!("SR sender: sending seq {seq}"));
        ctx.send_frame(frame);
        if self.outstanding == 1 {
            self.arm_timer(ctx);
        }
        self.next_seq = self.ring.next(seq);
        ctx.record_metric("outstanding", self.outstanding as f64);
        Ok(())
    }

    pub fn on_ack_received(&mut self, ctx: &mut dyn SystemContext, frame: Frame) {
        if is_corrupted(&frame) {
            self.stats.corrupted_acks += 1;
            ctx.log("SR sender: corrupted ACK, ignoring");
            return;
        }
        self.stats.acks_received += 1;
        ctx.record_metric("acks_received", self.stats.acks_received as f64);

        let acked = frame
            .ack_number()
            .and_then(|raw| self.ring.checked(raw))
            .filter(|&seq| self.ring.in_window(self.window_base, seq));

        match acked {
            Some(seq) => match self.pending[seq as usize].as_mut() {
                Some(slot) if !slot.acked => {
                    slot.acked = true;
                    self.stats.new_acks += 1;
                    ctx.record_metric("new_acks", self.stats.new_acks as f64);
                    ctx.log(&format!("SR sender: ACK {seq} is new"));
                }
                Some(_) => ctx.log(&format!("SR sender: duplicate ACK {seq}, nothing to do")),
                None => ctx.log(&format!("SR sender: ACK {seq} for an unsent slot, ignoring")),
            },
            None => ctx.log(&format!(
                "SR sender: ACK {} outside window starting at {}, ignoring",
                frame.acknum, self.window_base
            )),
        }

        ctx.stop_timer();
        self.slide(ctx);
        if self.outstanding > 0 {
            self.arm_timer(ctx);
        }
    }

    /// Resend every unacknowledged frame in the window, then re-arm once.
    pub fn on_timer_expired(&mut self, ctx: &mut dyn SystemContext) {
        if self.outstanding == 0 {
            ctx.log("SR sender: timer expired with nothing outstanding");
            return;
        }

        for offset in 0..self.outstanding {
            let seq = self.ring.add(self.window_base, offset);
            let Some(slot) = self.pending[seq as usize].as_ref() else {
                continue;
            };
            if slot.acked {
                continue;
            }
            ctx.log(&format!("SR sender: timeout, resending seq {seq}"));
            ctx.send_frame(slot.frame);
            self.stats.packets_resent += 1;
            ctx.record_metric("retransmit_seq", seq as f64);
        }

        self.arm_timer(ctx);
    }

    fn slide(&mut self, ctx: &mut dyn SystemContext) {
        let before = self.outstanding;
        while self.outstanding > 0 {
            let base = self.window_base as usize;
            if !self.pending[base].as_ref().is_some_and(|p| p.acked) {
                break;
            }
            self.pending[base] = None;
            self.window_base = self.ring.next(self.window_base);
            self.outstanding -= 1;
        }
        if self.outstanding != before {
            ctx.log(&format!(
                "SR sender: window slid to base {} ({} outstanding)",
                self.window_base, self.outstanding
            ));
            ctx.record_metric("outstanding", self.outstanding as f64);
        }
    }

    // Single timer: always disarm before arming.
    fn arm_timer(&self, ctx: &mut dyn SystemContext) {
        ctx.stop_timer();
        ctx.start_timer(self.rtt);
    }
}

impl TransportProtocol for SrSender {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.reset();
        ctx.stop_timer();
        ctx.log(&format!(
            "SR sender ready (seq space {}, window {}, rtt {})",
            self.ring.space(),
            self.ring.window(),
            self.rtt
        ));
    }

    fn on_frame(&mut self, ctx: &mut dyn SystemContext, frame: Frame) {
        self.on_ack_received(ctx, frame);
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext) {
        self.on_timer_expired(ctx);
    }

    fn on_app_data(
        &mut self,
        ctx: &mut dyn SystemContext,
        message: Message,
    ) -> Result<(), SubmitError> {
        self.submit(ctx, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ack_frame;
    use crate::testing::{RecordingContext, classic_config};

    fn sender() -> SrSender {
        SrSender::try_new(&classic_config()).unwrap()
    }

    fn msg(i: u8) -> Message {
        Message::filled(b'a' + i)
    }

    fn fill_window(sender: &mut SrSender, ctx: &mut RecordingContext) {
        for i in 0..6 {
            sender.submit(ctx, msg(i)).unwrap();
        }
    }

    #[test]
    fn first_submit_sends_and_arms_timer() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();

        s.submit(&mut ctx, msg(0)).unwrap();

        assert_eq!(ctx.sent.len(), 1);
        assert_eq!(ctx.sent[0].seqnum, 0);
        assert_eq!(ctx.sent[0].acknum, sr_lab_abstract::NOT_IN_USE);
        assert_eq!(ctx.timer, Some(16));
        assert_eq!(s.next_seq(), 1);
        assert_eq!(s.outstanding(), 1);
        assert_eq!(s.slot_state(0), Some(false));
    }

    #[test]
    fn later_submits_do_not_restart_timer() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        s.submit(&mut ctx, msg(0)).unwrap();
        ctx.now = 5;
        s.submit(&mut ctx, msg(1)).unwrap();

        assert_eq!(ctx.timer_starts, 1);
        assert_eq!(ctx.timer, Some(16));
    }

    #[test]
    fn full_window_rejects_until_it_slides() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        fill_window(&mut s, &mut ctx);

        assert!(s.is_window_full());
        assert_eq!(
            s.submit(&mut ctx, msg(6)),
            Err(SubmitError::WindowFull { outstanding: 6 })
        );
        assert_eq!(ctx.sent.len(), 6);
        assert_eq!(s.stats().window_full, 1);

        // An ACK for a later frame does not free the base slot.
        s.on_ack_received(&mut ctx, ack_frame(0, 3));
        assert!(s.submit(&mut ctx, msg(6)).is_err());

        s.on_ack_received(&mut ctx, ack_frame(1, 0));
        assert_eq!(s.window_base(), 1);
        assert!(s.submit(&mut ctx, msg(6)).is_ok());
        assert_eq!(ctx.sent.last().map(|f| f.seqnum), Some(6));
        assert!(s.is_window_full());
    }

    #[test]
    fn only_lost_frame_is_retransmitted() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        fill_window(&mut s, &mut ctx);
        ctx.take_sent();

        for seq in [0, 1, 3, 4, 5] {
            s.on_ack_received(&mut ctx, ack_frame(0, seq));
        }
        assert_eq!(s.window_base(), 2);
        assert_eq!(s.outstanding(), 4);
        assert!(ctx.timer_armed());

        ctx.fire_timer();
        s.on_timer_expired(&mut ctx);

        let resent = ctx.take_sent();
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].seqnum, 2);
        assert_eq!(resent[0].payload, msg(2));
        assert!(ctx.timer_armed());
        assert_eq!(s.stats().packets_resent, 1);

        s.on_ack_received(&mut ctx, ack_frame(1, 2));
        assert_eq!(s.outstanding(), 0);
        assert_eq!(s.window_base(), 6);
        assert!(!ctx.timer_armed());
    }

    #[test]
    fn timeout_resends_all_unacked_and_rearms_once() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        for i in 0..3 {
            s.submit(&mut ctx, msg(i)).unwrap();
        }
        ctx.take_sent();
        s.on_ack_received(&mut ctx, ack_frame(0, 1));
        let starts = ctx.timer_starts;

        ctx.fire_timer();
        s.on_timer_expired(&mut ctx);

        let seqs: Vec<i32> = ctx.take_sent().iter().map(|f| f.seqnum).collect();
        assert_eq!(seqs, vec![0, 2]);
        assert_eq!(ctx.timer_starts, starts + 1);
        let resent: Vec<f64> = ctx
            .metrics
            .iter()
            .filter(|(name, _)| name == "retransmit_seq")
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(resent, vec![0.0, 2.0]);
    }

    #[test]
    fn duplicate_ack_changes_nothing() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        for i in 0..3 {
            s.submit(&mut ctx, msg(i)).unwrap();
        }
        s.on_ack_received(&mut ctx, ack_frame(0, 1));
        let (base, outstanding, new_acks) = (s.window_base(), s.outstanding(), s.stats().new_acks);
        let armed = ctx.timer_armed();

        s.on_ack_received(&mut ctx, ack_frame(1, 1));

        assert_eq!(s.window_base(), base);
        assert_eq!(s.outstanding(), outstanding);
        assert_eq!(s.stats().new_acks, new_acks);
        assert_eq!(s.slot_state(1), Some(true));
        assert_eq!(ctx.timer_armed(), armed);
        assert_eq!(s.stats().acks_received, 2);
    }

    #[test]
    fn corrupted_ack_is_ignored() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        s.submit(&mut ctx, msg(0)).unwrap();
        let starts = ctx.timer_starts;

        let mut ack = ack_frame(0, 0);
        ack.acknum = 999_999;
        s.on_ack_received(&mut ctx, ack);

        assert_eq!(s.outstanding(), 1);
        assert_eq!(s.slot_state(0), Some(false));
        assert_eq!(ctx.timer_starts, starts);
        assert_eq!(s.stats().corrupted_acks, 1);
        assert_eq!(s.stats().acks_received, 0);
    }

    #[test]
    fn stale_ack_outside_window_does_not_slide() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        s.submit(&mut ctx, msg(0)).unwrap();
        s.on_ack_received(&mut ctx, ack_frame(1, 0));
        s.submit(&mut ctx, msg(1)).unwrap();

        // Receiver's "last delivered" re-ACK for seq 0.
        s.on_ack_received(&mut ctx, ack_frame(0, 0));

        assert_eq!(s.window_base(), 1);
        assert_eq!(s.outstanding(), 1);
        assert_eq!(s.slot_state(1), Some(false));
        assert!(ctx.timer_armed());
    }

    #[test]
    fn drained_window_disarms_and_next_submit_rearms_once() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        s.submit(&mut ctx, msg(0)).unwrap();
        s.on_ack_received(&mut ctx, ack_frame(1, 0));
        assert!(!ctx.timer_armed());

        let starts = ctx.timer_starts;
        s.submit(&mut ctx, msg(1)).unwrap();
        assert!(ctx.timer_armed());
        assert_eq!(ctx.timer_starts, starts + 1);
    }

    #[test]
    fn window_slides_across_wraparound() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        for i in 0..5 {
            s.submit(&mut ctx, msg(i)).unwrap();
            s.on_ack_received(&mut ctx, ack_frame(0, u32::from(i)));
        }
        assert_eq!(s.window_base(), 5);
        ctx.take_sent();

        fill_window(&mut s, &mut ctx);
        let seqs: Vec<i32> = ctx.take_sent().iter().map(|f| f.seqnum).collect();
        assert_eq!(seqs, vec![5, 6, 0, 1, 2, 3]);
        assert!(s.submit(&mut ctx, msg(9)).is_err());

        for seq in [6, 0, 5] {
            s.on_ack_received(&mut ctx, ack_frame(0, seq));
        }
        assert_eq!(s.window_base(), 1);
        assert_eq!(s.outstanding(), 3);

        // seq 4 is inside the window [1, 6] but was never sent.
        s.on_ack_received(&mut ctx, ack_frame(0, 4));
        assert_eq!(s.slot_state(4), None);
    }

    #[test]
    fn timer_with_nothing_outstanding_does_nothing() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        s.on_timer_expired(&mut ctx);
        assert!(ctx.sent.is_empty());
        assert!(!ctx.timer_armed());
    }
}
