//! Frame construction and corruption detection.
//!
//! The integrity check is a plain additive checksum. It catches the damage a
//! noisy channel does; it is not meant to resist deliberate forgery.

use sr_lab_abstract::{Frame, Message, NOT_IN_USE};

/// Filler carried by acknowledgment frames.
pub const ACK_FILLER: Message = Message::filled(b'0');

/// Sum of `seqnum`, `acknum` and every payload byte.
pub fn compute_checksum(seqnum: i32, acknum: i32, payload: &Message) -> i32 {
    payload
        .as_bytes()
        .iter()
        .fold(seqnum.wrapping_add(acknum), |sum, &b| {
            sum.wrapping_add(i32::from(b))
        })
}

pub fn is_corrupted(frame: &Frame) -> bool {
    frame.checksum != compute_checksum(frame.seqnum, frame.acknum, &frame.payload)
}

fn seal(seqnum: i32, acknum: i32, payload: Message) -> Frame {
    Frame {
        seqnum,
        acknum,
        checksum: compute_checksum(seqnum, acknum, &payload),
        payload,
    }
}

/// Data frame carrying `message` under sequence number `seq`.
pub fn data_frame(seq: u32, message: Message) -> Frame {
    seal(wire(seq), NOT_IN_USE, message)
}

/// Acknowledgment for `acknum`; `seqnum` is the receiver's nominal toggle value.
pub fn ack_frame(seqnum: u32, acknum: u32) -> Frame {
    seal(wire(seqnum), wire(acknum), ACK_FILLER)
}

// Ring positions are bounded by the configured sequence space.
fn wire(seq: u32) -> i32 {
    i32::try_from(seq).unwrap_or(i32::MAX)
}
