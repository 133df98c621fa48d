//! Datagram wire format: a fixed 7-byte header followed by the payload.
//!
//! Header layout (little-endian): `u32 payload_len`, `u16 sequence`,
//! `u8 frame type`. Frames are parsed from an accumulation buffer with a
//! cursor that reports `NeedMore` for incomplete input instead of failing,
//! and every remote-controlled length is bounds-checked before any
//! allocation.

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 7;

/// Upper bound on a single frame's payload. A length field above this is a
/// protocol violation, not an allocation request.
pub const MAX_PAYLOAD_LEN: usize = 60 * 1024;

/// Frame types carried in the header's final byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Application data under a sequence number.
    Payload = 0,
    /// Acknowledges one sequence (2-byte payload).
    Ack = 1,
    /// Requests retransmission of the listed sequences (2 bytes each).
    Resend = 2,
    /// Session establishment (seq 0, empty payload).
    Init = 3,
    /// Local side requests teardown.
    Close = 4,
    /// Acknowledges a `Close`.
    Closed = 5,
    /// Keepalive probe.
    Ping = 6,
    /// Keepalive reply.
    Pong = 7,
    /// Unilateral abandonment of the session.
    Reset = 8,
}

impl FrameType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Payload,
            1 => Self::Ack,
            2 => Self::Resend,
            3 => Self::Init,
            4 => Self::Close,
            5 => Self::Closed,
            6 => Self::Ping,
            7 => Self::Pong,
            8 => Self::Reset,
            _ => return None,
        })
    }
}

/// One parsed transport frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: FrameType, sequence: u16, payload: Vec<u8>) -> Self {
        Self {
            frame_type,
            sequence,
            payload,
        }
    }

    /// A control frame with no payload (INIT, CLOSE, PING, ...).
    pub fn control(frame_type: FrameType) -> Self {
        Self::new(frame_type, 0, Vec::new())
    }

    /// Serialize header + payload into a single datagram buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.push(self.frame_type as u8);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Reasons a frame is rejected outright (as opposed to "wait for more bytes").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireViolation {
    /// The type byte is outside the known range.
    UnknownType(u8),
    /// The payload length field exceeds [`MAX_PAYLOAD_LEN`].
    OversizedPayload(u32),
}

/// Result of attempting to extract one frame from the front of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// A complete frame; `consumed` bytes should be drained from the buffer.
    Complete { frame: Frame, consumed: usize },
    /// The buffer holds a prefix of a frame; try again after the next read.
    NeedMore,
    /// The header is self-inconsistent; the sender is violating the protocol.
    Malformed(WireViolation),
}

/// Try to parse one frame from the front of `buf`.
pub fn parse_frame(buf: &[u8]) -> ParseOutcome {
    if buf.len() < HEADER_LEN {
        return ParseOutcome::NeedMore;
    }
    let payload_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if payload_len as usize > MAX_PAYLOAD_LEN {
        return ParseOutcome::Malformed(WireViolation::OversizedPayload(payload_len));
    }
    let sequence = u16::from_le_bytes([buf[4], buf[5]]);
    let Some(frame_type) = FrameType::from_u8(buf[6]) else {
        return ParseOutcome::Malformed(WireViolation::UnknownType(buf[6]));
    };
    let total = HEADER_LEN + payload_len as usize;
    if buf.len() < total {
        return ParseOutcome::NeedMore;
    }
    ParseOutcome::Complete {
        frame: Frame::new(frame_type, sequence, buf[HEADER_LEN..total].to_vec()),
        consumed: total,
    }
}
