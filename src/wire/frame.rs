//! Frame codec for the three-message ranging exchange.
//!
//! Frame wire format (10-byte common header, then type-specific payload):
//! ```text
//! [frameCtrl:2][seq:1][panId:2][destAddr:2][srcAddr:2][funcCode:1][payload…]
//! ```
//!
//! - **Poll** (26 bytes): sender's public-key byte at offset 23.
//! - **Response** (27 bytes): two-byte function code (0x10, 0x02); sender's
//!   public-key byte at offset 12.
//! - **Final** (26 bytes): three little-endian u32 timestamps (poll-TX,
//!   response-RX, final-TX) at offsets 10/14/18; shared-secret byte at
//!   offset 23.
//!
//! The common header of a received frame must byte-match the template
//! expected for the current protocol step. The sequence-number byte is
//! zeroed before the comparison — it is diagnostic only and never grounds a
//! rejection. The templates (including the role-dependent PAN/address byte
//! order) are wire constants and must not be "normalized".

use thiserror::Error;

/// Length of the common part of every ranging frame (up to and including the
/// function code).
pub const COMMON_LEN: usize = 10;
/// Sequence-number byte, excluded from header validation.
pub const SEQ_IDX: usize = 2;

/// Poll frame length.
pub const POLL_MSG_LEN: usize = 26;
/// Response frame length.
pub const RESP_MSG_LEN: usize = 27;
/// Final frame length.
pub const FINAL_MSG_LEN: usize = 26;
/// Receive buffer sized for the longest frame handled here.
pub const RX_BUF_LEN: usize = 27;

/// Public-key byte offset in the poll frame.
pub const POLL_PUBKEY_IDX: usize = 23;
/// Public-key byte offset in the response frame.
pub const RESP_PUBKEY_IDX: usize = 12;
/// Shared-secret byte offset in the final frame.
pub const FINAL_AUTH_IDX: usize = 23;

/// Offsets of the three timestamp fields embedded in the final frame.
pub const FINAL_POLL_TX_TS_IDX: usize = 10;
pub const FINAL_RESP_RX_TS_IDX: usize = 14;
pub const FINAL_FINAL_TX_TS_IDX: usize = 18;
/// Each embedded timestamp is 4 bytes, little-endian.
pub const TS_LEN: usize = 4;

const POLL_TEMPLATE: [u8; POLL_MSG_LEN] = [
    0x41, 0x88, 0x00, 0xDE, 0xCA, b'W', b'A', b'V', b'E', 0x21, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0,
];

const RESP_TEMPLATE: [u8; RESP_MSG_LEN] = [
    0x41, 0x88, 0x00, 0xCA, 0xDE, b'V', b'E', b'W', b'A', 0x10, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0,
];

const FINAL_TEMPLATE: [u8; FINAL_MSG_LEN] = [
    0x41, 0x88, 0x00, 0xCA, 0xDE, b'W', b'A', b'V', b'E', 0x23, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0,
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Common-header mismatch: the frame is not the one expected at this
    /// protocol step. Discarded without touching the payload.
    #[error("unexpected frame: common header does not match the expected {0:?} template")]
    UnexpectedFrame(FrameKind),
    #[error("frame too short for {kind:?}: got {len} bytes")]
    TooShort { kind: FrameKind, len: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Discriminates the three frame layouts of the ranging exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Poll,
    Response,
    Final,
}

impl FrameKind {
    fn template(self) -> &'static [u8] {
        match self {
            FrameKind::Poll => &POLL_TEMPLATE,
            FrameKind::Response => &RESP_TEMPLATE,
            FrameKind::Final => &FINAL_TEMPLATE,
        }
    }

    /// Full wire length of this frame layout.
    pub fn wire_len(self) -> usize {
        self.template().len()
    }
}

/// A decoded (or to-be-encoded) ranging frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// First frame of the exchange, carrying the sender's public-key byte.
    Poll { public_key: u8 },
    /// Reply to the poll, carrying the other side's public-key byte.
    Response { public_key: u8 },
    /// Last frame: the poll-TX, response-RX and final-TX timestamps (low 32
    /// bits of the 40-bit device time) plus the sender's shared-secret byte.
    Final {
        poll_tx: u32,
        resp_rx: u32,
        final_tx: u32,
        auth_tag: u8,
    },
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Poll { .. } => FrameKind::Poll,
            Frame::Response { .. } => FrameKind::Response,
            Frame::Final { .. } => FrameKind::Final,
        }
    }

    /// Serialize this frame with the given sequence number at byte 2.
    pub fn encode(&self, seq: u8) -> Vec<u8> {
        let mut buf = self.kind().template().to_vec();
        buf[SEQ_IDX] = seq;
        match *self {
            Frame::Poll { public_key } => {
                buf[POLL_PUBKEY_IDX] = public_key;
            }
            Frame::Response { public_key } => {
                buf[RESP_PUBKEY_IDX] = public_key;
            }
            Frame::Final {
                poll_tx,
                resp_rx,
                final_tx,
                auth_tag,
            } => {
                put_ts(&mut buf, FINAL_POLL_TX_TS_IDX, poll_tx);
                put_ts(&mut buf, FINAL_RESP_RX_TS_IDX, resp_rx);
                put_ts(&mut buf, FINAL_FINAL_TX_TS_IDX, final_tx);
                buf[FINAL_AUTH_IDX] = auth_tag;
            }
        }
        buf
    }

    /// Validate and decode a received frame against the layout expected at
    /// the current protocol step.
    ///
    /// The sequence-number byte is zeroed on a local copy before the 10-byte
    /// prefix comparison; payload fields are extracted only once the prefix
    /// matches.
    pub fn decode(bytes: &[u8], expected: FrameKind) -> Result<Frame> {
        if bytes.len() < expected.wire_len() {
            return Err(FrameError::TooShort {
                kind: expected,
                len: bytes.len(),
            });
        }

        let mut header = [0u8; COMMON_LEN];
        header.copy_from_slice(&bytes[..COMMON_LEN]);
        header[SEQ_IDX] = 0;

        if header != expected.template()[..COMMON_LEN] {
            return Err(FrameError::UnexpectedFrame(expected));
        }

        Ok(match expected {
            FrameKind::Poll => Frame::Poll {
                public_key: bytes[POLL_PUBKEY_IDX],
            },
            FrameKind::Response => Frame::Response {
                public_key: bytes[RESP_PUBKEY_IDX],
            },
            FrameKind::Final => Frame::Final {
                poll_tx: get_ts(bytes, FINAL_POLL_TX_TS_IDX),
                resp_rx: get_ts(bytes, FINAL_RESP_RX_TS_IDX),
                final_tx: get_ts(bytes, FINAL_FINAL_TX_TS_IDX),
                auth_tag: bytes[FINAL_AUTH_IDX],
            },
        })
    }

    /// Sequence number carried by a raw frame (diagnostic only).
    pub fn peek_seq(bytes: &[u8]) -> Option<u8> {
        bytes.get(SEQ_IDX).copied()
    }
}

fn put_ts(buf: &mut [u8], idx: usize, ts: u32) {
    buf[idx..idx + TS_LEN].copy_from_slice(&ts.to_le_bytes());
}

fn get_ts(buf: &[u8], idx: usize) -> u32 {
    let mut field = [0u8; TS_LEN];
    field.copy_from_slice(&buf[idx..idx + TS_LEN]);
    u32::from_le_bytes(field)
}
