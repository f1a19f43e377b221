//! Wire layer: the three ranging frame layouts and their codec.
//!
//! The layouts are IEEE 802.15.4-style data frames with a 10-byte common
//! header and literal, fixed byte templates. The codec validates the common
//! prefix of a received frame against the template expected for the current
//! protocol step before extracting any payload field.

pub mod frame;

pub use frame::{
    Frame, FrameError, FrameKind, COMMON_LEN, FINAL_AUTH_IDX, FINAL_FINAL_TX_TS_IDX,
    FINAL_MSG_LEN, FINAL_POLL_TX_TS_IDX, FINAL_RESP_RX_TS_IDX, POLL_MSG_LEN, POLL_PUBKEY_IDX,
    RESP_MSG_LEN, RESP_PUBKEY_IDX, RX_BUF_LEN, SEQ_IDX, TS_LEN,
};
