//! Ranging protocol core: the two engines, the distance estimator, and the
//! timestamp plumbing they share.
//!
//! One engine per role, one exchange at a time. [`responder::Responder`]
//! opens each cycle by transmitting the poll; [`initiator::Initiator`] waits
//! for it, answers with the response, receives the final frame and computes
//! the distance. (The role names follow the reference sources, where the
//! "responder" application is the one that transmits first — see DESIGN.md.)

pub mod estimator;
pub mod initiator;
pub mod responder;

pub use estimator::{estimate, EstimatorError, Measurement, RoundTripTimes};
pub use initiator::{CycleOutcome, Initiator};
pub use responder::{Responder, ResponderOutcome};

use crate::config::TIMESTAMP_MASK_40;

/// Assemble a raw 40-bit timestamp register (least significant byte first)
/// into a 64-bit value.
pub fn ts40(register: [u8; 5]) -> u64 {
    let mut ts: u64 = 0;
    for byte in register.iter().rev() {
        ts = (ts << 8) | u64::from(*byte);
    }
    ts & TIMESTAMP_MASK_40
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ts40_little_endian_assembly() {
        assert_eq!(ts40([0x01, 0x02, 0x03, 0x04, 0x05]), 0x05_0403_0201);
        assert_eq!(ts40([0; 5]), 0);
        assert_eq!(ts40([0xFF; 5]), TIMESTAMP_MASK_40);
    }

    #[test]
    fn test_ts40_round_trips_low_five_bytes() {
        let ts: u64 = 0x00AB_CDEF_0123;
        let bytes = ts.to_le_bytes();
        let register = [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]];
        assert_eq!(ts40(register), ts);
    }
}
