//! Time-of-flight and distance estimation.
//!
//! The symmetric double-difference formula combines two round-trip and two
//! turnaround durations, measured on two free-running clocks, into a single
//! closed-form time-of-flight:
//!
//! ```text
//! tof_ticks = (Ra·Rb − Da·Db) / (Ra + Rb + Da + Db)
//! ```
//!
//! `Ra`/`Da` are differences of remote timestamps, `Rb`/`Db` of local ones,
//! so a constant offset between the two clocks cancels exactly; first-order
//! drift cancels as well. All differences are 32-bit wraparound subtractions
//! — successive timestamps on one device are never more than one 32-bit span
//! (~67 ms) apart, so truncating the 40-bit stamps is safe.

use thiserror::Error;

use crate::config::{DWT_TIME_UNITS_SECS, SPEED_OF_LIGHT_M_S};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EstimatorError {
    /// All four round-trip quantities are zero — corrupt or repeated
    /// timestamps. The exchange is failed rather than reported as a
    /// nonsensical distance.
    #[error("degenerate timestamps: round-trip sum is zero")]
    DegenerateTimestamps,
}

pub type Result<T> = std::result::Result<T, EstimatorError>;

/// The six timestamps of one completed exchange, truncated to the low 32
/// bits of device time. The first three are taken from the final frame
/// (remote clock); the last three are read from the local radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTripTimes {
    /// Poll transmission, remote clock.
    pub poll_tx: u32,
    /// Response reception, remote clock.
    pub resp_rx: u32,
    /// Final transmission, remote clock (predicted from the programmed
    /// delayed-send time).
    pub final_tx: u32,
    /// Poll reception, local clock.
    pub poll_rx: u32,
    /// Response transmission, local clock.
    pub resp_tx: u32,
    /// Final reception, local clock.
    pub final_rx: u32,
}

/// One time-of-flight estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Time of flight in device time units (fractional).
    pub tof_ticks: f64,
    /// Time of flight in seconds.
    pub tof_secs: f64,
    /// Estimated one-way distance in metres.
    pub distance_m: f64,
}

/// Evaluate the double-difference estimator for one exchange.
pub fn estimate(times: &RoundTripTimes) -> Result<Measurement> {
    let ra = f64::from(times.resp_rx.wrapping_sub(times.poll_tx));
    let rb = f64::from(times.final_rx.wrapping_sub(times.resp_tx));
    let da = f64::from(times.final_tx.wrapping_sub(times.resp_rx));
    let db = f64::from(times.resp_tx.wrapping_sub(times.poll_rx));

    let denominator = ra + rb + da + db;
    if denominator == 0.0 {
        return Err(EstimatorError::DegenerateTimestamps);
    }

    let tof_ticks = (ra * rb - da * db) / denominator;
    let tof_secs = tof_ticks * DWT_TIME_UNITS_SECS;
    let distance_m = tof_secs * SPEED_OF_LIGHT_M_S;

    Ok(Measurement {
        tof_ticks,
        tof_secs,
        distance_m,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build consistent timestamps from a simulated symmetric exchange:
    /// one-way flight `tof`, per-side turnarounds, and a constant clock
    /// offset between remote and local clocks.
    fn simulated(tof: u32, turn_local: u32, turn_remote: u32, offset: u32) -> RoundTripTimes {
        let poll_tx: u32 = 0x1000_0000;
        let poll_rx = poll_tx.wrapping_add(tof).wrapping_add(offset);
        let resp_tx = poll_rx.wrapping_add(turn_local);
        let resp_rx = resp_tx.wrapping_add(tof).wrapping_sub(offset);
        let final_tx = resp_rx.wrapping_add(turn_remote);
        let final_rx = final_tx.wrapping_add(tof).wrapping_add(offset);
        RoundTripTimes {
            poll_tx,
            resp_rx,
            final_tx,
            poll_rx,
            resp_tx,
            final_rx,
        }
    }

    #[test]
    fn test_recovers_true_tof_exactly() {
        let m = estimate(&simulated(640, 100_000, 250_000, 0)).unwrap();
        assert_eq!(m.tof_ticks, 640.0);
    }

    #[test]
    fn test_clock_offset_cancels() {
        let reference = estimate(&simulated(640, 100_000, 250_000, 0)).unwrap();
        for offset in [1u32, 12_345, 0x7FFF_FFFF, 0xFFFF_0000] {
            let m = estimate(&simulated(640, 100_000, 250_000, offset)).unwrap();
            assert_eq!(m.tof_ticks, reference.tof_ticks, "offset {offset:#x}");
        }
    }

    #[test]
    fn test_asymmetric_turnarounds_still_exact() {
        // With zero drift the estimator is exact regardless of how
        // different the two turnaround times are.
        let m = estimate(&simulated(1234, 80_000, 4_000_000, 99)).unwrap();
        assert_eq!(m.tof_ticks, 1234.0);
    }

    #[test]
    fn test_distance_conversion() {
        let m = estimate(&simulated(6400, 100_000, 100_000, 0)).unwrap();
        let expected = 6400.0 * DWT_TIME_UNITS_SECS * SPEED_OF_LIGHT_M_S;
        assert!((m.distance_m - expected).abs() < 1e-9);
        // 6400 ticks ≈ 30 m, sanity-check the order of magnitude.
        assert!(m.distance_m > 25.0 && m.distance_m < 35.0);
    }

    #[test]
    fn test_wraparound_timestamps() {
        // Place the exchange so every local timestamp wraps past u32::MAX.
        let mut t = simulated(640, 100_000, 250_000, 0);
        let shift = u32::MAX - t.resp_tx + 50; // resp_tx wraps
        t.poll_tx = t.poll_tx.wrapping_add(shift);
        t.resp_rx = t.resp_rx.wrapping_add(shift);
        t.final_tx = t.final_tx.wrapping_add(shift);
        t.poll_rx = t.poll_rx.wrapping_add(shift);
        t.resp_tx = t.resp_tx.wrapping_add(shift);
        t.final_rx = t.final_rx.wrapping_add(shift);
        let m = estimate(&t).unwrap();
        assert_eq!(m.tof_ticks, 640.0);
    }

    #[test]
    fn test_zero_denominator_is_failed_exchange() {
        let t = RoundTripTimes {
            poll_tx: 42,
            resp_rx: 42,
            final_tx: 42,
            poll_rx: 7,
            resp_tx: 7,
            final_rx: 7,
        };
        assert_eq!(estimate(&t), Err(EstimatorError::DegenerateTimestamps));
    }
}
