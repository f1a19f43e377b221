//! Initiator engine: the side that computes the distance.
//!
//! Despite the role name, this engine is passive at the start of each cycle
//! (the reference sources' arrangement): it waits for the poll, answers with
//! a delayed response carrying its public-key byte, waits for the final
//! frame, and then evaluates the estimator and the authentication gate.
//!
//! All protocol-level failures — unexpected frame, receive timeout, receive
//! error, degenerate timestamps, authentication mismatch — are cycle
//! outcomes, not errors: the engine resets its receive state and the next
//! cycle starts clean. Only a driver fault ([`RadioError`]) propagates.

use subtle::ConstantTimeEq;

use crate::config::{RangingConfig, UUS_TO_DWT_TIME};
use crate::crypto::KeyAgreement;
use crate::radio::{
    ProximityIndicator, RadioError, RadioEvent, Result, RxMode, Transceiver, TxMode,
};
use crate::ranging::estimator::{estimate, Measurement, RoundTripTimes};
use crate::ranging::ts40;
use crate::wire::{Frame, FrameKind, RX_BUF_LEN};

/// Result of one initiator cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Authentication matched and the distance is below the proximity
    /// threshold; the indicator was asserted.
    Verified(Measurement),
    /// Authentication matched but the peer is beyond the threshold; the
    /// indicator was cleared.
    OutOfRange(Measurement),
    /// The peer's authentication byte disagrees with the locally derived
    /// shared secret. The distance is still computed and reported, but the
    /// indicator is left untouched — the gate withholds the side effect, it
    /// never aborts the protocol.
    AuthFailed(Measurement),
    /// A frame arrived whose common header does not match the expected
    /// template; discarded.
    UnexpectedFrame,
    /// No frame within the configured receive window.
    Timeout,
    /// Driver-reported receive error.
    LinkError,
    /// The estimator denominator was zero; no distance for this cycle.
    Degenerate,
}

/// The distance-computing engine. Owns its radio and the proximity
/// indicator; one exchange at a time.
pub struct Initiator<R: Transceiver, I: ProximityIndicator> {
    config: RangingConfig,
    radio: R,
    indicator: I,
    /// Frame sequence number, incremented after each transmission.
    /// Diagnostic only; survives across cycles.
    seq: u8,
    /// Fixed private exponent for reproducible exchanges; `None` draws a
    /// fresh one per cycle.
    fixed_private: Option<u64>,
}

impl<R: Transceiver, I: ProximityIndicator> Initiator<R, I> {
    pub fn new(config: RangingConfig, radio: R, indicator: I) -> Self {
        Self {
            config,
            radio,
            indicator,
            seq: 0,
            fixed_private: None,
        }
    }

    /// Use a fixed private exponent instead of a per-cycle random draw.
    /// Intended for commissioning and tests that need reproducible tags.
    pub fn with_fixed_private(mut self, private: u64) -> Self {
        self.fixed_private = Some(private);
        self
    }

    /// Current frame sequence number.
    pub fn seq(&self) -> u8 {
        self.seq
    }

    fn session_keys(&self) -> KeyAgreement {
        match self.fixed_private {
            Some(private) => KeyAgreement::with_private(self.config.dh, private),
            None => KeyAgreement::generate(self.config.dh, &mut rand::thread_rng()),
        }
    }

    /// Run one complete ranging cycle: wait for the poll, respond, wait for
    /// the final frame, estimate, gate.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome> {
        // Fresh session: new key draw, receiver armed with no window on the
        // poll wait (reference behavior). Error paths cleared their events
        // before ending the previous cycle.
        let keys = self.session_keys();
        self.radio.set_rx_timeout(None);
        self.radio.rx_enable(RxMode::Immediate)?;

        let poll = match self.await_frame(FrameKind::Poll)? {
            Ok(frame) => frame,
            Err(outcome) => return Ok(outcome),
        };
        let Frame::Poll {
            public_key: peer_public,
        } = poll
        else {
            return Ok(CycleOutcome::UnexpectedFrame);
        };

        let poll_rx_ts = ts40(self.radio.read_rx_timestamp());
        let shared_secret = keys.shared_secret_byte(peer_public);

        // Schedule the response at poll-RX plus the configured turnaround,
        // and arm the receiver for the final frame behind it.
        let resp_tx_time = (poll_rx_ts
            .wrapping_add(u64::from(self.config.poll_rx_to_resp_tx_dly_uus) * UUS_TO_DWT_TIME)
            >> 8) as u32;
        self.radio.set_delayed_trx_time(resp_tx_time);
        self.radio
            .set_rx_after_tx_delay_uus(self.config.resp_tx_to_final_rx_dly_uus);
        self.radio.set_rx_timeout(self.config.final_rx_timeout);

        let response = Frame::Response {
            public_key: keys.public_byte(),
        };
        self.radio.write_tx_frame(&response.encode(self.seq))?;
        self.radio.start_tx(TxMode::Delayed {
            response_expected: true,
        })?;

        match self.radio.wait_event()? {
            RadioEvent::TxDone => {}
            RadioEvent::RxTimeout => return Ok(self.recover(CycleOutcome::Timeout)),
            RadioEvent::RxError => return Ok(self.recover(CycleOutcome::LinkError)),
            RadioEvent::FrameReceived => return Ok(CycleOutcome::UnexpectedFrame),
        }
        self.seq = self.seq.wrapping_add(1);
        log::debug!("response transmitted (seq {})", self.seq);

        let final_frame = match self.await_frame(FrameKind::Final)? {
            Ok(frame) => frame,
            Err(outcome) => return Ok(outcome),
        };
        let Frame::Final {
            poll_tx,
            resp_rx,
            final_tx,
            auth_tag,
        } = final_frame
        else {
            return Ok(CycleOutcome::UnexpectedFrame);
        };

        // Local timestamps come from the radio's registers, not the frame.
        let resp_tx_ts = ts40(self.radio.read_tx_timestamp());
        let final_rx_ts = ts40(self.radio.read_rx_timestamp());

        let times = RoundTripTimes {
            poll_tx,
            resp_rx,
            final_tx,
            poll_rx: poll_rx_ts as u32,
            resp_tx: resp_tx_ts as u32,
            final_rx: final_rx_ts as u32,
        };
        let measurement = match estimate(&times) {
            Ok(m) => m,
            Err(err) => {
                log::warn!("exchange failed: {err}");
                return Ok(self.recover(CycleOutcome::Degenerate));
            }
        };

        let auth_ok: bool = auth_tag.ct_eq(&shared_secret).into();
        if auth_ok {
            let in_range = measurement.distance_m < self.config.proximity_threshold_m;
            self.indicator.set_verified(in_range);
            log::info!(
                "distance {:.3} m ({})",
                measurement.distance_m,
                if in_range { "verified" } else { "out of range" }
            );
            Ok(if in_range {
                CycleOutcome::Verified(measurement)
            } else {
                CycleOutcome::OutOfRange(measurement)
            })
        } else {
            log::warn!(
                "authentication mismatch: peer tag {auth_tag}, local secret {shared_secret}"
            );
            Ok(CycleOutcome::AuthFailed(measurement))
        }
    }

    /// Run cycles forever, pausing for the inter-ranging delay between
    /// exchanges. Returns only on a driver fault.
    pub fn run(&mut self) -> std::result::Result<std::convert::Infallible, RadioError> {
        loop {
            let outcome = self.run_cycle()?;
            log::debug!("initiator cycle: {outcome:?}");
            std::thread::sleep(self.config.rng_delay);
        }
    }

    /// Wait for the next receive event and decode the expected frame.
    /// `Err(outcome)` carries the cycle outcome for non-frame events and
    /// header mismatches.
    fn await_frame(
        &mut self,
        expected: FrameKind,
    ) -> Result<std::result::Result<Frame, CycleOutcome>> {
        match self.radio.wait_event()? {
            RadioEvent::FrameReceived => {}
            RadioEvent::RxTimeout => return Ok(Err(self.recover(CycleOutcome::Timeout))),
            RadioEvent::RxError => return Ok(Err(self.recover(CycleOutcome::LinkError))),
            RadioEvent::TxDone => return Ok(Err(CycleOutcome::UnexpectedFrame)),
        }
        let mut buf = [0u8; RX_BUF_LEN];
        let len = self.radio.read_rx_frame(&mut buf)?;
        match Frame::decode(&buf[..len], expected) {
            Ok(frame) => Ok(Ok(frame)),
            Err(err) => {
                log::debug!(
                    "discarding frame ({err}); raw: {}",
                    hex::encode(&buf[..len])
                );
                Ok(Err(CycleOutcome::UnexpectedFrame))
            }
        }
    }

    /// Abort the current exchange: reset the receive path and drop any
    /// pending events so a stale flag cannot re-trigger the next wait.
    fn recover(&mut self, outcome: CycleOutcome) -> CycleOutcome {
        self.radio.rx_reset();
        self.radio.clear_events();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::sim::{SimLink, SimLinkConfig};
    use crate::radio::NullIndicator;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config() -> RangingConfig {
        RangingConfig {
            final_rx_timeout: Some(Duration::from_millis(20)),
            ..RangingConfig::default()
        }
    }

    #[test]
    fn test_unexpected_frame_is_discarded() {
        let (mut radio, _peer) = SimLink::pair(SimLinkConfig::default());
        // A response frame where a poll is expected.
        radio.inject_frame(Frame::Response { public_key: 1 }.encode(0));
        let mut engine = Initiator::new(test_config(), radio, NullIndicator);
        assert_eq!(engine.run_cycle().unwrap(), CycleOutcome::UnexpectedFrame);
    }

    #[test]
    fn test_final_never_arrives_times_out_without_signal() {
        let (mut radio, _peer) = SimLink::pair(SimLinkConfig::default());
        radio.inject_frame(Frame::Poll { public_key: 13 }.encode(0));

        let signals = Arc::new(AtomicU32::new(0));
        let counter = signals.clone();
        let indicator = move |_verified: bool| {
            counter.fetch_add(1, Ordering::SeqCst);
        };

        let mut engine = Initiator::new(test_config(), radio, indicator);
        assert_eq!(engine.run_cycle().unwrap(), CycleOutcome::Timeout);
        // No distance, no verified signal for the aborted cycle.
        assert_eq!(signals.load(Ordering::SeqCst), 0);
        // The response did go out, so the sequence number advanced.
        assert_eq!(engine.seq(), 1);
    }

    #[test]
    fn test_receive_error_aborts_cycle() {
        let (mut radio, _peer) = SimLink::pair(SimLinkConfig::default());
        radio.inject_event(RadioEvent::RxError);
        let mut engine = Initiator::new(test_config(), radio, NullIndicator);
        assert_eq!(engine.run_cycle().unwrap(), CycleOutcome::LinkError);
    }

    #[test]
    fn test_poll_header_mutation_rejected() {
        let (mut radio, _peer) = SimLink::pair(SimLinkConfig::default());
        let mut poll = Frame::Poll { public_key: 13 }.encode(0);
        poll[4] ^= 0xFF; // corrupt one PAN byte
        radio.inject_frame(poll);
        let mut engine = Initiator::new(test_config(), radio, NullIndicator);
        assert_eq!(engine.run_cycle().unwrap(), CycleOutcome::UnexpectedFrame);
    }

    #[test]
    fn test_sequence_number_wraps() {
        let (mut radio, _peer) = SimLink::pair(SimLinkConfig::default());
        radio.inject_frame(Frame::Poll { public_key: 13 }.encode(0));
        let mut engine = Initiator::new(test_config(), radio, NullIndicator);
        engine.seq = u8::MAX;
        let _ = engine.run_cycle().unwrap();
        assert_eq!(engine.seq(), 0);
    }
}
