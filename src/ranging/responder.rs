//! Responder engine: the side that opens the exchange.
//!
//! The role name follows the reference sources, where the "responder"
//! application is the one that transmits first: it sends the poll carrying
//! its public-key byte, waits for the response, then answers with a delayed
//! final frame that embeds its poll-TX, response-RX and (predicted)
//! final-TX timestamps together with its shared-secret byte. The distance
//! is computed on the other side.

use crate::config::{RangingConfig, TIMESTAMP_MASK_40, UUS_TO_DWT_TIME};
use crate::crypto::KeyAgreement;
use crate::radio::{RadioError, RadioEvent, Result, Transceiver, TxMode};
use crate::ranging::ts40;
use crate::wire::{Frame, FrameKind, RX_BUF_LEN};

/// Result of one responder cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderOutcome {
    /// Poll sent, response received, final frame transmitted.
    Completed,
    /// A frame arrived whose common header does not match the response
    /// template; discarded.
    UnexpectedFrame,
    /// No response within the configured receive window.
    Timeout,
    /// Driver-reported receive error.
    LinkError,
}

/// The exchange-opening engine. Owns its radio; one exchange at a time.
pub struct Responder<R: Transceiver> {
    config: RangingConfig,
    radio: R,
    /// Frame sequence number, incremented after each transmission.
    /// Diagnostic only; survives across cycles.
    seq: u8,
    /// Fixed private exponent for reproducible exchanges; `None` draws a
    /// fresh one per cycle.
    fixed_private: Option<u64>,
}

impl<R: Transceiver> Responder<R> {
    pub fn new(config: RangingConfig, radio: R) -> Self {
        Self {
            config,
            radio,
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

    /// Run one complete cycle: send the poll, wait for the response, send
    /// the final frame.
    pub fn run_cycle(&mut self) -> Result<ResponderOutcome> {
        let keys = self.session_keys();
        self.radio.set_rx_timeout(self.config.response_rx_timeout);

        let poll = Frame::Poll {
            public_key: keys.public_byte(),
        };
        self.radio.write_tx_frame(&poll.encode(self.seq))?;
        self.radio.start_tx(TxMode::Immediate {
            response_expected: true,
        })?;
        self.seq = self.seq.wrapping_add(1);

        // The poll's TxDone and the response arrival are both observed
        // through the same event stream.
        let response = loop {
            match self.radio.wait_event()? {
                RadioEvent::TxDone => continue,
                RadioEvent::FrameReceived => {
                    let mut buf = [0u8; RX_BUF_LEN];
                    let len = self.radio.read_rx_frame(&mut buf)?;
                    match Frame::decode(&buf[..len], FrameKind::Response) {
                        Ok(frame) => break frame,
                        Err(err) => {
                            log::debug!("discarding frame ({err})");
                            return Ok(ResponderOutcome::UnexpectedFrame);
                        }
                    }
                }
                RadioEvent::RxTimeout => return Ok(self.recover(ResponderOutcome::Timeout)),
                RadioEvent::RxError => return Ok(self.recover(ResponderOutcome::LinkError)),
            }
        };
        let Frame::Response {
            public_key: peer_public,
        } = response
        else {
            return Ok(ResponderOutcome::UnexpectedFrame);
        };

        let poll_tx_ts = ts40(self.radio.read_tx_timestamp());
        let resp_rx_ts = ts40(self.radio.read_rx_timestamp());
        let shared_secret = keys.shared_secret_byte(peer_public);

        // Program the final transmission one fixed delay after response-RX.
        // The delayed-send granularity is 512 device time units, so the
        // programmed 32-bit value addresses the high bits of the 40-bit
        // timeline with its low bit dropped; the final-TX timestamp is
        // known in advance from the programmed time plus the antenna delay.
        let final_tx_time = (resp_rx_ts
            .wrapping_add(u64::from(self.config.resp_rx_to_final_tx_dly_uus) * UUS_TO_DWT_TIME)
            >> 8) as u32;
        self.radio.set_delayed_trx_time(final_tx_time);
        let final_tx_ts = ((u64::from(final_tx_time) & !1) << 8)
            .wrapping_add(self.config.tx_antenna_delay_dtu)
            & TIMESTAMP_MASK_40;

        let final_frame = Frame::Final {
            poll_tx: poll_tx_ts as u32,
            resp_rx: resp_rx_ts as u32,
            final_tx: final_tx_ts as u32,
            auth_tag: shared_secret,
        };
        self.radio.write_tx_frame(&final_frame.encode(self.seq))?;
        self.radio.start_tx(TxMode::Delayed {
            response_expected: false,
        })?;

        match self.radio.wait_event()? {
            RadioEvent::TxDone => {}
            RadioEvent::RxTimeout => return Ok(self.recover(ResponderOutcome::Timeout)),
            RadioEvent::RxError => return Ok(self.recover(ResponderOutcome::LinkError)),
            RadioEvent::FrameReceived => return Ok(ResponderOutcome::UnexpectedFrame),
        }
        self.seq = self.seq.wrapping_add(1);
        log::debug!("final frame transmitted (seq {})", self.seq);

        Ok(ResponderOutcome::Completed)
    }

    /// Run cycles forever, pausing for the inter-ranging delay between
    /// exchanges. Returns only on a driver fault.
    pub fn run(&mut self) -> std::result::Result<std::convert::Infallible, RadioError> {
        loop {
            let outcome = self.run_cycle()?;
            log::debug!("responder cycle: {outcome:?}");
            std::thread::sleep(self.config.rng_delay);
        }
    }

    /// Abort the current exchange: reset the receive path and drop pending
    /// events before the next cycle.
    fn recover(&mut self, outcome: ResponderOutcome) -> ResponderOutcome {
        self.radio.rx_reset();
        self.radio.clear_events();
        outcome
    }
}
