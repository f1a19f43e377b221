//! Radio driver contract.
//!
//! The ranging core does not talk to hardware. The embedding application (or
//! the in-memory simulator in [`sim`]) implements [`Transceiver`], a narrow
//! surface over the DW1000-class driver operations the protocol consumes:
//! enabling reception, scheduling delayed transmit/receive times, writing and
//! arming a transmit buffer, reading the raw 40-bit timestamp registers,
//! resetting the receive path, and blocking on the next link event.
//!
//! The reference implementation observes progress through level-triggered
//! interrupt flags polled in a busy loop; here that contract is a blocking
//! [`Transceiver::wait_event`] returning exactly one [`RadioEvent`] per
//! call, with stale events dropped via [`Transceiver::clear_events`] when an
//! exchange is aborted. One outstanding wait per protocol state.

pub mod sim;

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadioError {
    /// The event source is gone (driver torn down, or the simulated peer
    /// dropped its end of the link).
    #[error("radio event source disconnected")]
    Disconnected,
    /// A delayed transmission was armed for a time already in the past.
    #[error("delayed transmission time already passed")]
    LateDelayedSend,
    /// The receive buffer cannot hold the pending frame.
    #[error("receive buffer too small: frame is {frame_len} bytes, buffer {buf_len}")]
    BufferTooSmall { frame_len: usize, buf_len: usize },
}

pub type Result<T> = std::result::Result<T, RadioError>;

/// One link event, as reported by the driver's interrupt handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RadioEvent {
    /// A good frame was received and is readable via `read_rx_frame`.
    FrameReceived,
    /// No frame arrived within the configured receive window.
    RxTimeout,
    /// Driver-reported receive error (CRC/PHY failure).
    RxError,
    /// The armed transmission completed.
    TxDone,
}

/// Receive activation mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RxMode {
    Immediate,
    /// Start reception at the previously programmed delayed TRX time.
    Delayed,
}

/// Transmit activation mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxMode {
    /// Transmit as soon as possible. `response_expected` auto-enables the
    /// receiver after the configured rx-after-tx delay.
    Immediate { response_expected: bool },
    /// Transmit at the previously programmed delayed TRX time.
    Delayed { response_expected: bool },
}

/// Narrow contract over the radio driver. The application implements this.
pub trait Transceiver {
    /// Enable the receiver (immediately or at the programmed delayed time).
    fn rx_enable(&mut self, mode: RxMode) -> Result<()>;

    /// Configure the hardware receive window for subsequent waits.
    /// `None` disables the timeout (unbounded wait).
    fn set_rx_timeout(&mut self, timeout: Option<Duration>);

    /// Delay, in UWB microseconds, from the end of a transmission to the
    /// automatic receiver enable when `response_expected` is set.
    fn set_rx_after_tx_delay_uus(&mut self, delay_uus: u32);

    /// Program the delayed transmit/receive time. The value is the high 32
    /// bits of the 40-bit device time; the hardware granularity is 512
    /// device time units (the low bit is ignored).
    fn set_delayed_trx_time(&mut self, time: u32);

    /// Write a frame into the transmit buffer and arm its frame control.
    fn write_tx_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Start the armed transmission.
    fn start_tx(&mut self, mode: TxMode) -> Result<()>;

    /// Copy the pending received frame into `buf`, returning its length.
    fn read_rx_frame(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Raw 40-bit receive timestamp register, least significant byte first.
    fn read_rx_timestamp(&mut self) -> [u8; 5];

    /// Raw 40-bit transmit timestamp register, least significant byte first.
    fn read_tx_timestamp(&mut self) -> [u8; 5];

    /// Reset the receive path after a timeout or receive error.
    fn rx_reset(&mut self);

    /// Block until the next link event. Honors the configured receive
    /// timeout while the receiver is active.
    fn wait_event(&mut self) -> Result<RadioEvent>;

    /// Drop any events observed but not yet consumed, so a stale flag cannot
    /// re-trigger the next wait.
    fn clear_events(&mut self);
}

/// Output seam for the binary "verified proximity" signal (GPIO/LED in the
/// reference deployment). The application implements this; any `FnMut(bool)`
/// works.
pub trait ProximityIndicator {
    fn set_verified(&mut self, verified: bool);
}

impl<F: FnMut(bool)> ProximityIndicator for F {
    fn set_verified(&mut self, verified: bool) {
        self(verified)
    }
}

/// Indicator that discards the signal. Useful for responder-only deployments
/// and tests that only care about outcomes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndicator;

impl ProximityIndicator for NullIndicator {
    fn set_verified(&mut self, _verified: bool) {}
}
