//! In-memory simulated radio link.
//!
//! [`SimLink::pair`] builds two [`Transceiver`] implementations joined by
//! channels over a virtual air with a configurable one-way flight time. The
//! virtual timeline is counted in device time units (dtu) and reproduces the
//! timing contract the engines rely on:
//!
//! - each device sees the shared air time shifted by its own clock offset,
//!   so the two sides never agree on absolute timestamps;
//! - a delayed transmission leaves the antenna at the programmed time
//!   rounded down to the 512-dtu hardware granularity, plus the antenna
//!   delay — exactly the value the responder predicts for its final-TX
//!   timestamp;
//! - a reception is stamped one flight time after the transmission.
//!
//! Nothing here sleeps: virtual time advances as frames fly, which keeps
//! tests deterministic and instant. Frames transmitted before the peer
//! enables reception are buffered by the link (the driver is assumed
//! reliable; loss is exercised by simply not sending).

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::TIMESTAMP_MASK_40;
use crate::radio::{RadioError, RadioEvent, Result, RxMode, Transceiver, TxMode};

/// Timing parameters of the simulated link.
#[derive(Debug, Clone, Copy)]
pub struct SimLinkConfig {
    /// One-way propagation time, in device time units.
    pub flight_time_dtu: u64,
    /// Clock offset of side A relative to the air timeline.
    pub clock_offset_a_dtu: u64,
    /// Clock offset of side B relative to the air timeline.
    pub clock_offset_b_dtu: u64,
    /// TX antenna delay added to the programmed time of a delayed send.
    pub tx_antenna_delay_dtu: u64,
    /// Virtual processing time consumed by an immediate transmission.
    pub turnaround_dtu: u64,
}

impl Default for SimLinkConfig {
    fn default() -> Self {
        Self {
            // ~213 dtu per metre of range; 320 dtu ≈ 1.5 m.
            flight_time_dtu: 320,
            clock_offset_a_dtu: 0x0001_2345_6789,
            clock_offset_b_dtu: 0x0007_0BAD_CAFE,
            tx_antenna_delay_dtu: 16436,
            turnaround_dtu: 50_000,
        }
    }
}

struct AirMsg {
    bytes: Vec<u8>,
    /// Air-timeline instant the frame left the antenna.
    tx_air: u64,
}

/// Factory for a connected pair of simulated transceivers.
pub struct SimLink;

impl SimLink {
    pub fn pair(config: SimLinkConfig) -> (SimTransceiver, SimTransceiver) {
        let air_now = Arc::new(Mutex::new(0x10_0000u64));
        let (a_out, b_in) = mpsc::channel();
        let (b_out, a_in) = mpsc::channel();
        let a = SimTransceiver::new(
            "sim-a",
            config,
            config.clock_offset_a_dtu,
            air_now.clone(),
            a_out,
            a_in,
        );
        let b = SimTransceiver::new(
            "sim-b",
            config,
            config.clock_offset_b_dtu,
            air_now,
            b_out,
            b_in,
        );
        (a, b)
    }
}

/// One end of the simulated link.
pub struct SimTransceiver {
    label: &'static str,
    config: SimLinkConfig,
    clock_offset: u64,
    air_now: Arc<Mutex<u64>>,
    link_tx: Sender<AirMsg>,
    link_rx: Receiver<AirMsg>,

    pending: VecDeque<RadioEvent>,
    /// Frames placed on the air directly by tests, consumed ahead of the
    /// link channel. Unlike `pending`, these survive `clear_events` — they
    /// model traffic in flight, not latched event flags.
    injected: VecDeque<AirMsg>,
    tx_buffer: Option<Vec<u8>>,
    rx_frame: Option<Vec<u8>>,
    tx_ts: u64,
    rx_ts: u64,
    delayed_trx_time: u32,
    rx_after_tx_delay_uus: u32,
    rx_timeout: Option<Duration>,
}

fn wrap40(value: u64) -> u64 {
    value & TIMESTAMP_MASK_40
}

impl SimTransceiver {
    fn new(
        label: &'static str,
        config: SimLinkConfig,
        clock_offset: u64,
        air_now: Arc<Mutex<u64>>,
        link_tx: Sender<AirMsg>,
        link_rx: Receiver<AirMsg>,
    ) -> Self {
        Self {
            label,
            config,
            clock_offset,
            air_now,
            link_tx,
            link_rx,
            pending: VecDeque::new(),
            injected: VecDeque::new(),
            tx_buffer: None,
            rx_frame: None,
            tx_ts: 0,
            rx_ts: 0,
            delayed_trx_time: 0,
            rx_after_tx_delay_uus: 0,
            rx_timeout: None,
        }
    }

    fn local_time(&self, air: u64) -> u64 {
        wrap40(air.wrapping_add(self.clock_offset))
    }

    /// Put a raw frame on the air in front of this receiver, as if the peer
    /// had just transmitted it. Test hook for malformed/unexpected frames
    /// without a second engine.
    pub fn inject_frame(&mut self, bytes: Vec<u8>) {
        let tx_air = *self.air_now.lock().unwrap();
        self.injected.push_back(AirMsg { bytes, tx_air });
    }

    /// Queue a bare link event (e.g. a receive error). Test hook.
    pub fn inject_event(&mut self, event: RadioEvent) {
        self.pending.push_back(event);
    }

    fn accept(&mut self, msg: AirMsg) -> RadioEvent {
        let rx_air = msg.tx_air.wrapping_add(self.config.flight_time_dtu);
        {
            let mut now = self.air_now.lock().unwrap();
            *now = rx_air;
        }
        self.rx_ts = self.local_time(rx_air);
        log::debug!(
            "{}: frame received ({} bytes) at local ts {:#012x}",
            self.label,
            msg.bytes.len(),
            self.rx_ts
        );
        self.rx_frame = Some(msg.bytes);
        RadioEvent::FrameReceived
    }
}

impl Transceiver for SimTransceiver {
    fn rx_enable(&mut self, _mode: RxMode) -> Result<()> {
        Ok(())
    }

    fn set_rx_timeout(&mut self, timeout: Option<Duration>) {
        self.rx_timeout = timeout;
    }

    fn set_rx_after_tx_delay_uus(&mut self, delay_uus: u32) {
        self.rx_after_tx_delay_uus = delay_uus;
    }

    fn set_delayed_trx_time(&mut self, time: u32) {
        self.delayed_trx_time = time;
    }

    fn write_tx_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.tx_buffer = Some(frame.to_vec());
        Ok(())
    }

    fn start_tx(&mut self, mode: TxMode) -> Result<()> {
        let bytes = self.tx_buffer.take().ok_or(RadioError::Disconnected)?;
        let tx_air = match mode {
            TxMode::Immediate { .. } => {
                let mut now = self.air_now.lock().unwrap();
                *now = now.wrapping_add(self.config.turnaround_dtu);
                *now
            }
            TxMode::Delayed { .. } => {
                // Hardware granularity: the low bit of the programmed value
                // is dropped, then the 32-bit value addresses the high bits
                // of the 40-bit timeline.
                let programmed = (u64::from(self.delayed_trx_time) & !1) << 8;
                let local = wrap40(programmed.wrapping_add(self.config.tx_antenna_delay_dtu));
                let air = wrap40(local.wrapping_sub(self.clock_offset));
                let mut now = self.air_now.lock().unwrap();
                *now = air;
                air
            }
        };
        self.tx_ts = self.local_time(tx_air);
        log::debug!(
            "{}: tx {} bytes at local ts {:#012x}",
            self.label,
            bytes.len(),
            self.tx_ts
        );
        self.pending.push_back(RadioEvent::TxDone);
        // A dropped peer only matters once someone waits on that side.
        let _ = self.link_tx.send(AirMsg { bytes, tx_air });
        Ok(())
    }

    fn read_rx_frame(&mut self, buf: &mut [u8]) -> Result<usize> {
        let frame = self.rx_frame.as_ref().ok_or(RadioError::Disconnected)?;
        if frame.len() > buf.len() {
            return Err(RadioError::BufferTooSmall {
                frame_len: frame.len(),
                buf_len: buf.len(),
            });
        }
        buf[..frame.len()].copy_from_slice(frame);
        Ok(frame.len())
    }

    fn read_rx_timestamp(&mut self) -> [u8; 5] {
        ts_register(self.rx_ts)
    }

    fn read_tx_timestamp(&mut self) -> [u8; 5] {
        ts_register(self.tx_ts)
    }

    fn rx_reset(&mut self) {
        self.rx_frame = None;
    }

    fn wait_event(&mut self) -> Result<RadioEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        if let Some(msg) = self.injected.pop_front() {
            return Ok(self.accept(msg));
        }
        match self.rx_timeout {
            Some(timeout) => match self.link_rx.recv_timeout(timeout) {
                Ok(msg) => Ok(self.accept(msg)),
                Err(RecvTimeoutError::Timeout) => {
                    log::debug!("{}: rx timeout after {:?}", self.label, timeout);
                    Ok(RadioEvent::RxTimeout)
                }
                Err(RecvTimeoutError::Disconnected) => Err(RadioError::Disconnected),
            },
            None => match self.link_rx.recv() {
                Ok(msg) => Ok(self.accept(msg)),
                Err(_) => Err(RadioError::Disconnected),
            },
        }
    }

    fn clear_events(&mut self) {
        // Frames already in flight are not dropped: the link, like the real
        // receiver, holds a good frame until the engine reads or resets it.
        self.pending.clear();
    }
}

fn ts_register(ts: u64) -> [u8; 5] {
    let bytes = ts.to_le_bytes();
    [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_tx_reaches_peer_with_flight_delay() {
        let config = SimLinkConfig {
            flight_time_dtu: 640,
            clock_offset_a_dtu: 0,
            clock_offset_b_dtu: 0,
            ..SimLinkConfig::default()
        };
        let (mut a, mut b) = SimLink::pair(config);

        a.write_tx_frame(&[1, 2, 3]).unwrap();
        a.start_tx(TxMode::Immediate {
            response_expected: false,
        })
        .unwrap();
        assert_eq!(a.wait_event().unwrap(), RadioEvent::TxDone);

        b.set_rx_timeout(Some(Duration::from_millis(100)));
        assert_eq!(b.wait_event().unwrap(), RadioEvent::FrameReceived);

        let mut buf = [0u8; 8];
        let n = b.read_rx_frame(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);

        // With zero clock offsets the rx stamp trails the tx stamp by
        // exactly the flight time.
        let tx = u64::from_le_bytes({
            let mut w = [0u8; 8];
            w[..5].copy_from_slice(&a.read_tx_timestamp());
            w
        });
        let rx = u64::from_le_bytes({
            let mut w = [0u8; 8];
            w[..5].copy_from_slice(&b.read_rx_timestamp());
            w
        });
        assert_eq!(rx.wrapping_sub(tx), 640);
    }

    #[test]
    fn test_delayed_tx_timestamp_matches_programmed_time() {
        let config = SimLinkConfig {
            clock_offset_a_dtu: 0,
            clock_offset_b_dtu: 0,
            ..SimLinkConfig::default()
        };
        let (mut a, _b) = SimLink::pair(config);

        let programmed: u32 = 0x0123_4567;
        a.set_delayed_trx_time(programmed);
        a.write_tx_frame(&[0xAA]).unwrap();
        a.start_tx(TxMode::Delayed {
            response_expected: false,
        })
        .unwrap();

        let expected = ((u64::from(programmed) & !1) << 8) + config.tx_antenna_delay_dtu;
        let mut w = [0u8; 8];
        w[..5].copy_from_slice(&a.read_tx_timestamp());
        assert_eq!(u64::from_le_bytes(w), expected & TIMESTAMP_MASK_40);
    }

    #[test]
    fn test_rx_timeout_when_nothing_transmitted() {
        let (mut a, _b) = SimLink::pair(SimLinkConfig::default());
        a.set_rx_timeout(Some(Duration::from_millis(10)));
        assert_eq!(a.wait_event().unwrap(), RadioEvent::RxTimeout);
    }

    #[test]
    fn test_disconnected_peer_surfaces_as_radio_error() {
        let (mut a, b) = SimLink::pair(SimLinkConfig::default());
        drop(b);
        a.set_rx_timeout(None);
        assert!(matches!(a.wait_event(), Err(RadioError::Disconnected)));
    }

    #[test]
    fn test_injected_event_consumed_once() {
        let (mut a, _b) = SimLink::pair(SimLinkConfig::default());
        a.inject_event(RadioEvent::RxError);
        a.set_rx_timeout(Some(Duration::from_millis(10)));
        assert_eq!(a.wait_event().unwrap(), RadioEvent::RxError);
        assert_eq!(a.wait_event().unwrap(), RadioEvent::RxTimeout);
    }
}
