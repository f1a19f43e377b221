//! # UWB TWR
//!
//! **Single-sided two-way ranging (SS-TWR) protocol core with a lightweight
//! shared-secret proximity gate.**
//!
//! Two radio nodes time a three-message exchange — poll, response, final —
//! and turn the four resulting round-trip timestamps into a distance
//! estimate. Overlaid on the same frames, a toy Diffie-Hellman agreement
//! produces a one-byte tag that gates whether the computed distance drives
//! the "verified proximity" output.
//!
//! The radio transceiver driver, the task scheduler and the GPIO output are
//! *not* part of this crate: they are consumed through the
//! [`radio::Transceiver`] and [`radio::ProximityIndicator`] contracts, which
//! the embedding application (or the bundled in-memory simulator) implements.
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`wire`] | Frame templates and the poll/response/final codec |
//! | [`crypto`] | Modular exponentiation and the per-exchange key agreement |
//! | [`ranging`] | The two protocol engines and the distance estimator |
//! | [`radio`] | Driver contract, link events, and the simulated link |
//! | [`config`] | Delays, thresholds, DH parameters, physical constants |
//!
//! ## Quick start
//!
//! ```rust
//! use uwb_twr::config::RangingConfig;
//! use uwb_twr::radio::sim::{SimLink, SimLinkConfig};
//! use uwb_twr::radio::NullIndicator;
//! use uwb_twr::ranging::{Initiator, Responder};
//!
//! let (side_a, side_b) = SimLink::pair(SimLinkConfig::default());
//! let mut responder = Responder::new(RangingConfig::default(), side_b);
//! let mut initiator = Initiator::new(RangingConfig::default(), side_a, NullIndicator);
//! // Run one engine per thread; each `run_cycle` completes one exchange.
//! ```
//!
//! ## Security
//!
//! The key agreement here (p = 29, g = 5, one public byte on the wire) is a
//! pairing/liveness check, **not** cryptographic authentication — see the
//! [`crypto`] module docs before relying on the verified signal.

// ── Public modules ──────────────────────────────────────────────────────────

/// Ranging configuration and physical constants.
pub mod config;

/// Modular exponentiation and the Diffie-Hellman overlay.
pub mod crypto;

/// Radio driver contract, link events, and the in-memory simulated link.
pub mod radio;

/// The initiator/responder engines and the time-of-flight estimator.
pub mod ranging;

/// Frame layouts and codec for the three-message exchange.
pub mod wire;

// ── Re-exports for convenience ──────────────────────────────────────────────

pub use config::RangingConfig;
pub use crypto::{mod_pow, DhParams, KeyAgreement};
pub use radio::{ProximityIndicator, RadioError, RadioEvent, Transceiver};
pub use ranging::{
    estimate, CycleOutcome, Initiator, Measurement, Responder, ResponderOutcome, RoundTripTimes,
};
pub use wire::{Frame, FrameError, FrameKind};

// ── Library metadata ────────────────────────────────────────────────────────

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version string.
pub fn version() -> &'static str {
    VERSION
}

// ── Tests ───────────────────────────────────────────────────────────────────
