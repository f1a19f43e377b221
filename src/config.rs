//! Process-wide ranging configuration and physical constants.
//!
//! The defaults reproduce the constants of the reference DW1000 deployment:
//! an 80 ms inter-ranging delay, the poll→response and response→final
//! turnaround delays in UWB microseconds, a 1 m proximity threshold, and the
//! toy Diffie-Hellman parameters (p = 29, g = 5) used for the authentication
//! overlay.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::crypto::DhParams;

/// UWB microsecond (uus) to device time unit (dtu) conversion factor.
/// 1 uus = 512 / 499.2 µs and 1 µs = 499.2 × 128 dtu.
pub const UUS_TO_DWT_TIME: u64 = 65536;

/// Duration of one device time unit in seconds (~15.65 ps).
pub const DWT_TIME_UNITS_SECS: f64 = 1.0 / (128.0 * 499.2e6);

/// Speed of light in air, in metres per second.
pub const SPEED_OF_LIGHT_M_S: f64 = 299_702_547.0;

/// Hardware timestamps are 40 bits wide.
pub const TIMESTAMP_MASK_40: u64 = 0xFF_FFFF_FFFF;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("proximity threshold must be positive (got {0})")]
    InvalidThreshold(f64),
    #[error("DH modulus must be greater than 1 (got {0})")]
    InvalidModulus(u64),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration shared by both ranging engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangingConfig {
    /// Delay between ranging exchanges (throttles the retry rate).
    pub rng_delay: Duration,

    /// Delay from poll reception to the scheduled response transmission, in
    /// UWB microseconds. Must leave the slower side enough time to parse the
    /// poll and arm the delayed send.
    pub poll_rx_to_resp_tx_dly_uus: u32,

    /// Delay from response reception to the scheduled final transmission, in
    /// UWB microseconds.
    pub resp_rx_to_final_tx_dly_uus: u32,

    /// Delay from the end of the response transmission to re-enabling the
    /// receiver for the final frame, in UWB microseconds.
    pub resp_tx_to_final_rx_dly_uus: u32,

    /// Hardware receive window while waiting for the response frame
    /// (responder side). `None` leaves the wait unbounded.
    pub response_rx_timeout: Option<Duration>,

    /// Hardware receive window while waiting for the final frame. `None`
    /// leaves the wait unbounded, as the reference deployment does.
    pub final_rx_timeout: Option<Duration>,

    /// Distance below which the "verified proximity" output is asserted,
    /// in metres.
    pub proximity_threshold_m: f64,

    /// TX antenna delay in device time units, added to the programmed
    /// delayed-send time to predict the final-TX timestamp.
    pub tx_antenna_delay_dtu: u64,

    /// Key-agreement parameters (small, fixed, public — see [`DhParams`]).
    pub dh: DhParams,
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            rng_delay: Duration::from_millis(80),
            poll_rx_to_resp_tx_dly_uus: 1200,
            resp_rx_to_final_tx_dly_uus: 4000,
            resp_tx_to_final_rx_dly_uus: 500,
            response_rx_timeout: None,
            final_rx_timeout: None,
            proximity_threshold_m: 1.0,
            tx_antenna_delay_dtu: 16436,
            dh: DhParams::default(),
        }
    }
}

impl RangingConfig {
    /// Load a configuration from a JSON document. Missing fields fall back
    /// to the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.proximity_threshold_m <= 0.0 {
            return Err(ConfigError::InvalidThreshold(self.proximity_threshold_m));
        }
        if self.dh.prime < 2 {
            return Err(ConfigError::InvalidModulus(self.dh.prime));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_reference_constants() {
        let config = RangingConfig::default();
        assert_eq!(config.rng_delay, Duration::from_millis(80));
        assert_eq!(config.poll_rx_to_resp_tx_dly_uus, 1200);
        assert_eq!(config.resp_rx_to_final_tx_dly_uus, 4000);
        assert_eq!(config.resp_tx_to_final_rx_dly_uus, 500);
        assert_eq!(config.proximity_threshold_m, 1.0);
        assert_eq!(config.dh.prime, 29);
        assert_eq!(config.dh.generator, 5);
    }

    #[test]
    fn test_json_round_trip() {
        let config = RangingConfig {
            proximity_threshold_m: 2.5,
            ..RangingConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back = RangingConfig::from_json(&json).unwrap();
        assert_eq!(back.proximity_threshold_m, 2.5);
        assert_eq!(back.poll_rx_to_resp_tx_dly_uus, 1200);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = RangingConfig::from_json(r#"{"proximity_threshold_m": 3.0}"#).unwrap();
        assert_eq!(config.proximity_threshold_m, 3.0);
        assert_eq!(config.resp_rx_to_final_tx_dly_uus, 4000);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let result = RangingConfig::from_json(r#"{"proximity_threshold_m": -1.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_one_dtu_is_about_15_65_ps() {
        assert!((DWT_TIME_UNITS_SECS - 15.65e-12).abs() < 0.01e-12);
    }
}
