//! Driver configuration parameters.
//!
//! All tunable timing for both read strategies. Defaults carry the reference
//! protocol constants; `validate()` rejects values that would break the read
//! cycle rather than silently clamping them.

use serde::{Deserialize, Serialize};

use crate::error::{DhtError, Result};

/// Startup read delay applied when a config asks for the default (`0`).
pub const DEFAULT_STARTUP_DELAY_MS: u32 = 5000;

/// Configuration for the non-blocking (interrupt-driven) driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhtConfig {
    /// Per-cycle deadline: the whole handshake plus 40 bits must complete
    /// within this window or the cycle is abandoned.
    pub timeout_ms: u32,
    /// Delay before the very first read. `0` selects
    /// [`DEFAULT_STARTUP_DELAY_MS`].
    pub startup_delay_ms: u32,
    /// Period between full rounds when auto-reading. `0` disables auto-read;
    /// the application then calls `start_read()` explicitly.
    pub auto_read_period_ms: u32,
    /// Gap between two sensors within one round.
    pub inter_sensor_gap_ms: u32,
    /// Hold-off after a failed cycle before the next attempt.
    pub cooldown_ms: u32,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 100,
            startup_delay_ms: DEFAULT_STARTUP_DELAY_MS,
            auto_read_period_ms: 5000,
            inter_sensor_gap_ms: 2,
            cooldown_ms: 1200,
        }
    }
}

impl DhtConfig {
    /// Range-check the configuration.
    ///
    /// A full round takes up to ~2.1 s with retries, so the auto-read period
    /// must be 0 (disabled) or at least 2100 ms.
    pub fn validate(&self) -> Result<()> {
        if self.auto_read_period_ms != 0 && self.auto_read_period_ms < 2100 {
            return Err(DhtError::InvalidConfig);
        }
        if self.timeout_ms == 0 || self.cooldown_ms == 0 {
            return Err(DhtError::InvalidConfig);
        }
        Ok(())
    }
}

/// Configuration for the blocking driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingConfig {
    /// Delay before the first read is allowed. `0` selects
    /// [`DEFAULT_STARTUP_DELAY_MS`].
    pub startup_delay_ms: u32,
    /// How long the power switch stays off during power-cycle recovery.
    pub power_reset_ms: u32,
    /// Settle time after power is restored before the next read is allowed.
    pub reset_read_delay_ms: u32,
    /// Delay after a bit's rising edge before sampling the line. A zero bit
    /// holds high 26–28 µs and a one bit ~70 µs, so 35 µs lands between.
    pub bit_settle_us: u32,
    /// Busy-wait budget for each expected edge.
    pub edge_timeout_us: u32,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: DEFAULT_STARTUP_DELAY_MS,
            power_reset_ms: 2000,
            reset_read_delay_ms: 2000,
            bit_settle_us: 35,
            edge_timeout_us: 100,
        }
    }
}

impl BlockingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.edge_timeout_us == 0 || self.bit_settle_us == 0 {
            return Err(DhtError::InvalidConfig);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = DhtConfig::default();
        assert!(c.validate().is_ok());
        assert!(c.timeout_ms > 0);
        assert!(c.auto_read_period_ms == 0 || c.auto_read_period_ms >= 2100);
        assert!(c.cooldown_ms >= c.timeout_ms);

        let b = BlockingConfig::default();
        assert!(b.validate().is_ok());
        assert!(b.bit_settle_us > 28, "must sample after a zero bit ends");
        assert!(b.bit_settle_us < 70, "must sample before a one bit ends");
    }

    #[test]
    fn short_auto_read_period_rejected() {
        let c = DhtConfig {
            auto_read_period_ms: 1000,
            ..DhtConfig::default()
        };
        assert_eq!(c.validate(), Err(DhtError::InvalidConfig));

        let c = DhtConfig {
            auto_read_period_ms: 0,
            ..DhtConfig::default()
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn serde_roundtrip() {
        let c = DhtConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: DhtConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.timeout_ms, c2.timeout_ms);
        assert_eq!(c.auto_read_period_ms, c2.auto_read_period_ms);
        assert_eq!(c.cooldown_ms, c2.cooldown_ms);
    }

    #[test]
    fn postcard_roundtrip() {
        let b = BlockingConfig::default();
        let bytes = postcard::to_allocvec(&b).unwrap();
        let b2: BlockingConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(b.power_reset_ms, b2.power_reset_ms);
        assert_eq!(b.bit_settle_us, b2.bit_settle_us);
    }
}
