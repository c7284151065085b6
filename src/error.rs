//! Unified error type for the DHT driver.
//!
//! Every fault in both read strategies funnels into [`DhtError`], keeping the
//! caller's handling uniform. All variants are `Copy` so they can cross the
//! deferred/polled boundary through a single atomic without allocation. None
//! of them is fatal: the driver always recovers locally (cooldown or power
//! cycle) and the next read attempt is legal.

use core::fmt;

/// Errors reported by the blocking read call and recorded by the
/// non-blocking cycle.
///
/// The discriminants are stable: `0` is reserved as "no fault" so a pending
/// fault can live in an `AtomicU8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DhtError {
    /// A read is already in progress, or the recovery delay has not expired.
    Busy = 1,
    /// The sensor slot is unconfigured, out of range, or the GPIO handle
    /// failed to resolve.
    InvalidPort = 2,
    /// The line reads low when it should idle high: wedged sensor or
    /// wiring fault.
    PortLow = 3,
    /// Timed out waiting for an expected edge from the sensor.
    NoResponse = 4,
    /// Checksum mismatch on an otherwise well-formed 40-bit frame.
    Crc = 5,
    /// A pulse shorter than the protocol minimum (line noise).
    PulseTooShort = 6,
    /// A pulse longer than any valid bit (lost synchronisation).
    PulseTooLong = 7,
    /// A configuration value failed range validation.
    InvalidConfig = 8,
}

impl DhtError {
    /// Inverse of `self as u8`. `0` and unknown values map to `None`.
    pub(crate) fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Busy),
            2 => Some(Self::InvalidPort),
            3 => Some(Self::PortLow),
            4 => Some(Self::NoResponse),
            5 => Some(Self::Crc),
            6 => Some(Self::PulseTooShort),
            7 => Some(Self::PulseTooLong),
            8 => Some(Self::InvalidConfig),
            _ => None,
        }
    }
}

impl fmt::Display for DhtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "read already in progress"),
            Self::InvalidPort => write!(f, "sensor port invalid or unconfigured"),
            Self::PortLow => write!(f, "line held low"),
            Self::NoResponse => write!(f, "no response from sensor"),
            Self::Crc => write!(f, "checksum mismatch"),
            Self::PulseTooShort => write!(f, "pulse below protocol minimum"),
            Self::PulseTooLong => write!(f, "pulse beyond protocol maximum"),
            Self::InvalidConfig => write!(f, "invalid configuration"),
        }
    }
}

/// Driver-wide `Result` alias.
pub type Result<T> = core::result::Result<T, DhtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminant_roundtrip() {
        for err in [
            DhtError::Busy,
            DhtError::InvalidPort,
            DhtError::PortLow,
            DhtError::NoResponse,
            DhtError::Crc,
            DhtError::PulseTooShort,
            DhtError::PulseTooLong,
            DhtError::InvalidConfig,
        ] {
            assert_eq!(DhtError::from_u8(err as u8), Some(err));
        }
    }

    #[test]
    fn zero_means_no_fault() {
        assert_eq!(DhtError::from_u8(0), None);
        assert_eq!(DhtError::from_u8(99), None);
    }
}
