//! Property tests for the frame-decoding rules and the edge ring.

use dhtline::reading::{
    checksum_ok, classify_pulse, normalize_frame, Deci, MAX_PULSE_US, MIN_PULSE_US,
    ONE_THRESHOLD_US,
};
use dhtline::{DhtError, EdgeEvent, EdgeRing, SensorKind};
use proptest::prelude::*;

proptest! {
    /// The checksum law, both directions: a frame decodes iff byte 4 equals
    /// the truncated sum of bytes 0..4.
    #[test]
    fn checksum_law(bytes in proptest::array::uniform4(0u8..=255u8), crc in 0u8..=255u8) {
        let expected = bytes
            .iter()
            .fold(0u8, |s, b| s.wrapping_add(*b));
        let frame = [bytes[0], bytes[1], bytes[2], bytes[3], crc];
        prop_assert_eq!(checksum_ok(&frame), crc == expected);
    }

    /// Pulse classification is total and matches its piecewise definition.
    #[test]
    fn classify_matches_definition(duration_us in 0u32..=100_000) {
        let got = classify_pulse(duration_us);
        let want = if duration_us < MIN_PULSE_US {
            Err(DhtError::PulseTooShort)
        } else if duration_us > MAX_PULSE_US {
            Err(DhtError::PulseTooLong)
        } else {
            Ok(duration_us > ONE_THRESHOLD_US)
        };
        prop_assert_eq!(got, want);
    }

    /// Encoding a (humidity, temperature) pair as a DHT22 frame and
    /// normalizing it back is the identity.
    #[test]
    fn dht22_normalize_round_trip(hum_x10 in 0i16..=1000, temp_x10 in -400i16..=800) {
        let hum = hum_x10 as u16;
        let mag = temp_x10.unsigned_abs();
        let mut temp_hi = (mag >> 8) as u8;
        if temp_x10 < 0 {
            temp_hi |= 0x80;
        }
        let raw = [
            (hum >> 8) as u8,
            hum as u8,
            temp_hi,
            mag as u8,
            0, // checksum not consulted by normalize_frame
        ];
        let (h, t) = normalize_frame(SensorKind::Dht22, &raw);
        prop_assert_eq!(h, hum_x10);
        prop_assert_eq!(t, temp_x10);
    }

    /// DHT11 frames recombine integer and decimal bytes.
    #[test]
    fn dht11_normalize_recombines(int_h in 0u8..=100, dec_h in 0u8..=9,
                                  int_t in 0u8..=60, dec_t in 0u8..=9) {
        let raw = [int_h, dec_h, int_t, dec_t, 0];
        let (h, t) = normalize_frame(SensorKind::Dht11, &raw);
        prop_assert_eq!(h, i16::from(int_h) * 10 + i16::from(dec_h));
        prop_assert_eq!(t, i16::from(int_t) * 10 + i16::from(dec_t));
    }

    /// Integer and fraction parts always recombine to the raw ×10 value.
    #[test]
    fn deci_parts_recombine(x10 in -3000i16..=3000) {
        let v = Deci::from_x10(x10);
        let sign = if x10 < 0 { -1 } else { 1 };
        prop_assert_eq!(
            v.integer_part() * 10 + sign * i16::from(v.fraction_part()),
            x10
        );
        prop_assert!(v.fraction_part() <= 9);
    }

    /// The ring preserves FIFO order and never yields an event that was not
    /// pushed, for any interleaving of pushes and pops.
    #[test]
    fn ring_is_fifo(ops in proptest::collection::vec(any::<Option<u16>>(), 1..=200)) {
        let ring: EdgeRing<16> = EdgeRing::new();
        let mut expected = std::collections::VecDeque::new();

        for op in ops {
            match op {
                Some(tick) => {
                    let ev = EdgeEvent::new(tick & 1 == 0, tick);
                    if ring.push(ev) {
                        expected.push_back(ev);
                    }
                    // A refused push must leave the queue intact.
                    prop_assert!(expected.len() <= 15);
                }
                None => {
                    prop_assert_eq!(ring.pop(), expected.pop_front());
                }
            }
            prop_assert_eq!(ring.len(), expected.len());
        }

        while let Some(want) = expected.pop_front() {
            prop_assert_eq!(ring.pop(), Some(want));
        }
        prop_assert_eq!(ring.pop(), None);
    }
}
