//! Shared state crossing the three execution contexts.
//!
//! The non-blocking driver runs in three places at once: the capture
//! interrupt, the deferred decoder, and the polled orchestrator. Everything
//! they share lives in one [`DhtContext`] (typically a `static`), built
//! entirely from atomics so the whole struct is `Sync` without locks.
//!
//! Every shared field has exactly one writer at any moment:
//!
//! - ring `put`: the capture handle; ring `get`: the decoder.
//! - `phase`: the orchestrator while the value is `Idle`/`SendStart`/
//!   `StartFinished`/`Done`/`Fault`; the decoder while it is
//!   `WaitResponse`..`ReadFinished`. The orchestrator only seizes a
//!   decoder-owned phase (timeout) inside a critical section, during which
//!   the deferred decoder cannot run.
//! - `waiting`, `active`: the orchestrator. `fault`, reading cells: the
//!   decoder (cells are also error-flagged by the orchestrator, but only
//!   while the decoder is idle for the cycle).
//!
//! The context hands out each role handle exactly once, which is what turns
//! the single-writer convention into a structural guarantee.

use core::sync::atomic::{AtomicBool, AtomicI16, AtomicU8, AtomicUsize, Ordering};

use crate::capture::{EdgeCapture, EdgeRing};
use crate::decode::EdgeDecoder;
use crate::error::DhtError;
use crate::reading::SensorKind;

/// Edge-ring capacity: a full frame is ~85 edges (start handshake plus
/// 40 bits at two edges each), so 128 holds a cycle with headroom.
pub(crate) const RING_CAPACITY: usize = 128;

/// Maximum number of sensors one context can drive.
pub const MAX_SENSORS: usize = 8;

// ───────────────────────────────────────────────────────────────
// Cycle phase
// ───────────────────────────────────────────────────────────────

/// Where the current read cycle stands.
///
/// `Idle`..`StartFinished` are driven by the orchestrator poll;
/// `WaitResponse`..`ReadFinished` by the deferred decoder; `Done` and
/// `Fault` are the decoder handing the cycle back for pin recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    SendStart = 1,
    StartFinished = 2,
    WaitResponse = 3,
    WaitPrepare = 4,
    ReadData = 5,
    ReadFinished = 6,
    Done = 7,
    Fault = 8,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::SendStart,
            2 => Self::StartFinished,
            3 => Self::WaitResponse,
            4 => Self::WaitPrepare,
            5 => Self::ReadData,
            6 => Self::ReadFinished,
            7 => Self::Done,
            8 => Self::Fault,
            _ => {
                debug_assert!(false, "invalid phase value: {raw}");
                Self::Idle
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Per-sensor published reading
// ───────────────────────────────────────────────────────────────

const FLAG_ERROR: u8 = 0b001;
const FLAG_NEW_TEMPERATURE: u8 = 0b010;
const FLAG_NEW_HUMIDITY: u8 = 0b100;

/// One sensor's published reading plus its cycle flags.
///
/// The decoder publishes, the polling context consumes; the new-data flags
/// clear on read so each successful cycle notifies exactly once.
pub(crate) struct ReadingCell {
    humidity_x10: AtomicI16,
    temperature_x10: AtomicI16,
    flags: AtomicU8,
    /// `SensorKind as u8`, `0` while unconfigured.
    kind: AtomicU8,
}

impl ReadingCell {
    const fn new() -> Self {
        Self {
            humidity_x10: AtomicI16::new(0),
            temperature_x10: AtomicI16::new(0),
            flags: AtomicU8::new(0),
            kind: AtomicU8::new(0),
        }
    }

    pub(crate) fn configure(&self, kind: SensorKind) {
        self.kind.store(kind as u8, Ordering::Release);
    }

    pub(crate) fn kind(&self) -> Option<SensorKind> {
        SensorKind::from_u8(self.kind.load(Ordering::Acquire))
    }

    /// Cleared at the start of every cycle, set at its end.
    pub(crate) fn clear_cycle_flags(&self) {
        self.flags.store(0, Ordering::Release);
    }

    /// Publish a validated reading: values first, then the flags in one
    /// store so consumers never observe a half-updated cell.
    pub(crate) fn publish(&self, humidity_x10: i16, temperature_x10: i16) {
        self.humidity_x10.store(humidity_x10, Ordering::Relaxed);
        self.temperature_x10.store(temperature_x10, Ordering::Relaxed);
        self.flags
            .store(FLAG_NEW_TEMPERATURE | FLAG_NEW_HUMIDITY, Ordering::Release);
    }

    pub(crate) fn set_error(&self) {
        self.flags.fetch_or(FLAG_ERROR, Ordering::Release);
    }

    pub(crate) fn has_error(&self) -> bool {
        self.flags.load(Ordering::Acquire) & FLAG_ERROR != 0
    }

    pub(crate) fn take_new_temperature(&self) -> bool {
        self.flags.fetch_and(!FLAG_NEW_TEMPERATURE, Ordering::AcqRel) & FLAG_NEW_TEMPERATURE != 0
    }

    pub(crate) fn take_new_humidity(&self) -> bool {
        self.flags.fetch_and(!FLAG_NEW_HUMIDITY, Ordering::AcqRel) & FLAG_NEW_HUMIDITY != 0
    }

    pub(crate) fn humidity_x10(&self) -> i16 {
        self.humidity_x10.load(Ordering::Acquire)
    }

    pub(crate) fn temperature_x10(&self) -> i16 {
        self.temperature_x10.load(Ordering::Acquire)
    }
}

// ───────────────────────────────────────────────────────────────
// The shared context
// ───────────────────────────────────────────────────────────────

/// Shared state for one non-blocking driver instance.
///
/// Create it once (usually `static`), then claim the three role handles:
///
/// ```ignore
/// static CTX: DhtContext = DhtContext::new();
///
/// let capture = CTX.claim_capture();   // → pin-change ISR
/// let decoder = CTX.claim_decoder();   // → deferred task
/// let hub = DhtHub::init(&CTX, ...);   // → main loop
/// ```
pub struct DhtContext {
    ring: EdgeRing<RING_CAPACITY>,
    phase: AtomicU8,
    /// Orchestrator delay window in effect; the decoder discards events
    /// while this is set.
    waiting: AtomicBool,
    /// Pending fault kind from the decoder (`DhtError as u8`, 0 = none).
    fault: AtomicU8,
    /// Index of the sensor the in-flight cycle belongs to.
    active: AtomicUsize,
    cells: [ReadingCell; MAX_SENSORS],
    capture_claimed: AtomicBool,
    decoder_claimed: AtomicBool,
    hub_claimed: AtomicBool,
}

impl DhtContext {
    pub const fn new() -> Self {
        Self {
            ring: EdgeRing::new(),
            phase: AtomicU8::new(Phase::Idle as u8),
            waiting: AtomicBool::new(false),
            fault: AtomicU8::new(0),
            active: AtomicUsize::new(0),
            cells: [const { ReadingCell::new() }; MAX_SENSORS],
            capture_claimed: AtomicBool::new(false),
            decoder_claimed: AtomicBool::new(false),
            hub_claimed: AtomicBool::new(false),
        }
    }

    /// Claim the unique ISR-side capture handle.
    ///
    /// # Panics
    ///
    /// Panics on a second claim; two producers would break the ring's
    /// ordering guarantee.
    pub fn claim_capture(&self) -> EdgeCapture<'_> {
        assert!(
            !self.capture_claimed.swap(true, Ordering::AcqRel),
            "edge capture handle already claimed"
        );
        EdgeCapture::new(self)
    }

    /// Claim the unique deferred-context decoder handle.
    ///
    /// # Panics
    ///
    /// Panics on a second claim.
    pub fn claim_decoder(&self) -> EdgeDecoder<'_> {
        assert!(
            !self.decoder_claimed.swap(true, Ordering::AcqRel),
            "decoder handle already claimed"
        );
        EdgeDecoder::new(self)
    }

    pub(crate) fn claim_hub(&self) {
        assert!(
            !self.hub_claimed.swap(true, Ordering::AcqRel),
            "hub already claimed"
        );
    }

    pub(crate) fn ring(&self) -> &EdgeRing<RING_CAPACITY> {
        &self.ring
    }

    pub(crate) fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub(crate) fn waiting(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }

    pub(crate) fn set_waiting(&self, waiting: bool) {
        self.waiting.store(waiting, Ordering::Release);
    }

    pub(crate) fn set_fault(&self, err: DhtError) {
        self.fault.store(err as u8, Ordering::Release);
    }

    pub(crate) fn take_fault(&self) -> Option<DhtError> {
        DhtError::from_u8(self.fault.swap(0, Ordering::AcqRel))
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, index: usize) {
        self.active.store(index, Ordering::Release);
    }

    pub(crate) fn cell(&self, index: usize) -> &ReadingCell {
        &self.cells[index]
    }
}

impl Default for DhtContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_publish_sets_new_flags_and_clears_error() {
        let cell = ReadingCell::new();
        cell.set_error();
        assert!(cell.has_error());

        cell.publish(653, 277);
        assert!(!cell.has_error());
        assert_eq!(cell.humidity_x10(), 653);
        assert_eq!(cell.temperature_x10(), 277);
    }

    #[test]
    fn new_flags_clear_on_read_exactly_once() {
        let cell = ReadingCell::new();
        cell.publish(1, 2);
        assert!(cell.take_new_temperature());
        assert!(!cell.take_new_temperature());
        assert!(cell.take_new_humidity());
        assert!(!cell.take_new_humidity());
    }

    #[test]
    fn cycle_flag_clear_preserves_values() {
        let cell = ReadingCell::new();
        cell.publish(400, 215);
        cell.clear_cycle_flags();
        assert_eq!(cell.humidity_x10(), 400);
        assert_eq!(cell.temperature_x10(), 215);
        assert!(!cell.take_new_temperature());
    }

    #[test]
    #[should_panic(expected = "edge capture handle already claimed")]
    fn capture_claim_is_unique() {
        let ctx = DhtContext::new();
        let _first = ctx.claim_capture();
        let _second = ctx.claim_capture();
    }
}
