//! Deferred-context decode engine.
//!
//! Drains the timestamp ring and advances the bit-level frame state machine.
//! Runs outside interrupt context but before ordinary polled code, so it must
//! never block; everything it needs is either local or an atomic in the
//! shared context.
//!
//! Pulse durations come from consecutive edge timestamps: the high period of
//! each bit is `falling_tick - rising_tick`, 15-bit wrapping, at 8 µs per
//! tick. High levels are otherwise ignored, except at the very end of a
//! frame, where the high edge marks the sensor releasing the bus.
//!
//! The decoder never touches the pin. Completion and faults are handed back
//! through the [`Done`](Phase::Done) and [`Fault`](Phase::Fault) phases; the
//! orchestrator applies the pin recovery and the retry cooldown on its next
//! poll.

use log::warn;

use crate::capture::{EdgeEvent, TICK_MASK, TICK_US};
use crate::context::{DhtContext, Phase};
use crate::error::DhtError;
use crate::reading::{checksum_ok, classify_pulse, normalize_frame};

/// Deferred-context consumer handle. Exactly one exists per
/// [`DhtContext`]; claim it with
/// [`DhtContext::claim_decoder`].
pub struct EdgeDecoder<'a> {
    ctx: &'a DhtContext,
    /// Timestamp of the previous edge, updated for every event, including
    /// the ignored high ones, so each low edge sees the high-pulse width.
    last_tick: u16,
    bit_count: u8,
    raw: [u8; 5],
}

impl<'a> EdgeDecoder<'a> {
    pub(crate) fn new(ctx: &'a DhtContext) -> Self {
        Self {
            ctx,
            last_tick: 0,
            bit_count: 0,
            raw: [0; 5],
        }
    }

    /// Drain every queued edge event and advance the frame state machine.
    ///
    /// Call from the deferred task the capture interrupt schedules. Safe to
    /// call spuriously; an empty ring is a no-op.
    pub fn run(&mut self) {
        while let Some(ev) = self.ctx.ring().pop() {
            let prev_tick = self.last_tick;
            self.last_tick = ev.tick();

            let phase = self.ctx.phase();

            // High levels only matter while waiting for the final bus
            // release.
            if ev.is_high() && phase != Phase::ReadFinished {
                continue;
            }

            // Stale edges during a startup/gap/cooldown window.
            if self.ctx.waiting() {
                continue;
            }

            let duration_us =
                u32::from(self.last_tick.wrapping_sub(prev_tick) & TICK_MASK) * TICK_US;

            match phase {
                // First low pulse after the host's start pulse: the sensor
                // answered. Unconditional once observed.
                Phase::WaitResponse => {
                    self.ctx.set_phase(Phase::WaitPrepare);
                }

                // Low pulse ending the sensor's "ready" signal. The high
                // width of every following pulse encodes one bit.
                Phase::WaitPrepare => {
                    self.bit_count = 0;
                    self.raw = [0; 5];
                    self.ctx.set_phase(Phase::ReadData);
                }

                Phase::ReadData => {
                    if let Err(err) = self.data_bit(duration_us, ev, prev_tick) {
                        self.fail(err);
                        return;
                    }
                }

                // Sensor released the bus after the 40th bit.
                Phase::ReadFinished => {
                    self.ctx.set_phase(Phase::Done);
                }

                // Orchestrator-owned phases, or a cycle already concluded:
                // nothing to decode, the event is consumed and dropped.
                _ => {}
            }
        }
    }

    fn data_bit(&mut self, duration_us: u32, ev: EdgeEvent, prev_tick: u16) -> crate::Result<()> {
        let bit = match classify_pulse(duration_us) {
            Ok(bit) => bit,
            Err(err) => {
                let (put, get) = self.ctx.ring().indices();
                warn!(
                    "dht: pulse of {duration_us}us at bit {} (tick {} prev {} put {put} get {get})",
                    self.bit_count,
                    ev.tick(),
                    prev_tick,
                );
                return Err(err);
            }
        };

        let idx = usize::from(self.bit_count / 8);
        self.raw[idx] <<= 1;
        if bit {
            self.raw[idx] |= 1;
        }
        self.bit_count += 1;

        if self.bit_count == 40 {
            if !checksum_ok(&self.raw) {
                warn!(
                    "dht: checksum mismatch, got {:#04x} over {:02x?}",
                    self.raw[4],
                    &self.raw[..4]
                );
                return Err(DhtError::Crc);
            }

            let cell = self.ctx.cell(self.ctx.active());
            let Some(kind) = cell.kind() else {
                return Err(DhtError::InvalidPort);
            };
            let (humidity_x10, temperature_x10) = normalize_frame(kind, &self.raw);
            cell.publish(humidity_x10, temperature_x10);

            // The sensor still has to pull the bus high.
            self.ctx.set_phase(Phase::ReadFinished);
        }
        Ok(())
    }

    /// Single error path: flag the sensor, record the fault kind, hand the
    /// cycle back. Remaining queued events are left for the arm-time reset.
    fn fail(&mut self, err: DhtError) {
        self.ctx.cell(self.ctx.active()).set_error();
        self.ctx.set_fault(err);
        self.ctx.set_phase(Phase::Fault);
    }
}
