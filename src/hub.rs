//! Polled read orchestrator for the non-blocking driver.
//!
//! [`DhtHub`] owns the sensor pins and every timer. Call
//! [`task`](DhtHub::task) from the application's main loop every few
//! milliseconds with a wrapping millisecond tick; it never blocks, since all
//! waits are deadlines checked per poll.
//!
//! One cycle, driven across contexts:
//!
//! ```text
//! hub: Idle ─▶ SendStart (pull low) ─▶ StartFinished (release)
//!                                            │
//! decoder:      WaitResponse ─▶ WaitPrepare ─▶ ReadData ─▶ ReadFinished
//!                                            │
//! hub:                              Done / Fault ─▶ Idle (next sensor)
//! ```
//!
//! Every phase the decoder owns is covered by the cycle deadline; if the
//! sensor goes quiet the hub seizes the cycle back and schedules the retry
//! cooldown instead of hanging.

use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use crate::config::{DhtConfig, DEFAULT_STARTUP_DELAY_MS};
use crate::context::{DhtContext, Phase, MAX_SENSORS};
use crate::error::{DhtError, Result};
use crate::ports::{NoSwitch, PowerSwitch, SensorLine};
use crate::reading::{Deci, SensorKind};

/// Multi-sensor read orchestrator. Exactly one exists per [`DhtContext`].
pub struct DhtHub<'a, L, P = NoSwitch> {
    ctx: &'a DhtContext,
    lines: [Option<L>; MAX_SENSORS],
    power: Option<PowerSwitch<P>>,
    cfg: DhtConfig,
    /// Number of configured slots; round-robin wraps at this.
    count: usize,
    /// Index of the sensor currently (or last) read.
    cursor: usize,
    wait_since_ms: u32,
    wait_ms: u32,
    /// Cycle deadline armed from `SendStart` until the cycle concludes.
    check_timeout: bool,
    cycle_start_ms: u32,
}

impl<'a, L: SensorLine, P: OutputPin> DhtHub<'a, L, P> {
    /// Create the orchestrator, register sensor 0, switch sensor power on,
    /// and arm the startup read delay (a `startup_delay_ms` of 0 selects the
    /// 5 s default).
    ///
    /// # Panics
    ///
    /// Panics if a hub was already created for this context.
    pub fn init(
        ctx: &'a DhtContext,
        cfg: DhtConfig,
        line0: L,
        kind0: SensorKind,
        mut power: Option<PowerSwitch<P>>,
        now_ms: u32,
    ) -> Result<Self> {
        cfg.validate()?;
        ctx.claim_hub();

        if let Some(switch) = power.as_mut() {
            switch.power_on();
        }

        let startup_ms = if cfg.startup_delay_ms == 0 {
            DEFAULT_STARTUP_DELAY_MS
        } else {
            cfg.startup_delay_ms
        };

        let mut hub = Self {
            ctx,
            lines: [const { None }; MAX_SENSORS],
            power,
            cfg,
            count: 0,
            cursor: 0,
            wait_since_ms: now_ms,
            wait_ms: startup_ms,
            check_timeout: false,
            cycle_start_ms: now_ms,
        };
        hub.add_sensor(0, line0, kind0)?;

        // First cycle starts once the startup delay expires.
        ctx.set_phase(Phase::SendStart);
        ctx.set_waiting(true);

        info!("dht: init, first read in {startup_ms}ms");
        Ok(hub)
    }

    /// Register an additional sensor. The line is released (input with
    /// pull-up) so the bus idles high until its first cycle.
    pub fn add_sensor(&mut self, index: usize, mut line: L, kind: SensorKind) -> Result<()> {
        if index >= MAX_SENSORS {
            return Err(DhtError::InvalidPort);
        }
        line.release();
        self.lines[index] = Some(line);
        self.ctx.cell(index).configure(kind);
        if index + 1 > self.count {
            self.count = index + 1;
        }
        // Keep "last sensor read" semantics: the next round starts at 0.
        self.cursor = self.count - 1;
        Ok(())
    }

    /// Advance the read cycle. Call every few milliseconds.
    pub fn task(&mut self, now_ms: u32) {
        // Waiting for a delay to expire (startup, start pulse, gap,
        // auto-read period, or error cooldown).
        if self.ctx.waiting() {
            if now_ms.wrapping_sub(self.wait_since_ms) < self.wait_ms {
                return;
            }
            self.ctx.set_waiting(false);
        }

        match self.ctx.phase() {
            // Decoder handed the cycle back.
            Phase::Done => self.finish_cycle(),
            Phase::Fault => {
                let err = self.ctx.take_fault().unwrap_or(DhtError::NoResponse);
                self.error_path(now_ms, err);
            }

            // Decoder-owned phases: only enforce the cycle deadline.
            Phase::WaitResponse | Phase::WaitPrepare | Phase::ReadData | Phase::ReadFinished => {
                self.enforce_timeout(now_ms);
            }

            Phase::Idle => self.idle(now_ms),
            Phase::SendStart => {
                if !self.enforce_timeout(now_ms) {
                    self.send_start(now_ms);
                }
            }
            Phase::StartFinished => {
                if !self.enforce_timeout(now_ms) {
                    self.start_finished();
                }
            }
        }
    }

    /// Begin reading all sensors now. Only honored while idle: a cycle in
    /// flight, a pending auto-read, or an error cooldown takes precedence.
    pub fn start_read(&mut self) {
        if self.ctx.phase() == Phase::Idle && !self.ctx.waiting() {
            // Picked up on the next poll, no extra delay.
            self.ctx.set_phase(Phase::SendStart);
        }
    }

    /// Whether all sensors have been read and nothing further is scheduled.
    /// Only then does [`start_read`](Self::start_read) begin a new round.
    pub fn is_idle(&self) -> bool {
        self.ctx.phase() == Phase::Idle
            && !self.ctx.waiting()
            && self.cursor == self.count.saturating_sub(1)
    }

    // ───────────────────────────────────────────────────────────
    // Reading accessors
    // ───────────────────────────────────────────────────────────

    /// Whether an unconsumed temperature is available. Clears the flag:
    /// each successful cycle reports exactly once.
    pub fn has_new_temperature(&self, index: usize) -> bool {
        index < MAX_SENSORS && self.ctx.cell(index).take_new_temperature()
    }

    /// Whether an unconsumed humidity is available. Clears the flag.
    pub fn has_new_humidity(&self, index: usize) -> bool {
        index < MAX_SENSORS && self.ctx.cell(index).take_new_humidity()
    }

    /// Whether the sensor's last cycle failed. Cleared when its next cycle
    /// starts.
    pub fn has_error(&self, index: usize) -> bool {
        index < MAX_SENSORS && self.ctx.cell(index).has_error()
    }

    /// Last published temperature in °C. Stale until the first successful
    /// decode.
    pub fn temperature(&self, index: usize) -> Deci {
        if index >= MAX_SENSORS {
            return Deci::ZERO;
        }
        Deci::from_x10(self.ctx.cell(index).temperature_x10())
    }

    /// Last published relative humidity in %. Stale until the first
    /// successful decode.
    pub fn humidity(&self, index: usize) -> Deci {
        if index >= MAX_SENSORS {
            return Deci::ZERO;
        }
        Deci::from_x10(self.ctx.cell(index).humidity_x10())
    }

    // ───────────────────────────────────────────────────────────
    // Cycle steps
    // ───────────────────────────────────────────────────────────

    /// Returns `true` (and takes the error path) when the cycle deadline
    /// has passed.
    fn enforce_timeout(&mut self, now_ms: u32) -> bool {
        if !self.check_timeout {
            return false;
        }
        if now_ms.wrapping_sub(self.cycle_start_ms) <= self.cfg.timeout_ms {
            return false;
        }
        warn!("dht: sensor {} timed out", self.cursor);
        self.error_path(now_ms, DhtError::NoResponse);
        true
    }

    fn idle(&mut self, now_ms: u32) {
        if self.cursor == self.count - 1 {
            // Round complete: start over after the auto-read period, or
            // stay idle until start_read().
            if self.cfg.auto_read_period_ms != 0 {
                self.ctx.set_phase(Phase::SendStart);
                self.arm_delay(now_ms, self.cfg.auto_read_period_ms);
            }
        } else {
            // More sensors in this round: short gap, then the next one.
            self.ctx.set_phase(Phase::SendStart);
            self.arm_delay(now_ms, self.cfg.inter_sensor_gap_ms);
        }
    }

    fn send_start(&mut self, now_ms: u32) {
        let ctx = self.ctx;
        let index = (self.cursor + 1) % self.count;
        self.cursor = index;
        ctx.set_active(index);

        let cell = ctx.cell(index);
        let (Some(kind), Some(line)) = (cell.kind(), self.lines[index].as_mut()) else {
            warn!("dht: sensor {index} not configured");
            self.error_path(now_ms, DhtError::InvalidPort);
            return;
        };

        cell.clear_cycle_flags();

        if !ctx.ring().is_empty() {
            let (put, get) = ctx.ring().indices();
            warn!("dht: ring not drained at cycle start (put {put} get {get})");
        }

        self.cycle_start_ms = now_ms;
        self.check_timeout = true;

        // Reconfiguring the pin to output pulls the bus low, which is
        // itself an edge: keep the capture/decode pair out until the
        // orchestration state is consistent.
        critical_section::with(|_| {
            ctx.ring().reset();
            line.write(false);
            line.drive_output();
        });

        // Hold the start pulse low for the kind-appropriate time.
        self.ctx.set_phase(Phase::StartFinished);
        self.arm_delay(now_ms, kind.start_pulse_ms());
    }

    fn start_finished(&mut self) {
        let ctx = self.ctx;
        if let Some(line) = self.lines[self.cursor].as_mut() {
            // The release edge must find the decoder already in
            // WaitResponse, so hand the phase over inside the section.
            critical_section::with(|_| {
                ctx.set_phase(Phase::WaitResponse);
                line.release();
            });
        }
    }

    /// Successful cycle: drive the idle bus high as an output until the
    /// next start pulse, which is more immune to noise than a floating input.
    fn finish_cycle(&mut self) {
        let ctx = self.ctx;
        if let Some(line) = self.lines[self.cursor].as_mut() {
            critical_section::with(|_| {
                line.write(true);
                line.drive_output();
            });
        }
        self.check_timeout = false;
        ctx.set_phase(Phase::Idle);
        debug!("dht: sensor {} cycle complete", self.cursor);
    }

    /// Single error path shared by timeouts, decoder faults, and
    /// configuration holes: release the pin, flag the sensor, cool down
    /// before the next attempt. No power-cycling on this path.
    fn error_path(&mut self, now_ms: u32, err: DhtError) {
        let ctx = self.ctx;
        if let Some(line) = self.lines[self.cursor].as_mut() {
            critical_section::with(|_| line.release());
        }
        ctx.cell(self.cursor).set_error();
        warn!("dht: sensor {} cycle failed: {err}", self.cursor);

        self.check_timeout = false;
        ctx.set_phase(Phase::Idle);
        self.arm_delay(now_ms, self.cfg.cooldown_ms);
    }

    fn arm_delay(&mut self, now_ms: u32, delay_ms: u32) {
        self.wait_since_ms = now_ms;
        self.wait_ms = delay_ms;
        self.ctx.set_waiting(true);
    }

    /// Power switch accessor, for applications that manage sensor power
    /// outside the read cycle.
    pub fn power_switch(&mut self) -> Option<&mut PowerSwitch<P>> {
        self.power.as_mut()
    }
}
