//! Blocking read strategy.
//!
//! A single synchronous call performs the whole start/response/40-bit read,
//! busy-waiting on pin transitions instead of capturing edges. The
//! timing-critical window (from releasing the start pulse through the final
//! bus release) runs inside `critical_section::with`, so no interrupt can
//! stretch a bit past its threshold; the prior mask is restored on every
//! exit path, success and error alike.
//!
//! A read blocks for roughly 5 ms. On a sensor that stops answering, the
//! driver switches its power off and holds further reads back through a
//! power-off / settle recovery sequence driven by [`task`](BlockingDht::task);
//! wedged DHTs reliably come back after a power cycle.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{info, warn};

use crate::config::{BlockingConfig, DEFAULT_STARTUP_DELAY_MS};
use crate::error::{DhtError, Result};
use crate::ports::{NoSwitch, PowerSwitch};
use crate::reading::{checksum_ok, normalize_frame, Deci, SensorKind};

/// Recovery state between reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    /// Ready for the next read.
    Idle,
    /// Sensor power is off after a failed read.
    PowerupReset,
    /// Power restored (or first boot); waiting out the settle delay.
    ResetDelay,
}

/// Blocking single-sensor driver.
///
/// The data line is passed to [`read`](Self::read) per call; the delay
/// provider and optional power switch are owned.
pub struct BlockingDht<D, P = NoSwitch> {
    delay: D,
    power: Option<PowerSwitch<P>>,
    cfg: BlockingConfig,
    state: Recovery,
    wait_since_ms: u32,
    wait_ms: u32,
    data: [u8; 5],
    kind: Option<SensorKind>,
    error: bool,
    configured: bool,
}

impl<D: DelayNs, P: OutputPin> BlockingDht<D, P> {
    /// Create the driver, switch sensor power on, and arm the startup read
    /// delay (a `startup_delay_ms` of 0 selects the 5 s default).
    pub fn init(
        delay: D,
        cfg: BlockingConfig,
        mut power: Option<PowerSwitch<P>>,
        now_ms: u32,
    ) -> Result<Self> {
        cfg.validate()?;

        if let Some(switch) = power.as_mut() {
            switch.power_on();
        }

        let startup_ms = if cfg.startup_delay_ms == 0 {
            DEFAULT_STARTUP_DELAY_MS
        } else {
            cfg.startup_delay_ms
        };

        Ok(Self {
            delay,
            power,
            cfg,
            state: Recovery::ResetDelay,
            wait_since_ms: now_ms,
            wait_ms: startup_ms,
            data: [0; 5],
            kind: None,
            error: false,
            configured: false,
        })
    }

    /// Register the sensor line: released high so the bus idles, and the
    /// startup delay restarts.
    pub fn add_sensor<L: InputPin + OutputPin>(&mut self, line: &mut L, now_ms: u32) {
        let _ = line.set_high();
        self.configured = true;
        self.state = Recovery::ResetDelay;
        self.wait_since_ms = now_ms;
        self.wait_ms = self.cfg.startup_delay_ms;
    }

    /// Whether a read is currently allowed.
    pub fn is_ready(&self) -> bool {
        self.state == Recovery::Idle
    }

    /// Drive the recovery state machine. Call from the main loop; every few
    /// hundred milliseconds is plenty.
    pub fn task(&mut self, now_ms: u32) {
        match self.state {
            Recovery::Idle => {}
            Recovery::PowerupReset => {
                if now_ms.wrapping_sub(self.wait_since_ms) < self.wait_ms {
                    return;
                }
                if let Some(switch) = self.power.as_mut() {
                    switch.power_on();
                }
                info!("dht: sensor power restored");
                self.state = Recovery::ResetDelay;
                self.wait_since_ms = now_ms;
                self.wait_ms = self.cfg.reset_read_delay_ms;
            }
            Recovery::ResetDelay => {
                if now_ms.wrapping_sub(self.wait_since_ms) < self.wait_ms {
                    return;
                }
                self.state = Recovery::Idle;
            }
        }
    }

    /// Read temperature and humidity synchronously (~5 ms plus the start
    /// pulse).
    ///
    /// The line must idle high before the read; a low line means a wedged
    /// sensor or a wiring fault and returns [`DhtError::PortLow`] without
    /// touching any timer. On [`DhtError::NoResponse`] the sensor power is
    /// switched off and [`task`](Self::task) must run the recovery sequence
    /// before the next read is permitted.
    pub fn read<L: InputPin + OutputPin>(
        &mut self,
        kind: SensorKind,
        line: &mut L,
        now_ms: u32,
    ) -> Result<()> {
        if self.state != Recovery::Idle {
            return Err(DhtError::Busy);
        }
        if !self.configured {
            return Err(DhtError::InvalidPort);
        }
        if line.is_low().map_err(|_| DhtError::InvalidPort)? {
            warn!("dht: line low before read");
            return Err(DhtError::PortLow);
        }

        self.kind = Some(kind);

        // Start pulse: drive low for the kind-appropriate minimum.
        line.set_low().map_err(|_| DhtError::InvalidPort)?;
        self.delay.delay_ms(kind.start_pulse_ms());

        // Timing-critical window: release, handshake, 40 bits, final
        // release. The mask is restored on every exit path.
        let outcome = critical_section::with(|_| self.sample_frame(line));

        match outcome {
            Ok(()) => {
                self.error = false;
                Ok(())
            }
            Err(err) => {
                // Back to high impedance so a recovering sensor sees an
                // idle bus.
                let _ = line.set_high();
                self.error = true;
                if err == DhtError::NoResponse {
                    warn!("dht: no response, power cycling");
                    if let Some(switch) = self.power.as_mut() {
                        switch.power_off();
                    }
                    self.state = Recovery::PowerupReset;
                    self.wait_since_ms = now_ms;
                    self.wait_ms = self.cfg.power_reset_ms;
                }
                Err(err)
            }
        }
    }

    /// Humidity from the last successful read; zero after an error.
    pub fn humidity(&self) -> Deci {
        self.normalized().map_or(Deci::ZERO, |(h, _)| h)
    }

    /// Temperature from the last successful read; zero after an error.
    pub fn temperature(&self) -> Deci {
        self.normalized().map_or(Deci::ZERO, |(_, t)| t)
    }

    fn normalized(&self) -> Option<(Deci, Deci)> {
        if self.error {
            return None;
        }
        let kind = self.kind?;
        let (humidity_x10, temperature_x10) = normalize_frame(kind, &self.data);
        Some((
            Deci::from_x10(humidity_x10),
            Deci::from_x10(temperature_x10),
        ))
    }

    fn sample_frame<L: InputPin + OutputPin>(&mut self, line: &mut L) -> Result<()> {
        // End the start pulse; the sensor answers with an 80 µs low within
        // 20–40 µs.
        line.set_high().map_err(|_| DhtError::InvalidPort)?;
        self.wait_for(line, false, DhtError::NoResponse)?;

        self.data = [0; 5];

        // 41 high pulses: the first is the sensor's ready signal, the
        // remaining 40 carry one bit each in their width.
        for i in 0..41 {
            self.wait_for(line, true, DhtError::PortLow)?;

            if i != 0 {
                // A zero holds high 26–28 µs, a one ~70 µs: sample between.
                self.delay.delay_us(self.cfg.bit_settle_us);
                let bit = line.is_high().map_err(|_| DhtError::InvalidPort)?;
                let idx = (i - 1) / 8;
                self.data[idx] <<= 1;
                if bit {
                    self.data[idx] |= 1;
                }
            }

            self.wait_for(line, false, DhtError::NoResponse)?;
        }

        if !checksum_ok(&self.data) {
            warn!(
                "dht: checksum mismatch, got {:#04x} over {:02x?}",
                self.data[4],
                &self.data[..4]
            );
            return Err(DhtError::Crc);
        }

        // The sensor releases the bus after the last bit.
        self.wait_for(line, true, DhtError::PortLow)?;
        Ok(())
    }

    /// Busy-wait until the line equals `level`, in 1 µs steps bounded by
    /// the edge timeout.
    fn wait_for<L: InputPin>(
        &mut self,
        line: &mut L,
        level: bool,
        on_timeout: DhtError,
    ) -> Result<()> {
        for _ in 0..self.cfg.edge_timeout_us {
            if line.is_high().map_err(|_| DhtError::InvalidPort)? == level {
                return Ok(());
            }
            self.delay.delay_us(1);
        }
        Err(on_timeout)
    }
}
