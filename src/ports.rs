//! Port traits and adapters at the hardware boundary.
//!
//! The driver core never touches registers. Platforms implement
//! [`SensorLine`] for the bidirectional data pin; the power switch and the
//! blocking variant ride on `embedded-hal` digital traits directly.

use embedded_hal::digital::{ErrorType, OutputPin};

// ───────────────────────────────────────────────────────────────
// Sensor data line
// ───────────────────────────────────────────────────────────────

/// The bidirectional single-wire data line, as seen by the orchestrator.
///
/// `embedded-hal` 1.0 has no trait for runtime direction changes, and this
/// protocol reconfigures the pin mid-transaction, so the port is crate-local.
/// Implementations are expected to be infallible, as MCU GPIO writes are.
pub trait SensorLine {
    /// Release the line: input with pull-up, bus idles high.
    fn release(&mut self);

    /// Reconfigure as push-pull output, driving the last written level.
    ///
    /// Note the reconfiguration itself produces an edge on the bus; the
    /// orchestrator wraps it in a critical section so the capture interrupt
    /// and the deferred decoder observe it in order.
    fn drive_output(&mut self);

    /// Set the output latch. No electrical effect until [`drive_output`]
    /// while the line is released.
    ///
    /// [`drive_output`]: Self::drive_output
    fn write(&mut self, high: bool);

    /// Sample the current line level.
    fn read(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Sensor power switch
// ───────────────────────────────────────────────────────────────

/// Optional GPIO supplying power to the sensors, used only for power-cycle
/// recovery (and switched on at init).
///
/// `active_low` inverts the drive: some boards switch the sensor supply
/// through a high-side PNP.
pub struct PowerSwitch<P> {
    pin: P,
    active_low: bool,
}

impl<P: OutputPin> PowerSwitch<P> {
    pub fn new(pin: P, active_low: bool) -> Self {
        Self { pin, active_low }
    }

    /// Latch errors are ignored; a supply switch that cannot be driven is a
    /// board fault outside this driver's recovery reach.
    pub fn power_on(&mut self) {
        let _ = if self.active_low {
            self.pin.set_low()
        } else {
            self.pin.set_high()
        };
    }

    pub fn power_off(&mut self) {
        let _ = if self.active_low {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
    }
}

/// Stand-in pin for builds without a power switch.
pub struct NoSwitch;

impl ErrorType for NoSwitch {
    type Error = core::convert::Infallible;
}

impl OutputPin for NoSwitch {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// `None` with the switch type pinned, for callers without a power switch.
pub fn no_switch() -> Option<PowerSwitch<NoSwitch>> {
    None
}

// ───────────────────────────────────────────────────────────────
// Deferred-task scheduler hook
// ───────────────────────────────────────────────────────────────

/// Hook the capture interrupt uses to request a decoder run.
///
/// The platform points this at its deferred-task scheduler, which should run
/// the decoder as soon as the interrupt returns, at a priority between the
/// capture interrupt and ordinary polled code.
pub type WakeFn = fn();

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};

    #[test]
    fn power_switch_polarity() {
        let mut pin = PinMock::new(&[
            Transaction::set(State::High),
            Transaction::set(State::Low),
        ]);
        let mut sw = PowerSwitch::new(pin.clone(), false);
        sw.power_on();
        sw.power_off();
        pin.done();

        let mut pin = PinMock::new(&[
            Transaction::set(State::Low),
            Transaction::set(State::High),
        ]);
        let mut sw = PowerSwitch::new(pin.clone(), true);
        sw.power_on();
        sw.power_off();
        pin.done();
    }
}
