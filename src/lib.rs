//! Drivers for DHT11/DHT22 single-wire humidity/temperature sensors.
//!
//! Both sensor families talk over one bidirectional GPIO line with
//! pulse-width-encoded bits: a 40-bit frame (humidity, temperature,
//! checksum) whose `1`s and `0`s differ only in how long the line stays
//! high. Two read strategies are provided over the same wire protocol:
//!
//! - **Non-blocking** ([`DhtContext`] / [`DhtHub`]): a pin-change interrupt
//!   timestamps every edge into a lock-free ring ([`EdgeCapture`]), a
//!   deferred task decodes them ([`EdgeDecoder`]), and a polled orchestrator
//!   drives start pulses, timeouts, and multi-sensor round-robin without
//!   ever blocking the main loop.
//! - **Blocking** ([`BlockingDht`]): one synchronous call busy-waits the
//!   whole frame inside a critical section, with power-cycle recovery for
//!   sensors that stop answering.
//!
//! Hardware enters through small ports: [`ports::SensorLine`] for the data
//! pin, `embedded-hal` traits for delays and the optional power switch, and
//! caller-supplied millisecond/8 µs ticks for all timing.

#![cfg_attr(not(test), no_std)]
#![deny(unused_must_use)]

pub mod blocking;
pub mod capture;
pub mod config;
pub mod context;
pub mod decode;
pub mod hub;
pub mod ports;
pub mod reading;

mod error;

pub use blocking::BlockingDht;
pub use capture::{EdgeCapture, EdgeEvent, EdgeRing, TICK_US};
pub use config::{BlockingConfig, DhtConfig};
pub use context::{DhtContext, Phase, MAX_SENSORS};
pub use decode::EdgeDecoder;
pub use error::{DhtError, Result};
pub use hub::DhtHub;
pub use ports::{NoSwitch, PowerSwitch, SensorLine, WakeFn};
pub use reading::{Deci, SensorKind};
