#![no_std]
//! Concurrent accelerometer and gyroscope sampling of an LSM9DS1 on a
//! shared I2C bus.
//!
//! An [`ImuController`] acquires a named bus from a
//! [`BusManager`](bus_manager::BusManager), configures the device from an
//! [`ImuConfig`] and then runs one sampling loop per channel. Each loop reads
//! an output burst, scales it and hands a [`Reading`] to a [`ReadingSink`].
//! Every register access is a single locked transaction on the shared bus,
//! so the two loops never interleave on the wire.

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod config;
pub mod controller;
pub mod events;
pub mod policy;
pub mod tasks;
pub mod time;

pub use config::{
    parse_address, AddressErrorKind, AddressField, AddressParseError, ImuConfig,
};
pub use controller::{DeviceError, ImuController, ImuState, RunSummary, StartError};
pub use events::{ChannelSink, FrameError, Reading, ReadingSink, WireReading};
pub use policy::ErrorPolicy;
pub use tasks::{sampling_loop, LoopReport, LoopSettings};
#[cfg(feature = "embassy-time")]
pub use time::EmbassyClock;
pub use time::TimeSource;
