//! Full-scale and output data rate selectors.
//!
//! Discriminants are the raw register field values, so a selector can be
//! written straight into the `fs` and `odr` fields of `CTRL_REG1_G` and
//! `CTRL_REG6_XL`.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Half of the signed 16-bit output range.
pub const HALF_RANGE: f32 = 32768.0;

/// Gyroscope full-scale selection (`FS_G`).
///
/// Field value `0b10` is reserved by the datasheet and has no variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum GyroFsr {
    Fs245Dps = 0b00,
    Fs500Dps = 0b01,
    Fs2000Dps = 0b11,
}

impl GyroFsr {
    /// Range in degrees per second.
    pub fn full_scale(self) -> f32 {
        match self {
            Self::Fs245Dps => 245.0,
            Self::Fs500Dps => 500.0,
            Self::Fs2000Dps => 2000.0,
        }
    }

    /// Degrees per second per LSB.
    pub fn resolution(self) -> f32 {
        self.full_scale() / HALF_RANGE
    }
}

/// Gyroscope output data rate (`ODR_G`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum GyroOdr {
    PowerDown = 0b000,
    Odr14_9Hz = 0b001,
    Odr59_5Hz = 0b010,
    Odr119Hz = 0b011,
    Odr238Hz = 0b100,
    Odr476Hz = 0b101,
    Odr952Hz = 0b110,
}

/// Accelerometer full-scale selection (`FS_XL`).
///
/// The field encoding is not monotonic: `0b01` selects ±16 g.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AccelFsr {
    Fs2G = 0b00,
    Fs16G = 0b01,
    Fs4G = 0b10,
    Fs8G = 0b11,
}

impl AccelFsr {
    /// Range in multiples of standard gravity.
    pub fn full_scale(self) -> f32 {
        match self {
            Self::Fs2G => 2.0,
            Self::Fs16G => 16.0,
            Self::Fs4G => 4.0,
            Self::Fs8G => 8.0,
        }
    }

    /// g per LSB.
    pub fn resolution(self) -> f32 {
        self.full_scale() / HALF_RANGE
    }
}

/// Accelerometer output data rate (`ODR_XL`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AccelOdr {
    PowerDown = 0b000,
    Odr10Hz = 0b001,
    Odr50Hz = 0b010,
    Odr119Hz = 0b011,
    Odr238Hz = 0b100,
    Odr476Hz = 0b101,
    Odr952Hz = 0b110,
}

/// One of the two sampled sub-devices.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    Accelerometer,
    Gyroscope,
}

/// Unit of the scaled values produced for a channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Unit {
    /// Multiples of standard gravity.
    Gs,
    /// Degrees per second.
    Dps,
}

impl Channel {
    pub const fn unit(self) -> Unit {
        match self {
            Self::Accelerometer => Unit::Gs,
            Self::Gyroscope => Unit::Dps,
        }
    }
}

/// Selector state of one channel together with its derived resolution.
///
/// The resolution is only ever set from a selector that was written to the
/// device, so scaled values always match the device's actual range.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    channel: Channel,
    full_scale: u8,
    odr: u8,
    resolution: f32,
}

impl ChannelConfig {
    /// Power-on state: both selectors zero.
    pub fn reset(channel: Channel) -> Self {
        let resolution = match channel {
            Channel::Accelerometer => AccelFsr::Fs2G.resolution(),
            Channel::Gyroscope => GyroFsr::Fs245Dps.resolution(),
        };
        Self { channel, full_scale: 0, odr: 0, resolution }
    }

    pub fn gyro(fsr: GyroFsr, odr: GyroOdr) -> Self {
        Self {
            channel: Channel::Gyroscope,
            full_scale: fsr.into(),
            odr: odr.into(),
            resolution: fsr.resolution(),
        }
    }

    pub fn accel(fsr: AccelFsr, odr: AccelOdr) -> Self {
        Self {
            channel: Channel::Accelerometer,
            full_scale: fsr.into(),
            odr: odr.into(),
            resolution: fsr.resolution(),
        }
    }

    pub const fn channel(&self) -> Channel {
        self.channel
    }

    /// Raw 2-bit full-scale field value.
    pub const fn full_scale_bits(&self) -> u8 {
        self.full_scale
    }

    /// Raw 3-bit output data rate field value.
    pub const fn odr_bits(&self) -> u8 {
        self.odr
    }

    /// Physical units per LSB.
    pub const fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Same rate, new range.
    pub(crate) fn with_full_scale(self, bits: u8, resolution: f32) -> Self {
        Self { full_scale: bits, resolution, ..self }
    }

    /// Same range and resolution, new rate.
    pub(crate) fn with_odr(self, odr: u8) -> Self {
        Self { odr, ..self }
    }
}
