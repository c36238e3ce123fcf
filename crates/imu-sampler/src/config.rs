//! Start-up configuration.

use heapless::String;
use lsm9ds1::DeviceAddresses;
use serde::{Deserialize, Serialize};

use crate::policy::ErrorPolicy;

/// Longest bus identifier accepted in a configuration.
pub const MAX_BUS_NAME_LEN: usize = bus_manager::MAX_BUS_ID_LEN;
/// Longest address literal accepted in a configuration.
pub const MAX_ADDRESS_LEN: usize = 16;

/// Serializable mirror of a driver enum.
macro_rules! define_config_enum {
    ($wrapper:ident, $external:path, { $($variant:ident),* $(,)? }) => {
        #[derive(
            Debug, PartialEq, Eq, Clone, Copy, ::serde::Serialize, ::serde::Deserialize,
        )]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub enum $wrapper {
            $($variant),*
        }

        impl From<$external> for $wrapper {
            fn from(value: $external) -> Self {
                match value {
                    $(<$external>::$variant => Self::$variant),*
                }
            }
        }

        impl From<$wrapper> for $external {
            fn from(value: $wrapper) -> Self {
                match value {
                    $(<$wrapper>::$variant => <$external>::$variant),*
                }
            }
        }
    };
}

pub(crate) use define_config_enum;

define_config_enum!(GyroFsr, lsm9ds1::GyroFsr, {
    Fs245Dps,
    Fs500Dps,
    Fs2000Dps,
});

define_config_enum!(GyroOdr, lsm9ds1::GyroOdr, {
    PowerDown,
    Odr14_9Hz,
    Odr59_5Hz,
    Odr119Hz,
    Odr238Hz,
    Odr476Hz,
    Odr952Hz,
});

define_config_enum!(AccelFsr, lsm9ds1::AccelFsr, {
    Fs2G,
    Fs16G,
    Fs4G,
    Fs8G,
});

define_config_enum!(AccelOdr, lsm9ds1::AccelOdr, {
    PowerDown,
    Odr10Hz,
    Odr50Hz,
    Odr119Hz,
    Odr238Hz,
    Odr476Hz,
    Odr952Hz,
});

/// Which configured address failed to parse.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressField {
    AccelGyro,
    Magnetometer,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressErrorKind {
    Empty,
    InvalidDigit,
    /// Larger than a 7-bit bus address.
    OutOfRange,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressParseError {
    pub field: AddressField,
    pub kind: AddressErrorKind,
}

/// Parse a 7-bit bus address written as an integer literal.
///
/// Accepts `0x`, `0o` and `0b` prefixes in either case, a bare leading `0`
/// for octal, plain decimal, and `_` between digits once a base prefix has
/// been given.
pub fn parse_address(text: &str) -> Result<u8, AddressErrorKind> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AddressErrorKind::Empty);
    }

    let bytes = text.as_bytes();
    let (digits, radix, prefixed) = match bytes {
        [b'0', b'x' | b'X', ..] => (&text[2..], 16, true),
        [b'0', b'o' | b'O', ..] => (&text[2..], 8, true),
        [b'0', b'b' | b'B', ..] => (&text[2..], 2, true),
        [b'0', _, ..] => (&text[1..], 8, true),
        _ => (text, 10, false),
    };

    let mut value: u32 = 0;
    let mut any_digit = false;
    // A separator may follow the prefix, but never another separator.
    let mut after_separator = false;
    for c in digits.chars() {
        if c == '_' {
            if !prefixed || after_separator {
                return Err(AddressErrorKind::InvalidDigit);
            }
            after_separator = true;
            continue;
        }
        let digit = c.to_digit(radix).ok_or(AddressErrorKind::InvalidDigit)?;
        value = value * radix + digit;
        if value > 0x7F {
            return Err(AddressErrorKind::OutOfRange);
        }
        any_digit = true;
        after_separator = false;
    }

    // "0x" alone, or a trailing separator.
    if after_separator || !any_digit {
        return Err(AddressErrorKind::InvalidDigit);
    }

    Ok(value as u8)
}

/// Everything the controller needs to start sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuConfig {
    /// Identifier handed to the bus factory. Empty selects its default bus.
    pub bus: String<MAX_BUS_NAME_LEN>,
    pub accel_gyro_address: String<MAX_ADDRESS_LEN>,
    pub magnetometer_address: String<MAX_ADDRESS_LEN>,
    pub magnetometer_enabled: bool,
    pub gyro_fsr: GyroFsr,
    pub gyro_odr: GyroOdr,
    pub accel_fsr: AccelFsr,
    pub accel_odr: AccelOdr,
    pub sample_interval_ms: u32,
    pub error_policy: ErrorPolicy,
}

impl Default for ImuConfig {
    fn default() -> Self {
        let mut accel_gyro_address = String::new();
        let mut magnetometer_address = String::new();
        // Both literals are shorter than MAX_ADDRESS_LEN.
        let _ = accel_gyro_address.push_str("0x6A");
        let _ = magnetometer_address.push_str("0x1C");
        Self {
            bus: String::new(),
            accel_gyro_address,
            magnetometer_address,
            magnetometer_enabled: false,
            gyro_fsr: GyroFsr::Fs245Dps,
            gyro_odr: GyroOdr::Odr952Hz,
            accel_fsr: AccelFsr::Fs2G,
            accel_odr: AccelOdr::Odr952Hz,
            sample_interval_ms: 100,
            error_policy: ErrorPolicy::Continue,
        }
    }
}

impl ImuConfig {
    /// Parse both configured addresses.
    pub fn resolve(&self) -> Result<DeviceAddresses, AddressParseError> {
        let accel_gyro = parse_address(&self.accel_gyro_address).map_err(
            |kind| AddressParseError {
                field: AddressField::AccelGyro,
                kind,
            },
        )?;
        let magnetometer = parse_address(&self.magnetometer_address)
            .map_err(|kind| AddressParseError {
                field: AddressField::Magnetometer,
                kind,
            })?;
        Ok(DeviceAddresses {
            accel_gyro,
            magnetometer,
        })
    }
}
