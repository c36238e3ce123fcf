//! Bus addresses, identity values and register offsets.
//!
//! Offsets follow the ST datasheet (DocID025715). The field layout of each
//! register lives in [`ll`](crate::ll); the offsets here label configuration
//! failures. Magnetometer offsets are relative to its own bus address.

/// Default address of the accelerometer/gyroscope package (SDO_AG high).
pub const DEFAULT_AG_ADDRESS: u8 = 0x6A;
/// Default address of the magnetometer (SDO_M low).
pub const DEFAULT_MAG_ADDRESS: u8 = 0x1C;

/// `WHO_AM_I` value reported by the accelerometer/gyroscope.
pub const AG_WHO_AM_I: u8 = 0x68;
/// `WHO_AM_I` value reported by the magnetometer.
pub const MAG_WHO_AM_I: u8 = 0x3D;

pub const CTRL_REG1_G: u8 = 0x10;
pub const CTRL_REG2_G: u8 = 0x11;
pub const CTRL_REG3_G: u8 = 0x12;
pub const OUT_X_L_G: u8 = 0x18;
pub const CTRL_REG4: u8 = 0x1E;
pub const CTRL_REG5_XL: u8 = 0x1F;
pub const CTRL_REG6_XL: u8 = 0x20;
pub const CTRL_REG7_XL: u8 = 0x21;
pub const OUT_X_L_XL: u8 = 0x28;

pub const CTRL_REG1_M: u8 = 0x20;
pub const CTRL_REG2_M: u8 = 0x21;
pub const CTRL_REG3_M: u8 = 0x22;
pub const CTRL_REG4_M: u8 = 0x23;
pub const CTRL_REG5_M: u8 = 0x24;
