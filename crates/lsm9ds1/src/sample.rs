/// Reassemble one axis from its output register pair.
///
/// The device stores each axis little-endian: low byte at the lower offset.
#[inline]
pub const fn decode_axis(low: u8, high: u8) -> i16 {
    (((high as u16) << 8) | low as u16) as i16
}

/// Raw X/Y/Z counts from one 6-byte output burst.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RawSample {
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    pub const fn from_le_bytes(data: [u8; 6]) -> Self {
        Self {
            x: decode_axis(data[0], data[1]),
            y: decode_axis(data[2], data[3]),
            z: decode_axis(data[4], data[5]),
        }
    }

    /// Multiply every axis by `resolution` (units per LSB).
    pub fn scaled(&self, resolution: f32) -> ScaledSample {
        ScaledSample {
            x: f32::from(self.x) * resolution,
            y: f32::from(self.y) * resolution,
            z: f32::from(self.z) * resolution,
        }
    }
}

/// X/Y/Z in physical units (g or dps depending on the channel).
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScaledSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}
