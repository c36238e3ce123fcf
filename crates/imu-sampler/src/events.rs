//! Readings handed to the outside world.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{self, TrySendError};
use lsm9ds1::{Channel, RawSample, ScaledSample};
use serde::{Deserialize, Serialize};

use crate::config::define_config_enum;

/// Upper bound of an encoded frame, length prefix included.
pub const MAX_FRAME_LEN: usize = 2 + 48;

define_config_enum!(ChannelKind, lsm9ds1::Channel, {
    Accelerometer,
    Gyroscope,
});

/// One completed poll cycle of one channel.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub channel: Channel,
    /// Taken after the burst read completed.
    pub timestamp_us: u64,
    pub raw: RawSample,
    /// `raw` times the channel resolution, in g or dps.
    pub scaled: ScaledSample,
    /// False only when the error policy marks failed cycles. Under
    /// [`ErrorPolicy::Continue`](crate::ErrorPolicy::Continue) a stale buffer
    /// is emitted as valid.
    pub valid: bool,
}

/// Serialized layout of a [`Reading`].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireReading {
    pub channel: ChannelKind,
    pub timestamp_us: u64,
    pub raw: [i16; 3],
    pub scaled: [f32; 3],
    pub valid: bool,
}

impl From<&Reading> for WireReading {
    fn from(reading: &Reading) -> Self {
        let (raw, scaled) = (reading.raw, reading.scaled);
        Self {
            channel: reading.channel.into(),
            timestamp_us: reading.timestamp_us,
            raw: [raw.x, raw.y, raw.z],
            scaled: [scaled.x, scaled.y, scaled.z],
            valid: reading.valid,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    BufferTooSmall,
}

impl Reading {
    pub fn new(
        channel: Channel,
        timestamp_us: u64,
        raw: RawSample,
        resolution: f32,
        valid: bool,
    ) -> Self {
        Self {
            channel,
            timestamp_us,
            raw,
            scaled: raw.scaled(resolution),
            valid,
        }
    }

    /// Write a little-endian `u16` length followed by the postcard encoding
    /// of the reading. Returns the used part of `buf`.
    pub fn encode_frame<'b>(
        &self,
        buf: &'b mut [u8],
    ) -> Result<&'b [u8], FrameError> {
        if buf.len() < 2 {
            return Err(FrameError::BufferTooSmall);
        }
        let used = postcard::to_slice(&WireReading::from(self), &mut buf[2..])
            .map_err(|_| FrameError::BufferTooSmall)?
            .len();
        let len = u16::try_from(used).map_err(|_| FrameError::BufferTooSmall)?;
        buf[..2].copy_from_slice(&len.to_le_bytes());
        Ok(&buf[..2 + used])
    }
}

/// Receiver of readings. Called from both sampling loops.
pub trait ReadingSink {
    fn emit(&self, reading: Reading);
}

impl<T: ReadingSink + ?Sized> ReadingSink for &T {
    fn emit(&self, reading: Reading) {
        T::emit(self, reading)
    }
}

/// Forwards readings into a bounded embassy channel.
///
/// The loops never wait on the consumer; a reading that does not fit is
/// dropped and logged.
pub struct ChannelSink<'a, M: RawMutex, const N: usize> {
    queue: &'a channel::Channel<M, Reading, N>,
}

impl<'a, M: RawMutex, const N: usize> ChannelSink<'a, M, N> {
    pub fn new(queue: &'a channel::Channel<M, Reading, N>) -> Self {
        Self { queue }
    }
}

impl<M: RawMutex, const N: usize> ReadingSink for ChannelSink<'_, M, N> {
    fn emit(&self, reading: Reading) {
        if let Err(TrySendError::Full(dropped)) = self.queue.try_send(reading) {
            warn!(
                "reading queue full, dropped {:?} reading at {} us",
                dropped.channel, dropped.timestamp_us
            );
        }
    }
}
