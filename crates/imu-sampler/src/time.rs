/// Source of reading timestamps.
pub trait TimeSource {
    /// Microseconds since an arbitrary, fixed epoch. Must not go backwards.
    fn now_us(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now_us(&self) -> u64 {
        T::now_us(self)
    }
}

/// Timestamps from the embassy time driver, relative to boot.
#[cfg(feature = "embassy-time")]
#[derive(Copy, Clone, Debug, Default)]
pub struct EmbassyClock;

#[cfg(feature = "embassy-time")]
impl TimeSource for EmbassyClock {
    fn now_us(&self) -> u64 {
        embassy_time::Instant::now().as_micros()
    }
}
