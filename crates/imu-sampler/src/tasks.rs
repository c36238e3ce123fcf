//! Per-channel sampling loop.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c;
use lsm9ds1::{Channel, ChannelReader, RawSample, TransportError};
use portable_atomic::{AtomicBool, Ordering};

use crate::events::{Reading, ReadingSink};
use crate::fmt::Dbg;
use crate::policy::ErrorPolicy;
use crate::time::TimeSource;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopSettings {
    pub interval_ms: u32,
    pub policy: ErrorPolicy,
}

/// How a sampling loop ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopReport {
    pub channel: Channel,
    /// Readings emitted.
    pub cycles: u32,
    /// The loop gave up on a transport error instead of seeing the active
    /// flag cleared.
    pub failed: bool,
}

/// Poll one channel until `active` is cleared.
///
/// Each cycle burst-reads the six output registers, emits one reading and
/// then sleeps for the configured interval. `active` is only checked between
/// cycles, so a burst in flight always completes.
pub async fn sampling_loop<I, D, T, S>(
    mut reader: ChannelReader<I>,
    active: &AtomicBool,
    settings: LoopSettings,
    mut delay: D,
    time: &T,
    sink: &S,
) -> LoopReport
where
    I: i2c::I2c,
    D: DelayNs,
    T: TimeSource + ?Sized,
    S: ReadingSink + ?Sized,
{
    let channel = reader.channel();
    let resolution = reader.resolution();
    // Survives across cycles so a failed read repeats the last good sample.
    let mut last = RawSample::default();
    let mut report = LoopReport {
        channel,
        cycles: 0,
        failed: false,
    };

    debug!(
        "{:?} sampling every {} ms, policy {:?}",
        channel, settings.interval_ms, settings.policy
    );

    while active.load(Ordering::Acquire) {
        let cycle = read_cycle(&mut reader, &mut last, settings.policy).await;
        let valid = match cycle {
            Ok(valid) => valid,
            Err(_) => {
                error!("{:?} sampling stopped after a bus error", channel);
                report.failed = true;
                break;
            }
        };

        trace!("{:?} raw {:?}", channel, last);
        sink.emit(Reading::new(channel, time.now_us(), last, resolution, valid));
        report.cycles = report.cycles.wrapping_add(1);

        delay.delay_ms(settings.interval_ms).await;
    }

    debug!("{:?} sampling ended after {} cycles", channel, report.cycles);
    report
}

/// One burst read under `policy`. `Ok(valid)` means a reading is emitted.
async fn read_cycle<I: i2c::I2c>(
    reader: &mut ChannelReader<I>,
    last: &mut RawSample,
    policy: ErrorPolicy,
) -> Result<bool, TransportError<I::Error>> {
    let mut retries = policy.retries();
    loop {
        match reader.read().await {
            Ok(raw) => {
                *last = raw;
                return Ok(true);
            }
            Err(e) => {
                error!("{:?} burst read failed: {:?}", reader.channel(), Dbg(&e));
                if retries > 0 {
                    retries -= 1;
                    continue;
                }
                return match policy {
                    ErrorPolicy::Continue => Ok(true),
                    ErrorPolicy::RetryThenMarkInvalid { .. } => Ok(false),
                    ErrorPolicy::FailFast => Err(e),
                };
            }
        }
    }
}
