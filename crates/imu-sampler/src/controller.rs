//! Lifecycle of one IMU: bus acquisition, configuration, sampling, shutdown.

use bus_manager::{BusError, BusFactory, BusManager};
use embassy_embedded_hal::shared_bus::I2cDeviceError;
use embassy_futures::join::join3;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c;
use lsm9ds1::{Channel, ChannelConfig, ConfigFailure, ConfigReport, Lsm9ds1};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::config::{AddressParseError, ImuConfig};
use crate::events::ReadingSink;
use crate::fmt::Dbg;
use crate::tasks::{sampling_loop, LoopReport, LoopSettings};
use crate::time::TimeSource;

#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ImuState {
    Unconfigured,
    Configuring,
    Sampling,
    Stopping,
    Closed,
}

/// Reasons [`ImuController::run`] gave up before sampling.
///
/// `E` is the bus factory error, `T` the error of a single bus transaction.
#[derive(derive_more::From, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartError<E: core::fmt::Debug, T> {
    /// `run` was called on a controller that already ran.
    #[from(ignore)]
    AlreadyStarted,
    BusAcquisition(BusError<E>),
    AddressParse(AddressParseError),
    /// Only returned under [`ErrorPolicy::FailFast`](crate::ErrorPolicy::FailFast).
    Configuration(ConfigFailure<T>),
}

/// Transaction error of a device on a shared I2C bus.
pub type DeviceError<I> = I2cDeviceError<<I as i2c::ErrorType>::Error>;

/// Both loops' outcome after a completed run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RunSummary {
    pub gyro: LoopReport,
    pub accel: LoopReport,
}

/// Owns the lifecycle of one LSM9DS1.
///
/// A controller runs once. [`run`](Self::run) drives every state transition
/// and only returns after the bus has been handed back to the manager;
/// [`stop`](Self::stop) may be called from any other task.
pub struct ImuController<'a, M: RawMutex, F: BusFactory> {
    bus_manager: &'a BusManager<M, F>,
    config: ImuConfig,
    state: AtomicU8,
    active: AtomicBool,
    stop: Signal<M, ()>,
    gyro_resolution: AtomicU32,
    accel_resolution: AtomicU32,
}

impl<'a, M: RawMutex, F: BusFactory> ImuController<'a, M, F> {
    pub fn new(bus_manager: &'a BusManager<M, F>, config: ImuConfig) -> Self {
        let reset = |channel| ChannelConfig::reset(channel).resolution().to_bits();
        Self {
            bus_manager,
            config,
            state: AtomicU8::new(ImuState::Unconfigured.into()),
            active: AtomicBool::new(false),
            stop: Signal::new(),
            gyro_resolution: AtomicU32::new(reset(Channel::Gyroscope)),
            accel_resolution: AtomicU32::new(reset(Channel::Accelerometer)),
        }
    }

    pub fn config(&self) -> &ImuConfig {
        &self.config
    }

    pub fn state(&self) -> ImuState {
        ImuState::try_from(self.state.load(Ordering::Acquire))
            .unwrap_or(ImuState::Closed)
    }

    /// True while the sampling loops are meant to keep polling.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Ask a running controller to stop. Each loop finishes its current
    /// cycle, including the sleep, before exiting.
    pub fn stop(&self) {
        self.stop.signal(());
    }

    /// Units per LSB the device last accepted for `channel`.
    pub fn resolution(&self, channel: Channel) -> f32 {
        f32::from_bits(self.resolution_cell(channel).load(Ordering::Acquire))
    }

    fn resolution_cell(&self, channel: Channel) -> &AtomicU32 {
        match channel {
            Channel::Accelerometer => &self.accel_resolution,
            Channel::Gyroscope => &self.gyro_resolution,
        }
    }

    fn set_state(&self, state: ImuState) {
        info!("IMU state: {:?}", state);
        self.state.store(state.into(), Ordering::Release);
    }

    /// Start up, sample both channels until [`stop`](Self::stop), then shut
    /// down and release the bus.
    pub async fn run<I, D, T, S>(
        &self,
        delay: D,
        time: &T,
        sink: &S,
    ) -> Result<RunSummary, StartError<F::Error, DeviceError<I>>>
    where
        F: BusFactory<Bus = Mutex<M, I>>,
        I: i2c::I2c,
        D: DelayNs + Clone,
        T: TimeSource + ?Sized,
        S: ReadingSink + ?Sized,
    {
        if self
            .state
            .compare_exchange(
                ImuState::Unconfigured.into(),
                ImuState::Configuring.into(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(StartError::AlreadyStarted);
        }
        info!("IMU state: {:?}", ImuState::Configuring);

        let handle = match self.bus_manager.acquire(&self.config.bus).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    "failed to acquire bus '{}': {:?}",
                    self.config.bus.as_str(),
                    Dbg(&e)
                );
                self.close().await;
                return Err(e.into());
            }
        };
        info!("acquired bus '{}'", self.config.bus.as_str());

        let addresses = match self.config.resolve() {
            Ok(addresses) => addresses,
            Err(e) => {
                error!("invalid device address: {:?}", e);
                drop(handle);
                self.close().await;
                return Err(e.into());
            }
        };
        debug!(
            "accel/gyro at {:#x}, magnetometer at {:#x}",
            addresses.accel_gyro, addresses.magnetometer
        );

        let mut imu = Lsm9ds1::new(handle.i2c_device(), addresses);
        if let Err(e) = imu.verify_accel_gyro().await {
            warn!("accel/gyro identity check failed: {:?}", Dbg(&e));
        }

        if let Some(failure) = self.configure(&mut imu).await {
            if self.config.error_policy.aborts_on_config_failure() {
                drop(imu);
                drop(handle);
                self.close().await;
                return Err(StartError::Configuration(failure));
            }
        }

        let settings = LoopSettings {
            interval_ms: self.config.sample_interval_ms,
            policy: self.config.error_policy,
        };
        let gyro_reader = imu.reader(Channel::Gyroscope, handle.i2c_device());
        let accel_reader = imu.reader(Channel::Accelerometer, handle.i2c_device());
        let gyro_delay = delay.clone();

        self.active.store(true, Ordering::Release);
        self.set_state(ImuState::Sampling);

        // A loop that gives up counts as finished; once both have, nothing
        // is left to stop, so the controller stops itself.
        let running = AtomicU8::new(2);
        let finished = || {
            if running.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.stop.signal(());
            }
        };

        let control = async {
            self.stop.wait().await;
            self.set_state(ImuState::Stopping);
            self.active.store(false, Ordering::Release);
        };
        let gyro_loop = async {
            let report = sampling_loop(
                gyro_reader,
                &self.active,
                settings,
                gyro_delay,
                time,
                sink,
            )
            .await;
            finished();
            report
        };
        let accel_loop = async {
            let report = sampling_loop(
                accel_reader,
                &self.active,
                settings,
                delay,
                time,
                sink,
            )
            .await;
            finished();
            report
        };

        let ((), gyro, accel) = join3(control, gyro_loop, accel_loop).await;
        info!(
            "sampling stopped: gyro {} cycles, accel {} cycles",
            gyro.cycles, accel.cycles
        );

        for channel in [Channel::Gyroscope, Channel::Accelerometer] {
            if let Err(e) = imu.power_down(channel).await {
                warn!("failed to power down {:?}: {:?}", channel, Dbg(&e));
            }
        }

        drop(imu);
        drop(handle);
        self.close().await;
        Ok(RunSummary { gyro, accel })
    }

    /// Run every configuration step, logging failures. Returns the first
    /// failure, if any.
    async fn configure<J: i2c::I2c>(
        &self,
        imu: &mut Lsm9ds1<J>,
    ) -> Option<ConfigFailure<J::Error>> {
        let config = &self.config;

        let gyro = imu
            .configure_gyro(config.gyro_fsr.into(), config.gyro_odr.into())
            .await;
        self.resolution_cell(Channel::Gyroscope).store(
            imu.channel_config(Channel::Gyroscope).resolution().to_bits(),
            Ordering::Release,
        );
        let mut first = log_report("gyroscope", gyro);

        let accel = imu
            .configure_accel(config.accel_fsr.into(), config.accel_odr.into())
            .await;
        self.resolution_cell(Channel::Accelerometer).store(
            imu.channel_config(Channel::Accelerometer).resolution().to_bits(),
            Ordering::Release,
        );
        first = first.or(log_report("accelerometer", accel));

        #[cfg(feature = "magnetometer")]
        if config.magnetometer_enabled {
            if let Err(e) = imu.verify_magnetometer().await {
                warn!("magnetometer identity check failed: {:?}", Dbg(&e));
            }
            let mag = imu.configure_magnetometer().await;
            first = first.or(log_report("magnetometer", mag));
        }
        #[cfg(not(feature = "magnetometer"))]
        if config.magnetometer_enabled {
            warn!("magnetometer requested but support is not compiled in");
        }

        first
    }

    async fn close(&self) {
        match self.bus_manager.try_release().await {
            Ok(()) => info!("bus released"),
            Err(e) => error!("failed to release bus: {:?}", Dbg(&e)),
        }
        self.active.store(false, Ordering::Release);
        self.set_state(ImuState::Closed);
    }
}

fn log_report<E: core::fmt::Debug>(
    what: &str,
    report: ConfigReport<E>,
) -> Option<ConfigFailure<E>> {
    for failure in report.failures() {
        error!(
            "{} configuration: {:?} of register {:#x} at {:#x} failed: {:?}",
            what,
            failure.step,
            failure.register,
            failure.address,
            Dbg(&failure.error)
        );
    }
    if report.failure_count() > report.failures().len() {
        error!(
            "{} configuration: {} further failures not recorded",
            what,
            report.failure_count() - report.failures().len()
        );
    }
    report.into_failures().into_iter().next()
}
