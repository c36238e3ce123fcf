#![no_std]
//! Async driver for the ST LSM9DS1 accelerometer/gyroscope/magnetometer.
//!
//! The driver covers bring-up of the accelerometer and gyroscope, full-scale
//! and output data rate selection, and burst reads of the axis outputs. The
//! magnetometer only has its fixed bring-up sequence, behind the
//! `magnetometer` feature.
//!
//! Configuration steps never abort on the first failure. Each step's outcome
//! is collected in a [`ConfigReport`] so the caller decides how to react.

pub mod config;
pub mod ll;
pub mod registers;
pub mod sample;

pub use config::{
    AccelFsr, AccelOdr, Channel, ChannelConfig, GyroFsr, GyroOdr, Unit,
};
pub use ll::TransportError;
pub use sample::{decode_axis, RawSample, ScaledSample};

use embedded_hal_async::i2c;
use heapless::Vec;
use registers::{
    AG_WHO_AM_I, CTRL_REG1_G, CTRL_REG2_G, CTRL_REG3_G, CTRL_REG4,
    CTRL_REG5_XL, CTRL_REG6_XL, CTRL_REG7_XL, DEFAULT_AG_ADDRESS,
    DEFAULT_MAG_ADDRESS,
};
#[cfg(feature = "magnetometer")]
use registers::{
    CTRL_REG1_M, CTRL_REG2_M, CTRL_REG3_M, CTRL_REG4_M, CTRL_REG5_M,
    MAG_WHO_AM_I,
};

type Registers<I2c> = ll::Device<ll::DeviceInterface<I2c>>;

impl Channel {
    /// Selectors the bring-up sequence leaves in the control register.
    pub fn bring_up_config(self) -> ChannelConfig {
        match self {
            Self::Accelerometer => ChannelConfig::reset(self),
            Self::Gyroscope => {
                ChannelConfig::gyro(GyroFsr::Fs245Dps, GyroOdr::Odr952Hz)
            }
        }
    }
}

#[derive(derive_more::From, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<I2cError> {
    Transport(TransportError<I2cError>),
    /// `WHO_AM_I` returned an unexpected value.
    #[from(ignore)]
    WrongDevice { expected: u8, found: u8 },
}

/// Bus addresses of the two packages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceAddresses {
    pub accel_gyro: u8,
    pub magnetometer: u8,
}

impl Default for DeviceAddresses {
    fn default() -> Self {
        Self {
            accel_gyro: DEFAULT_AG_ADDRESS,
            magnetometer: DEFAULT_MAG_ADDRESS,
        }
    }
}

/// Which half of a configuration step failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigStep {
    Write,
    Read,
}

/// One failed configuration step.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigFailure<E> {
    pub address: u8,
    pub register: u8,
    pub step: ConfigStep,
    pub error: TransportError<E>,
}

/// Outcome of a configuration sequence.
#[derive(Debug)]
pub struct ConfigReport<E> {
    failures: Vec<ConfigFailure<E>, 8>,
    /// Steps not recorded because `failures` was full.
    overflow: usize,
}

impl<E> Default for ConfigReport<E> {
    fn default() -> Self {
        Self { failures: Vec::new(), overflow: 0 }
    }
}

impl<E> ConfigReport<E> {
    fn record(&mut self, failure: ConfigFailure<E>) {
        if self.failures.push(failure).is_err() {
            self.overflow += 1;
        }
    }

    /// Record `result` if it failed, otherwise hand back its value.
    fn check<T>(
        &mut self,
        address: u8,
        register: u8,
        step: ConfigStep,
        result: Result<T, TransportError<E>>,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.record(ConfigFailure { address, register, step, error });
                None
            }
        }
    }

    /// True when every step succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.overflow == 0
    }

    pub fn failures(&self) -> &[ConfigFailure<E>] {
        &self.failures
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len() + self.overflow
    }

    pub fn into_failures(self) -> Vec<ConfigFailure<E>, 8> {
        self.failures
    }
}

pub struct Lsm9ds1<I2c: i2c::I2c> {
    pub device: Registers<I2c>,
    addresses: DeviceAddresses,
    gyro: ChannelConfig,
    accel: ChannelConfig,
}

impl<I2c: i2c::I2c> Lsm9ds1<I2c> {
    pub fn new(i2c: I2c, addresses: DeviceAddresses) -> Self {
        Self {
            device: ll::Device::new(ll::DeviceInterface::new(i2c, addresses)),
            addresses,
            gyro: ChannelConfig::reset(Channel::Gyroscope),
            accel: ChannelConfig::reset(Channel::Accelerometer),
        }
    }

    pub fn addresses(&self) -> DeviceAddresses {
        self.addresses
    }

    /// Check `WHO_AM_I` of the accelerometer/gyroscope package.
    pub async fn verify_accel_gyro(&mut self) -> Result<(), Error<I2c::Error>> {
        let found = self.device.who_am_i().read_async().await?.value();
        if found != AG_WHO_AM_I {
            return Err(Error::WrongDevice {
                expected: AG_WHO_AM_I,
                found,
            });
        }
        Ok(())
    }

    /// Check `WHO_AM_I` of the magnetometer.
    #[cfg(feature = "magnetometer")]
    pub async fn verify_magnetometer(
        &mut self,
    ) -> Result<(), Error<I2c::Error>> {
        let found = self.device.mag_who_am_i().read_async().await?.value();
        if found != MAG_WHO_AM_I {
            return Err(Error::WrongDevice {
                expected: MAG_WHO_AM_I,
                found,
            });
        }
        Ok(())
    }

    /// Bring up the gyroscope and select its range and rate.
    ///
    /// Writes `CTRL_REG1_G`, `CTRL_REG2_G`, `CTRL_REG3_G` and `CTRL_REG4` in
    /// that order, then read-modify-writes the selectors into `CTRL_REG1_G`.
    pub async fn configure_gyro(
        &mut self,
        fsr: GyroFsr,
        odr: GyroOdr,
    ) -> ConfigReport<I2c::Error> {
        let address = self.addresses.accel_gyro;
        let mut report = ConfigReport::default();

        let bring_up = Channel::Gyroscope.bring_up_config();
        let result = self
            .device
            .gyro_ctrl()
            .write_async(|w| {
                w.set_fs(bring_up.full_scale_bits());
                w.set_odr(bring_up.odr_bits());
            })
            .await;
        // The device now runs at the bring-up range, whatever came before.
        if report
            .check(address, CTRL_REG1_G, ConfigStep::Write, result)
            .is_some()
        {
            self.gyro = bring_up;
        }

        let result = self.device.gyro_out_sel().write_async(|_| ()).await;
        report.check(address, CTRL_REG2_G, ConfigStep::Write, result);
        let result = self.device.gyro_filter().write_async(|_| ()).await;
        report.check(address, CTRL_REG3_G, ConfigStep::Write, result);
        let result = self
            .device
            .gyro_axes()
            .write_async(|w| {
                w.set_xen(true);
                w.set_yen(true);
                w.set_zen(true);
            })
            .await;
        report.check(address, CTRL_REG4, ConfigStep::Write, result);

        // Read and write separately so each half is reported on its own. A
        // failed read leaves nothing to modify, so the write is skipped.
        let target = ChannelConfig::gyro(fsr, odr);
        let result = self.device.gyro_ctrl().read_async().await;
        if let Some(mut ctrl) =
            report.check(address, CTRL_REG1_G, ConfigStep::Read, result)
        {
            ctrl.set_fs(target.full_scale_bits());
            ctrl.set_odr(target.odr_bits());
            let result = self.device.gyro_ctrl().write_async(|w| *w = ctrl).await;
            if report
                .check(address, CTRL_REG1_G, ConfigStep::Write, result)
                .is_some()
            {
                self.gyro = target;
            }
        }

        report
    }

    /// Bring up the accelerometer and select its range and rate.
    ///
    /// Writes `CTRL_REG5_XL`, `CTRL_REG6_XL` and `CTRL_REG7_XL` in that
    /// order, then read-modify-writes the selectors into `CTRL_REG6_XL`.
    pub async fn configure_accel(
        &mut self,
        fsr: AccelFsr,
        odr: AccelOdr,
    ) -> ConfigReport<I2c::Error> {
        let address = self.addresses.accel_gyro;
        let mut report = ConfigReport::default();

        let result = self
            .device
            .accel_axes()
            .write_async(|w| {
                w.set_xen(true);
                w.set_yen(true);
                w.set_zen(true);
            })
            .await;
        report.check(address, CTRL_REG5_XL, ConfigStep::Write, result);

        let bring_up = Channel::Accelerometer.bring_up_config();
        let result = self
            .device
            .accel_ctrl()
            .write_async(|w| {
                w.set_fs(bring_up.full_scale_bits());
                w.set_odr(bring_up.odr_bits());
            })
            .await;
        if report
            .check(address, CTRL_REG6_XL, ConfigStep::Write, result)
            .is_some()
        {
            self.accel = bring_up;
        }

        let result = self.device.accel_filter().write_async(|_| ()).await;
        report.check(address, CTRL_REG7_XL, ConfigStep::Write, result);

        let target = ChannelConfig::accel(fsr, odr);
        let result = self.device.accel_ctrl().read_async().await;
        if let Some(mut ctrl) =
            report.check(address, CTRL_REG6_XL, ConfigStep::Read, result)
        {
            ctrl.set_fs(target.full_scale_bits());
            ctrl.set_odr(target.odr_bits());
            let result =
                self.device.accel_ctrl().write_async(|w| *w = ctrl).await;
            if report
                .check(address, CTRL_REG6_XL, ConfigStep::Write, result)
                .is_some()
            {
                self.accel = target;
            }
        }

        report
    }

    /// Apply the fixed magnetometer bring-up sequence. No range selection.
    #[cfg(feature = "magnetometer")]
    pub async fn configure_magnetometer(&mut self) -> ConfigReport<I2c::Error> {
        let address = self.addresses.magnetometer;
        let mut report = ConfigReport::default();

        // 80 Hz, low-power XY, no temperature compensation: 0x1C.
        let result = self
            .device
            .mag_rate()
            .write_async(|w| {
                w.set_om(0);
                w.set_do_rate(0b111);
            })
            .await;
        report.check(address, CTRL_REG1_M, ConfigStep::Write, result);
        let result = self.device.mag_scale().write_async(|w| w.set_fs(0)).await;
        report.check(address, CTRL_REG2_M, ConfigStep::Write, result);
        // Continuous conversion.
        let result = self.device.mag_mode().write_async(|w| w.set_md(0)).await;
        report.check(address, CTRL_REG3_M, ConfigStep::Write, result);
        let result = self.device.mag_z_mode().write_async(|_| ()).await;
        report.check(address, CTRL_REG4_M, ConfigStep::Write, result);
        let result = self.device.mag_update().write_async(|_| ()).await;
        report.check(address, CTRL_REG5_M, ConfigStep::Write, result);

        report
    }

    /// Change the gyroscope range, keeping its rate and bandwidth.
    pub async fn set_gyro_range(
        &mut self,
        fsr: GyroFsr,
    ) -> Result<(), Error<I2c::Error>> {
        self.device
            .gyro_ctrl()
            .modify_async(|w| w.set_fs(fsr.into()))
            .await?;
        self.gyro = self.gyro.with_full_scale(fsr.into(), fsr.resolution());
        Ok(())
    }

    /// Change the accelerometer range, keeping its rate and bandwidth.
    pub async fn set_accel_range(
        &mut self,
        fsr: AccelFsr,
    ) -> Result<(), Error<I2c::Error>> {
        self.device
            .accel_ctrl()
            .modify_async(|w| w.set_fs(fsr.into()))
            .await?;
        self.accel = self.accel.with_full_scale(fsr.into(), fsr.resolution());
        Ok(())
    }

    /// Change the gyroscope output data rate, keeping its range.
    pub async fn set_gyro_rate(
        &mut self,
        odr: GyroOdr,
    ) -> Result<(), Error<I2c::Error>> {
        self.set_rate(Channel::Gyroscope, odr.into()).await
    }

    /// Change the accelerometer output data rate, keeping its range.
    pub async fn set_accel_rate(
        &mut self,
        odr: AccelOdr,
    ) -> Result<(), Error<I2c::Error>> {
        self.set_rate(Channel::Accelerometer, odr.into()).await
    }

    /// Put a channel's ODR field to power-down. Range and resolution are kept.
    pub async fn power_down(
        &mut self,
        channel: Channel,
    ) -> Result<(), Error<I2c::Error>> {
        self.set_rate(channel, 0).await
    }

    async fn set_rate(
        &mut self,
        channel: Channel,
        odr: u8,
    ) -> Result<(), Error<I2c::Error>> {
        match channel {
            Channel::Accelerometer => {
                self.device
                    .accel_ctrl()
                    .modify_async(|w| w.set_odr(odr))
                    .await?
            }
            Channel::Gyroscope => {
                self.device
                    .gyro_ctrl()
                    .modify_async(|w| w.set_odr(odr))
                    .await?
            }
        };
        let config = self.channel_mut(channel);
        *config = config.with_odr(odr);
        Ok(())
    }

    /// Burst-read the raw X/Y/Z output registers of `channel`.
    pub async fn read_raw(
        &mut self,
        channel: Channel,
    ) -> Result<RawSample, Error<I2c::Error>> {
        Ok(read_burst(&mut self.device, channel).await?)
    }

    /// Burst-read and scale `channel`.
    pub async fn read_scaled(
        &mut self,
        channel: Channel,
    ) -> Result<ScaledSample, Error<I2c::Error>> {
        let raw = self.read_raw(channel).await?;
        Ok(raw.scaled(self.channel_config(channel).resolution()))
    }

    pub fn channel_config(&self, channel: Channel) -> ChannelConfig {
        match channel {
            Channel::Accelerometer => self.accel,
            Channel::Gyroscope => self.gyro,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelConfig {
        match channel {
            Channel::Accelerometer => &mut self.accel,
            Channel::Gyroscope => &mut self.gyro,
        }
    }

    /// Hand out a reader for `channel` on a second bus device.
    ///
    /// The reader carries a copy of the channel's current configuration, so
    /// its resolution cannot change underneath a running sampling loop.
    pub fn reader<J: i2c::I2c>(
        &self,
        channel: Channel,
        i2c: J,
    ) -> ChannelReader<J> {
        ChannelReader {
            device: ll::Device::new(ll::DeviceInterface::new(
                i2c,
                self.addresses,
            )),
            config: self.channel_config(channel),
        }
    }
}

/// One six-byte burst of `channel`'s output registers, in one transaction.
async fn read_burst<I2c: i2c::I2c>(
    device: &mut Registers<I2c>,
    channel: Channel,
) -> Result<RawSample, TransportError<I2c::Error>> {
    let raw = match channel {
        Channel::Accelerometer => {
            let out = device.accel_out().read_async().await?;
            RawSample::new(out.x(), out.y(), out.z())
        }
        Channel::Gyroscope => {
            let out = device.gyro_out().read_async().await?;
            RawSample::new(out.x(), out.y(), out.z())
        }
    };
    Ok(raw)
}

/// Burst reader for one configured channel.
pub struct ChannelReader<I2c: i2c::I2c> {
    device: Registers<I2c>,
    config: ChannelConfig,
}

impl<I2c: i2c::I2c> ChannelReader<I2c> {
    pub fn channel(&self) -> Channel {
        self.config.channel()
    }

    pub fn config(&self) -> ChannelConfig {
        self.config
    }

    pub fn resolution(&self) -> f32 {
        self.config.resolution()
    }

    /// Read one output burst.
    pub async fn read(
        &mut self,
    ) -> Result<RawSample, TransportError<I2c::Error>> {
        read_burst(&mut self.device, self.config.channel()).await
    }
}
