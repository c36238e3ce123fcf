//! Low level register and interface definitions
use device_driver::AsyncRegisterInterface;
use embedded_hal_async::i2c;
use heapless::Vec;

use crate::DeviceAddresses;

/// Longest payload accepted by a single register write.
pub const MAX_WRITE_LEN: usize = 8;

/// Register addresses at or above this belong to the magnetometer package.
const MAG_PAGE: u16 = 0x0100;

#[derive(derive_more::From, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError<I2cError> {
    /// The bus reported a failure.
    Bus(I2cError),
    /// Register offset plus value did not fit the write buffer.
    #[from(ignore)]
    PayloadTooLong,
}

device_driver::create_device!(
    device_name: Device,
    dsl: {
        config {
            type RegisterAddressType = u16;
            type DefaultByteOrder = LE;
        }
        /// Accelerometer/gyroscope identity, reads 0x68.
        register WhoAmI {
            type Access = RO;
            const ADDRESS = 0x0F;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x68;

            value: uint = 0..8,
        },
        /// CTRL_REG1_G: gyroscope rate, range and bandwidth.
        register GyroCtrl {
            type Access = RW;
            const ADDRESS = 0x10;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x00;

            odr: uint = 5..8,
            fs: uint = 3..5,
            bw: uint = 0..2,
        },
        /// CTRL_REG2_G: interrupt and output selection.
        register GyroOutSel {
            type Access = RW;
            const ADDRESS = 0x11;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x00;

            int_sel: uint = 2..4,
            out_sel: uint = 0..2,
        },
        /// CTRL_REG3_G: low power and high-pass filter.
        register GyroFilter {
            type Access = RW;
            const ADDRESS = 0x12;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x00;

            lp_mode: bool = 7,
            hp_en: bool = 6,
            hpcf: uint = 0..4,
        },
        /// OUT_X_L_G through OUT_Z_H_G in one burst.
        register GyroOut {
            type Access = RO;
            const ADDRESS = 0x18;
            const SIZE_BITS = 48;

            x: int = 0..16,
            y: int = 16..32,
            z: int = 32..48,
        },
        /// CTRL_REG4: gyroscope axis enables.
        register GyroAxes {
            type Access = RW;
            const ADDRESS = 0x1E;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x38;

            zen: bool = 5,
            yen: bool = 4,
            xen: bool = 3,
            lir_xl1: bool = 1,
            four_d_xl1: bool = 0,
        },
        /// CTRL_REG5_XL: accelerometer decimation and axis enables.
        register AccelAxes {
            type Access = RW;
            const ADDRESS = 0x1F;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x38;

            dec: uint = 6..8,
            zen: bool = 5,
            yen: bool = 4,
            xen: bool = 3,
        },
        /// CTRL_REG6_XL: accelerometer rate, range and bandwidth.
        register AccelCtrl {
            type Access = RW;
            const ADDRESS = 0x20;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x00;

            odr: uint = 5..8,
            fs: uint = 3..5,
            bw_scal_odr: bool = 2,
            bw: uint = 0..2,
        },
        /// CTRL_REG7_XL: high resolution mode and filters.
        register AccelFilter {
            type Access = RW;
            const ADDRESS = 0x21;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x00;

            hr: bool = 7,
            dcf: uint = 5..7,
            fds: bool = 2,
            hpis1: bool = 0,
        },
        /// OUT_X_L_XL through OUT_Z_H_XL in one burst.
        register AccelOut {
            type Access = RO;
            const ADDRESS = 0x28;
            const SIZE_BITS = 48;

            x: int = 0..16,
            y: int = 16..32,
            z: int = 32..48,
        },
        /// Magnetometer identity, reads 0x3D.
        register MagWhoAmI {
            type Access = RO;
            const ADDRESS = 0x10F;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x3D;

            value: uint = 0..8,
        },
        /// CTRL_REG1_M: temperature compensation, XY mode and rate.
        register MagRate {
            type Access = RW;
            const ADDRESS = 0x120;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x10;

            temp_comp: bool = 7,
            om: uint = 5..7,
            do_rate: uint = 2..5,
            fast_odr: bool = 1,
            st: bool = 0,
        },
        /// CTRL_REG2_M: full scale.
        register MagScale {
            type Access = RW;
            const ADDRESS = 0x121;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x00;

            fs: uint = 5..7,
            reboot: bool = 3,
            soft_rst: bool = 2,
        },
        /// CTRL_REG3_M: operating mode.
        register MagMode {
            type Access = RW;
            const ADDRESS = 0x122;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x03;

            i2c_disable: bool = 7,
            lp: bool = 5,
            sim: bool = 2,
            md: uint = 0..2,
        },
        /// CTRL_REG4_M: Z axis mode and endianness.
        register MagZMode {
            type Access = RW;
            const ADDRESS = 0x123;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x00;

            omz: uint = 2..4,
            ble: bool = 1,
        },
        /// CTRL_REG5_M: block data update.
        register MagUpdate {
            type Access = RW;
            const ADDRESS = 0x124;
            const SIZE_BITS = 8;
            const RESET_VALUE = 0x00;

            fast_read: bool = 7,
            bdu: bool = 6,
        },
    }
);

/// Register transport for both LSM9DS1 packages.
///
/// Every register access maps to exactly one bus transaction. When `I2c` is
/// a shared-bus device the transaction runs under the bus lock, so callers
/// on other tasks can never interleave with it. No retries are attempted
/// here.
#[derive(Debug)]
pub struct DeviceInterface<I2c> {
    pub i2c: I2c,
    pub addresses: DeviceAddresses,
}

impl<I2c: i2c::I2c> DeviceInterface<I2c> {
    pub fn new(i2c: I2c, addresses: DeviceAddresses) -> Self {
        Self { i2c, addresses }
    }

    /// Bus address and 8-bit offset of a register address.
    fn route(&self, address: u16) -> (u8, u8) {
        let device = if address >= MAG_PAGE {
            self.addresses.magnetometer
        } else {
            self.addresses.accel_gyro
        };
        (device, address as u8)
    }

    /// Send `reg`, then clock in `buf.len()` bytes from consecutive registers.
    async fn read_dreg(
        &mut self,
        device: u8,
        reg: u8,
        buf: &mut [u8],
    ) -> Result<(), TransportError<I2c::Error>> {
        self.i2c.write_read(device, &[reg], buf).await?;
        Ok(())
    }

    /// Send `reg` immediately followed by `data` in one write.
    async fn write_dreg(
        &mut self,
        device: u8,
        reg: u8,
        data: &[u8],
    ) -> Result<(), TransportError<I2c::Error>> {
        let mut write_buf = Vec::<u8, { MAX_WRITE_LEN + 1 }>::new();
        write_buf
            .push(reg)
            .map_err(|_| TransportError::PayloadTooLong)?;
        write_buf
            .extend_from_slice(data)
            .map_err(|_| TransportError::PayloadTooLong)?;

        self.i2c.write(device, &write_buf).await?;
        Ok(())
    }
}

impl<I2c: i2c::I2c> AsyncRegisterInterface for DeviceInterface<I2c> {
    type AddressType = u16;
    type Error = TransportError<I2c::Error>;

    async fn read_register(
        &mut self,
        address: Self::AddressType,
        _size_bits: u32,
        data: &mut [u8],
    ) -> Result<(), Self::Error> {
        let (device, reg) = self.route(address);
        self.read_dreg(device, reg, data).await
    }

    async fn write_register(
        &mut self,
        address: Self::AddressType,
        _size_bits: u32,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        let (device, reg) = self.route(address);
        self.write_dreg(device, reg, data).await
    }
}
