use core::marker::PhantomData;
use core::ops::Deref;

use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c;
use portable_atomic::{AtomicUsize, Ordering};

use crate::factory::BusFactory;

/// RAII handle providing shared access to an open bus.
///
/// Dropping a handle decrements the user count. The bus is **not** closed
/// on drop: call [`BusManager::try_release`](crate::BusManager::try_release)
/// once every handle is gone.
pub struct BusHandle<'a, M: RawMutex, F: BusFactory> {
    bus_ptr: *const F::Bus,
    users: &'a AtomicUsize,
    _phantom: PhantomData<(&'a F::Bus, M)>,
}

impl<M: RawMutex, F: BusFactory> Deref for BusHandle<'_, M, F> {
    type Target = F::Bus;

    #[inline]
    fn deref(&self) -> &F::Bus {
        // SAFETY: The handle is alive (caller has `&self`), so users > 0.
        // `BusManager::try_release` refuses to drop the bus while users > 0,
        // so the pointee is valid for the lifetime of `self`.
        unsafe { &*self.bus_ptr }
    }
}

impl<M: RawMutex, F: BusFactory> Drop for BusHandle<'_, M, F> {
    fn drop(&mut self) {
        self.users.fetch_sub(1, Ordering::Release);
    }
}

// SAFETY: A BusHandle is conceptually a shared reference to F::Bus.
// It is Send if F::Bus is Sync (mirroring &T: Send iff T: Sync).
unsafe impl<M: RawMutex, F: BusFactory> Send for BusHandle<'_, M, F> where
    F::Bus: Sync
{
}

// SAFETY: All access goes through Deref which yields &F::Bus.
unsafe impl<M: RawMutex, F: BusFactory> Sync for BusHandle<'_, M, F> where
    F::Bus: Sync
{
}

impl<'a, M: RawMutex, F: BusFactory> BusHandle<'a, M, F> {
    /// Create a new handle. Only called by `BusManager`.
    pub(crate) fn new(bus_ptr: *const F::Bus, users: &'a AtomicUsize) -> Self {
        Self { bus_ptr, users, _phantom: PhantomData }
    }

    /// Returns a reference to the underlying bus.
    #[inline]
    pub fn bus(&self) -> &F::Bus {
        self
    }
}

impl<M, F, BUS> BusHandle<'_, M, F>
where
    M: RawMutex,
    BUS: i2c::I2c,
    F: BusFactory<Bus = Mutex<M, BUS>>,
{
    /// A device on the shared I2C bus.
    ///
    /// Each transaction issued through the device holds the bus mutex for
    /// its whole duration, so devices created from the same handle never
    /// interleave on the wire.
    pub fn i2c_device(&self) -> I2cDevice<'_, M, BUS> {
        I2cDevice::new(self.bus())
    }
}
