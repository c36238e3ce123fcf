use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use grounded::uninit::GroundedCell;
use heapless::String;
use portable_atomic::{AtomicUsize, Ordering};

use crate::error::BusError;
use crate::factory::BusFactory;
use crate::handle::BusHandle;

/// Longest accepted bus identifier.
pub const MAX_BUS_ID_LEN: usize = 32;

type BusId = String<MAX_BUS_ID_LEN>;

/// Phase state machine for the bus lifecycle.
enum Phase<F: BusFactory> {
    /// Bus is closed; resources are available.
    Idle(F::Resources),
    /// Bus `id` is open and stored in `bus_cell`.
    Active { destructor: F::Destructor, id: BusId },
    /// Unrecoverable error state (should not normally be reached).
    Poisoned,
}

/// Bus lifecycle manager.
///
/// Manages the opening, sharing, and closing of one named bus. The bus is
/// opened lazily on the first `acquire()` and closed with `try_release()`
/// once all handles have been dropped.
pub struct BusManager<M: RawMutex, F: BusFactory> {
    bus_cell: GroundedCell<F::Bus>,
    state: Mutex<M, Phase<F>>,
    users: AtomicUsize,
    releases: AtomicUsize,
}

impl<M: RawMutex, F: BusFactory> BusManager<M, F> {
    /// Create a new bus manager with the given resources.
    pub const fn new(resources: F::Resources) -> Self {
        Self {
            bus_cell: GroundedCell::uninit(),
            state: Mutex::new(Phase::Idle(resources)),
            users: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    /// Acquire a handle to the bus named `id`.
    ///
    /// Opens the bus through the factory if it is closed. While the bus is
    /// open, only the same `id` can be acquired again.
    pub async fn acquire(
        &self,
        id: &str,
    ) -> Result<BusHandle<'_, M, F>, BusError<F::Error>> {
        let mut state = self.state.lock().await;

        match &*state {
            Phase::Idle(_) => {
                let owned_id =
                    BusId::try_from(id).map_err(|_| BusError::InvalidId)?;

                // Take resources out, replacing with Poisoned temporarily.
                let resources =
                    match core::mem::replace(&mut *state, Phase::Poisoned) {
                        Phase::Idle(r) => r,
                        _ => unreachable!(),
                    };

                match F::create(resources, id) {
                    Ok((bus, destructor)) => {
                        // SAFETY: We hold the mutex, so no other code can access
                        // bus_cell concurrently. The cell is uninit (Idle state),
                        // so writing is safe.
                        unsafe {
                            self.bus_cell.get().write(bus);
                        }

                        self.users.store(1, Ordering::Release);
                        *state = Phase::Active { destructor, id: owned_id };

                        let bus_ptr = self.bus_cell.get() as *const F::Bus;
                        Ok(BusHandle::new(bus_ptr, &self.users))
                    }
                    Err((err, resources)) => {
                        // Keep the resources so a later acquire can retry.
                        *state = Phase::Idle(resources);
                        Err(BusError::FactoryError(err))
                    }
                }
            }
            Phase::Active { id: open, .. } => {
                if open.as_str() != id {
                    return Err(BusError::IdMismatch);
                }
                self.users.fetch_add(1, Ordering::Acquire);
                let bus_ptr = self.bus_cell.get() as *const F::Bus;
                Ok(BusHandle::new(bus_ptr, &self.users))
            }
            Phase::Poisoned => Err(BusError::Poisoned),
        }
    }

    /// Attempt to close the bus and recover its resources.
    ///
    /// Returns `Ok(())` if the bus was closed or was already idle.
    /// Returns `Err(InUse(n))` if there are still `n` live handles.
    pub async fn try_release(&self) -> Result<(), BusError<F::Error>> {
        let mut state = self.state.lock().await;

        match &*state {
            Phase::Idle(_) => Ok(()),
            Phase::Active { .. } => {
                let n = self.users.load(Ordering::Acquire);
                if n > 0 {
                    return Err(BusError::InUse(n));
                }

                let destructor =
                    match core::mem::replace(&mut *state, Phase::Poisoned) {
                        Phase::Active { destructor, .. } => destructor,
                        _ => unreachable!(),
                    };

                // SAFETY: We hold the mutex and users == 0, so no live BusHandles
                // exist. The bus was written during acquire(), so it is valid.
                unsafe {
                    core::ptr::drop_in_place(
                        self.bus_cell.get() as *mut F::Bus
                    );
                }

                let resources = F::recover(destructor);
                *state = Phase::Idle(resources);
                self.releases.fetch_add(1, Ordering::Relaxed);

                Ok(())
            }
            Phase::Poisoned => Err(BusError::Poisoned),
        }
    }

    /// Returns the current number of live handles.
    pub fn user_count(&self) -> usize {
        self.users.load(Ordering::Relaxed)
    }

    /// Number of times an open bus has been closed by this manager.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }

    /// Returns `Some(true)` if open, `Some(false)` if closed, `None` if the
    /// state is locked or poisoned.
    ///
    /// This is a non-blocking best-effort check using `try_lock`.
    pub fn is_active(&self) -> Option<bool> {
        self.state.try_lock().ok().and_then(|state| match &*state {
            Phase::Idle(_) => Some(false),
            Phase::Active { .. } => Some(true),
            Phase::Poisoned => None,
        })
    }

    /// Identifier of the open bus, if any.
    pub fn active_id(&self) -> Option<BusId> {
        self.state.try_lock().ok().and_then(|state| match &*state {
            Phase::Active { id, .. } => Some(id.clone()),
            _ => None,
        })
    }
}
